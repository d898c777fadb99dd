//! The host: event bus, state store, entity registry and config entries
//! wired together with the wasp_in_a_box integration registered.

use std::sync::Arc;

use tracing::{info, warn};
use wasp_config_entries::{
    ConfigEntries, ConfigEntriesError, ConfigEntriesResult, ConfigEntry, ConfigEntrySource,
    Options,
};
use wasp_core::{slugify, Context, EntityId};
use wasp_event_bus::EventBus;
use wasp_in_a_box::{WaspInABox, DOMAIN};
use wasp_registries::{EntityEntry, EntityRegistry};
use wasp_state_store::{Attributes, StateStore};

use crate::config::{EntryConfig, SourceEntity};

/// Platform name of entities declared in the configuration file
pub const SOURCE_PLATFORM: &str = "config";

pub struct Host {
    pub store: Arc<StateStore>,
    pub registry: Arc<EntityRegistry>,
    pub config_entries: Arc<ConfigEntries>,
    pub integration: Arc<WaspInABox>,
}

impl Host {
    pub fn new() -> Self {
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(StateStore::new(bus.clone()));
        let registry = Arc::new(EntityRegistry::new(bus.clone()));
        let config_entries = Arc::new(ConfigEntries::new());
        let integration =
            WaspInABox::register(&config_entries, bus, store.clone(), registry.clone());

        Self {
            store,
            registry,
            config_entries,
            integration,
        }
    }

    /// Register the configured source entities and write their initial states
    pub fn register_sources(&self, entities: &[SourceEntity]) {
        for source in entities {
            let Ok(entity_id) = source.entity_id.parse::<EntityId>() else {
                warn!("Skipping invalid entity id {}", source.entity_id);
                continue;
            };

            self.registry.get_or_create(EntityEntry::new(
                entity_id.clone(),
                SOURCE_PLATFORM,
                Some(entity_id.to_string()),
            ));

            if let Some(state) = &source.state {
                self.store
                    .set(entity_id, state.as_str(), Attributes::new(), Context::new());
            }
        }
        info!("Registered {} source entities", entities.len());
    }

    /// Add one config entry per configured wasp_in_a_box and set them all up
    pub async fn load_entries(
        &self,
        entries: &[EntryConfig],
    ) -> ConfigEntriesResult<Vec<ConfigEntriesResult<()>>> {
        for entry in entries {
            let options: Options = entry
                .options
                .to_options()
                .map_err(|e| ConfigEntriesError::SetupFailed(e.to_string()))?;
            let unique_id = entry
                .unique_id
                .clone()
                .unwrap_or_else(|| slugify(&entry.name));

            self.config_entries.add(
                ConfigEntry::new(DOMAIN, entry.name.clone())
                    .with_options(options)
                    .with_unique_id(unique_id)
                    .with_source(ConfigEntrySource::Import),
            )?;
        }

        Ok(self.config_entries.setup_all().await)
    }

    /// Unload every entry
    pub async fn shutdown(&self) {
        for result in self.config_entries.unload_all().await {
            if let Err(e) = result {
                warn!("Failed to unload entry: {}", e);
            }
        }
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}
