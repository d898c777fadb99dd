//! Config entry handler for the wasp_in_a_box domain

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use wasp_config_entries::{ConfigEntries, ConfigEntry, Integration};
use wasp_core::events::{EntityRegistryUpdatedData, RegistryAction};
use wasp_core::{Context, EntityId, EntityIdError, STATE_UNAVAILABLE};
use wasp_event_bus::{EventBus, TrackedEvents};
use wasp_registries::{EntityEntry, EntityRegistry};
use wasp_state_store::StateStore;

use crate::binary_sensor::{sensor_attributes, SensorSpec, WaspInABoxSensor};
use crate::constants::{DEVICE_CLASS_OCCUPANCY, DOMAIN, OUTPUT_DOMAIN};
use crate::options::{validate_inputs, OptionsError, WaspInABoxOptions};

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Options(#[from] OptionsError),

    #[error("Unknown entity {0}")]
    UnknownEntity(String),

    #[error("Sensor entity {0} is one of its own inputs")]
    OutputIsInput(EntityId),

    #[error("Cannot derive an entity id from title {title:?}: {source}")]
    Title {
        title: String,
        #[source]
        source: EntityIdError,
    },
}

/// What a loaded entry keeps running
struct LoadedEntry {
    sensor: WaspInABoxSensor,
    registry_listener: JoinHandle<()>,
}

/// The wasp_in_a_box integration
pub struct WaspInABox {
    bus: Arc<EventBus>,
    store: Arc<StateStore>,
    registry: Arc<EntityRegistry>,
    config_entries: Weak<ConfigEntries>,
    loaded: DashMap<String, LoadedEntry>,
}

impl WaspInABox {
    /// Create the integration and register it for its domain
    pub fn register(
        config_entries: &Arc<ConfigEntries>,
        bus: Arc<EventBus>,
        store: Arc<StateStore>,
        registry: Arc<EntityRegistry>,
    ) -> Arc<Self> {
        let integration = Arc::new(Self {
            bus,
            store,
            registry,
            config_entries: Arc::downgrade(config_entries),
            loaded: DashMap::new(),
        });
        config_entries.register_integration(DOMAIN, integration.clone());
        integration
    }

    /// Entity id of the sensor a loaded entry runs
    pub fn sensor_entity_id(&self, entry_id: &str) -> Option<EntityId> {
        self.loaded
            .get(entry_id)
            .map(|loaded| loaded.sensor.entity_id().clone())
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    fn resolve(&self, entity_id_or_id: &str) -> Result<EntityId, SetupError> {
        self.registry
            .validate_entity_id(entity_id_or_id)
            .map_err(|_| {
                error!(
                    "Failed to setup {} for unknown entity {}",
                    DOMAIN, entity_id_or_id
                );
                SetupError::UnknownEntity(entity_id_or_id.to_string())
            })
    }

    async fn async_setup_entry(&self, entry: &ConfigEntry) -> Result<(), SetupError> {
        let options = WaspInABoxOptions::from_options(&entry.options)?;
        let wasp = self.resolve(&options.wasp_id)?;
        let door = self.resolve(&options.box_id)?;
        validate_inputs(&wasp, &door)?;

        let sensor_entry = match self.registry.get_by_unique_id(DOMAIN, &entry.entry_id) {
            Some(existing) => existing,
            None => {
                let entity_id = self
                    .registry
                    .generate_entity_id(OUTPUT_DOMAIN, &entry.title, &[wasp.clone(), door.clone()])
                    .map_err(|source| SetupError::Title {
                        title: entry.title.clone(),
                        source,
                    })?;
                self.registry.get_or_create(
                    EntityEntry::new(entity_id, DOMAIN, Some(entry.entry_id.clone()))
                        .with_config_entry(entry.entry_id.clone())
                        .with_original_name(entry.title.clone())
                        .with_device_class(DEVICE_CLASS_OCCUPANCY),
                )
            }
        };
        if sensor_entry.entity_id == wasp || sensor_entry.entity_id == door {
            return Err(SetupError::OutputIsInput(sensor_entry.entity_id.clone()));
        }

        let spec = SensorSpec {
            entity_id: sensor_entry.entity_id.clone(),
            name: entry.title.clone(),
            wasp: wasp.clone(),
            door: door.clone(),
            config: options.fuser_config(),
        };
        debug!(?spec, "Starting sensor");
        let sensor = WaspInABoxSensor::start(spec, &self.bus, self.store.clone(), &self.registry);

        let registry_listener = tokio::spawn(listen_registry(
            self.bus.track_registry_updates(&[wasp, door]),
            self.config_entries.clone(),
            entry.entry_id.clone(),
            options,
        ));

        self.loaded.insert(
            entry.entry_id.clone(),
            LoadedEntry {
                sensor,
                registry_listener,
            },
        );

        Ok(())
    }
}

#[async_trait]
impl Integration for WaspInABox {
    async fn setup_entry(&self, entry: &ConfigEntry) -> Result<(), String> {
        self.async_setup_entry(entry)
            .await
            .map_err(|e| e.to_string())
    }

    async fn unload_entry(&self, entry: &ConfigEntry) -> bool {
        let Some((_, loaded)) = self.loaded.remove(&entry.entry_id) else {
            return true;
        };

        loaded.registry_listener.abort();

        let entity_id = loaded.sensor.entity_id().clone();
        loaded.sensor.stop().await;

        self.store.set(
            entity_id,
            STATE_UNAVAILABLE,
            sensor_attributes(&entry.title),
            Context::new(),
        );

        true
    }

    async fn remove_entry(&self, entry: &ConfigEntry) {
        for sensor in self.registry.get_by_config_entry_id(&entry.entry_id) {
            self.store.remove(&sensor.entity_id, Context::new());
            self.registry.remove(&sensor.entity_id);
        }
    }
}

/// Follow registry changes of an entry's inputs
///
/// Removing an input removes the entry. Renaming one points the entry's
/// options at the new id, which reloads it; an entry that names its inputs by
/// registry id is just reloaded. Either way the listener is done after the
/// first relevant event: reloading or removing the entry replaces it.
async fn listen_registry(
    mut updates: TrackedEvents<EntityRegistryUpdatedData>,
    config_entries: Weak<ConfigEntries>,
    entry_id: String,
    options: WaspInABoxOptions,
) {
    while let Some(event) = updates.recv().await {
        let data = event.data;
        let action = match data.action {
            RegistryAction::Remove => RegistryFollowUp::Remove,
            RegistryAction::Update if data.renamed() => {
                let mut options = options.clone();
                let renamed = data
                    .old_entity_id
                    .as_ref()
                    .is_some_and(|old| options.rename(old, &data.entity_id));
                if renamed {
                    RegistryFollowUp::UpdateOptions(options)
                } else {
                    RegistryFollowUp::Reload
                }
            }
            _ => continue,
        };

        let Some(config_entries) = config_entries.upgrade() else {
            return;
        };

        // Reload and removal abort this listener, so they run detached
        let entry_id = entry_id.clone();
        tokio::spawn(async move {
            if let Err(e) = action.apply(&config_entries, &entry_id).await {
                warn!("Failed to follow registry update for entry {}: {}", entry_id, e);
            }
        });
        return;
    }
}

enum RegistryFollowUp {
    Remove,
    Reload,
    UpdateOptions(WaspInABoxOptions),
}

impl RegistryFollowUp {
    async fn apply(
        self,
        config_entries: &ConfigEntries,
        entry_id: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match self {
            RegistryFollowUp::Remove => {
                info!("Input entity removed, removing entry {}", entry_id);
                config_entries.remove(entry_id).await?;
            }
            RegistryFollowUp::Reload => {
                info!("Input entity renamed, reloading entry {}", entry_id);
                config_entries.reload(entry_id).await?;
            }
            RegistryFollowUp::UpdateOptions(options) => {
                info!("Input entity renamed, updating entry {}", entry_id);
                config_entries
                    .update_options(entry_id, options.to_options()?)
                    .await?;
            }
        }
        Ok(())
    }
}
