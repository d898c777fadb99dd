//! Entity Registry
//!
//! Tracks registered entities with unique_id and config entry indexes, and
//! fires ENTITY_REGISTRY_UPDATED on every create, rename and removal.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use wasp_core::events::{EntityRegistryUpdatedData, RegistryAction};
use wasp_core::{Context, EntityId, EntityIdError};
use wasp_event_bus::EventBus;

/// Errors that can occur in the entity registry
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Neither a well-formed entity id nor a known registry entry id
    #[error("Unknown entity registry entry {0}")]
    UnknownEntity(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity id already registered: {0}")]
    AlreadyExists(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// A registered entity entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEntry {
    /// Internal registry id (lowercase ULID)
    pub id: String,
    pub entity_id: EntityId,
    /// Platform-specific unique identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    /// Component/platform that provides this entity
    pub platform: String,
    /// Config entry that created this entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_entry_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_device_class: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl EntityEntry {
    pub fn new(entity_id: EntityId, platform: impl Into<String>, unique_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            entity_id,
            unique_id,
            platform: platform.into(),
            config_entry_id: None,
            original_name: None,
            original_device_class: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn with_config_entry(mut self, config_entry_id: impl Into<String>) -> Self {
        self.config_entry_id = Some(config_entry_id.into());
        self
    }

    pub fn with_original_name(mut self, name: impl Into<String>) -> Self {
        self.original_name = Some(name.into());
        self
    }

    pub fn with_device_class(mut self, device_class: impl Into<String>) -> Self {
        self.original_device_class = Some(device_class.into());
        self
    }
}

/// Entity Registry
///
/// Entries are stored as `Arc<EntityEntry>` so reads never clone the entry.
pub struct EntityRegistry {
    /// Primary index: entity_id -> entry
    by_entity_id: DashMap<String, Arc<EntityEntry>>,
    /// Index: registry id -> entity_id
    by_id: DashMap<String, String>,
    /// Index: (platform, unique_id) -> entity_id
    by_unique_id: DashMap<(String, String), String>,
    /// Index: config_entry_id -> set of entity_ids
    by_config_entry_id: DashMap<String, HashSet<String>>,
    event_bus: Arc<EventBus>,
}

impl EntityRegistry {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            by_entity_id: DashMap::new(),
            by_id: DashMap::new(),
            by_unique_id: DashMap::new(),
            by_config_entry_id: DashMap::new(),
            event_bus,
        }
    }

    fn index_entry(&self, entry: Arc<EntityEntry>) {
        let entity_id = entry.entity_id.to_string();

        self.by_id.insert(entry.id.clone(), entity_id.clone());

        if let Some(unique_id) = &entry.unique_id {
            self.by_unique_id
                .insert((entry.platform.clone(), unique_id.clone()), entity_id.clone());
        }

        if let Some(config_entry_id) = &entry.config_entry_id {
            self.by_config_entry_id
                .entry(config_entry_id.clone())
                .or_default()
                .insert(entity_id.clone());
        }

        self.by_entity_id.insert(entity_id, entry);
    }

    fn unindex_entry(&self, entry: &EntityEntry) {
        let entity_id = entry.entity_id.to_string();

        self.by_id.remove(&entry.id);

        if let Some(unique_id) = &entry.unique_id {
            self.by_unique_id
                .remove(&(entry.platform.clone(), unique_id.clone()));
        }

        if let Some(config_entry_id) = &entry.config_entry_id {
            if let Some(mut ids) = self.by_config_entry_id.get_mut(config_entry_id) {
                ids.remove(&entity_id);
            }
        }

        self.by_entity_id.remove(&entity_id);
    }

    fn fire(&self, data: EntityRegistryUpdatedData) {
        self.event_bus.fire_typed(data, Context::new());
    }

    /// Get entity by entity_id
    pub fn get(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        self.by_entity_id.get(entity_id).map(|e| e.value().clone())
    }

    /// Get entity by registry id
    pub fn get_by_id(&self, id: &str) -> Option<Arc<EntityEntry>> {
        let entity_id = self.by_id.get(id)?.value().clone();
        self.get(&entity_id)
    }

    /// Get entity by (platform, unique_id)
    pub fn get_by_unique_id(&self, platform: &str, unique_id: &str) -> Option<Arc<EntityEntry>> {
        let entity_id = self
            .by_unique_id
            .get(&(platform.to_string(), unique_id.to_string()))?
            .value()
            .clone();
        self.get(&entity_id)
    }

    /// All entities created by a config entry
    pub fn get_by_config_entry_id(&self, config_entry_id: &str) -> Vec<Arc<EntityEntry>> {
        self.by_config_entry_id
            .get(config_entry_id)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// Register an entry, or return the existing one with the same
    /// (platform, unique_id)
    pub fn get_or_create(&self, entry: EntityEntry) -> Arc<EntityEntry> {
        if let Some(unique_id) = &entry.unique_id {
            if let Some(existing) = self.get_by_unique_id(&entry.platform, unique_id) {
                return existing;
            }
        }
        if let Some(existing) = self.get(&entry.entity_id.to_string()) {
            return existing;
        }

        let entry = Arc::new(entry);
        debug!(entity_id = %entry.entity_id, platform = %entry.platform, "Registering entity");
        self.index_entry(entry.clone());

        self.fire(EntityRegistryUpdatedData {
            action: RegistryAction::Create,
            entity_id: entry.entity_id.clone(),
            old_entity_id: None,
            changes: HashMap::new(),
        });

        entry
    }

    /// Rename an entity
    pub fn update_entity_id(
        &self,
        entity_id: &EntityId,
        new_entity_id: EntityId,
    ) -> RegistryResult<Arc<EntityEntry>> {
        let entry = self
            .get(&entity_id.to_string())
            .ok_or_else(|| RegistryError::NotFound(entity_id.to_string()))?;

        if self.get(&new_entity_id.to_string()).is_some() {
            return Err(RegistryError::AlreadyExists(new_entity_id.to_string()));
        }

        self.unindex_entry(&entry);

        let mut updated = (*entry).clone();
        updated.entity_id = new_entity_id.clone();
        updated.modified_at = Utc::now();
        let updated = Arc::new(updated);
        self.index_entry(updated.clone());

        info!("Renamed entity {} to {}", entity_id, new_entity_id);

        self.fire(EntityRegistryUpdatedData {
            action: RegistryAction::Update,
            entity_id: new_entity_id,
            old_entity_id: Some(entity_id.clone()),
            changes: HashMap::from([(
                "entity_id".to_string(),
                serde_json::Value::String(entity_id.to_string()),
            )]),
        });

        Ok(updated)
    }

    /// Remove an entity
    pub fn remove(&self, entity_id: &EntityId) -> Option<Arc<EntityEntry>> {
        let entry = self.get(&entity_id.to_string())?;
        self.unindex_entry(&entry);

        debug!(entity_id = %entity_id, "Removed entity from registry");

        self.fire(EntityRegistryUpdatedData {
            action: RegistryAction::Remove,
            entity_id: entity_id.clone(),
            old_entity_id: None,
            changes: HashMap::new(),
        });

        Some(entry)
    }

    /// Pick an unused entity id for a display name
    ///
    /// `Bathroom` in `binary_sensor` becomes `binary_sensor.bathroom`, or
    /// `binary_sensor.bathroom_2`, `_3`, ... when that is registered already
    /// or listed in `reserved`.
    pub fn generate_entity_id(
        &self,
        domain: &str,
        name: &str,
        reserved: &[EntityId],
    ) -> Result<EntityId, EntityIdError> {
        let is_available = |entity_id: &EntityId| {
            self.get(&entity_id.to_string()).is_none() && !reserved.contains(entity_id)
        };

        let preferred = EntityId::from_name(domain, name)?;
        if is_available(&preferred) {
            return Ok(preferred);
        }

        let mut tries = 1;
        loop {
            tries += 1;
            let candidate = EntityId::new(domain, format!("{}_{}", preferred.object_id(), tries))?;
            if is_available(&candidate) {
                return Ok(candidate);
            }
        }
    }

    /// Resolve an entity id or registry id to an entity id
    ///
    /// A well-formed entity id is returned as is, registered or not. Anything
    /// else must be the id of a registry entry.
    pub fn validate_entity_id(&self, entity_id_or_id: &str) -> RegistryResult<EntityId> {
        if let Ok(entity_id) = entity_id_or_id.parse::<EntityId>() {
            return Ok(entity_id);
        }

        self.get_by_id(entity_id_or_id)
            .map(|entry| entry.entity_id.clone())
            .ok_or_else(|| RegistryError::UnknownEntity(entity_id_or_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.by_entity_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_entity_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> EntityId {
        s.parse().unwrap()
    }

    fn make_registry() -> (Arc<EventBus>, EntityRegistry) {
        let bus = Arc::new(EventBus::new());
        let registry = EntityRegistry::new(bus.clone());
        (bus, registry)
    }

    #[test]
    fn test_get_or_create_dedupes_unique_id() {
        let (_, registry) = make_registry();

        let first = registry.get_or_create(EntityEntry::new(
            id("binary_sensor.motion"),
            "test",
            Some("motion".to_string()),
        ));
        let second = registry.get_or_create(EntityEntry::new(
            id("binary_sensor.motion_2"),
            "test",
            Some("motion".to_string()),
        ));

        assert_eq!(first.id, second.id);
        assert_eq!(second.entity_id, id("binary_sensor.motion"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_validate_entity_id() {
        let (_, registry) = make_registry();
        let entry = registry.get_or_create(EntityEntry::new(id("binary_sensor.door"), "test", None));

        assert_eq!(
            registry.validate_entity_id("binary_sensor.door").unwrap(),
            id("binary_sensor.door")
        );
        assert_eq!(
            registry.validate_entity_id(&entry.id).unwrap(),
            id("binary_sensor.door")
        );
        // Well-formed ids pass even when unregistered
        assert!(registry.validate_entity_id("binary_sensor.elsewhere").is_ok());
        assert_eq!(
            registry.validate_entity_id("0123abcd"),
            Err(RegistryError::UnknownEntity("0123abcd".to_string()))
        );
    }

    #[test]
    fn test_config_entry_index() {
        let (_, registry) = make_registry();
        registry.get_or_create(
            EntityEntry::new(id("binary_sensor.bathroom"), "wasp_in_a_box", Some("e1".into()))
                .with_config_entry("e1"),
        );

        let owned = registry.get_by_config_entry_id("e1");
        assert_eq!(owned.len(), 1);

        registry.remove(&id("binary_sensor.bathroom"));
        assert!(registry.get_by_config_entry_id("e1").is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_generate_entity_id_skips_taken_ids() {
        let (_, registry) = make_registry();
        assert_eq!(
            registry
                .generate_entity_id("binary_sensor", "Bathroom", &[])
                .unwrap(),
            id("binary_sensor.bathroom")
        );

        registry.get_or_create(EntityEntry::new(id("binary_sensor.bathroom"), "test", None));
        assert_eq!(
            registry
                .generate_entity_id("binary_sensor", "Bathroom", &[])
                .unwrap(),
            id("binary_sensor.bathroom_2")
        );
        assert_eq!(
            registry
                .generate_entity_id("binary_sensor", "Bathroom", &[id("binary_sensor.bathroom_2")])
                .unwrap(),
            id("binary_sensor.bathroom_3")
        );

        // Reserved ids count even when unregistered
        assert_eq!(
            registry
                .generate_entity_id("binary_sensor", "Motion", &[id("binary_sensor.motion")])
                .unwrap(),
            id("binary_sensor.motion_2")
        );
        assert!(registry.generate_entity_id("binary_sensor", "***", &[]).is_err());
    }

    #[tokio::test]
    async fn test_rename_fires_update_with_changes() {
        let (bus, registry) = make_registry();
        let entry = registry.get_or_create(EntityEntry::new(id("binary_sensor.door"), "test", None));
        let mut rx = bus.track_registry_updates(&[id("binary_sensor.door")]);

        registry
            .update_entity_id(&id("binary_sensor.door"), id("binary_sensor.front_door"))
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert!(event.data.renamed());
        assert_eq!(event.data.entity_id, id("binary_sensor.front_door"));
        assert_eq!(event.data.old_entity_id, Some(id("binary_sensor.door")));

        // The registry id survives the rename
        assert_eq!(
            registry.get_by_id(&entry.id).unwrap().entity_id,
            id("binary_sensor.front_door")
        );
        assert!(registry.get("binary_sensor.door").is_none());
    }

    #[test]
    fn test_rename_errors() {
        let (_, registry) = make_registry();
        registry.get_or_create(EntityEntry::new(id("binary_sensor.a"), "test", None));
        registry.get_or_create(EntityEntry::new(id("binary_sensor.b"), "test", None));

        assert_eq!(
            registry
                .update_entity_id(&id("binary_sensor.a"), id("binary_sensor.b"))
                .unwrap_err(),
            RegistryError::AlreadyExists("binary_sensor.b".to_string())
        );
        assert_eq!(
            registry
                .update_entity_id(&id("binary_sensor.c"), id("binary_sensor.d"))
                .unwrap_err(),
            RegistryError::NotFound("binary_sensor.c".to_string())
        );
    }

    #[tokio::test]
    async fn test_remove_fires_event() {
        let (bus, registry) = make_registry();
        registry.get_or_create(EntityEntry::new(id("binary_sensor.motion"), "test", None));
        let mut rx = bus.track_registry_updates(&[id("binary_sensor.motion")]);

        assert!(registry.remove(&id("binary_sensor.motion")).is_some());
        assert!(registry.remove(&id("binary_sensor.motion")).is_none());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.data.action, RegistryAction::Remove);
    }
}
