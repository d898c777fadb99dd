//! Core host types for wasp-in-a-box
//!
//! The integration runs inside a small Home Assistant style host. This crate
//! holds the types every host crate shares: EntityId, State, Event and
//! Context, plus the payloads of the two event types the integration
//! listens to.

mod context;
mod entity_id;
mod event;
mod state;

pub use context::Context;
pub use entity_id::{slugify, EntityId, EntityIdError};
pub use event::{Event, EventData, EventType};
pub use state::State;

/// State value for a binary entity that is on
pub const STATE_ON: &str = "on";

/// State value for a binary entity that is off
pub const STATE_OFF: &str = "off";

/// State value when the entity exists but its value is not known
pub const STATE_UNKNOWN: &str = "unknown";

/// State value when the entity's source cannot be reached
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Standard event types and their payloads
pub mod events {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;

    /// Event type for state changes
    pub const STATE_CHANGED: &str = "state_changed";

    /// Event type for entity registry changes
    pub const ENTITY_REGISTRY_UPDATED: &str = "entity_registry_updated";

    /// Data for STATE_CHANGED events
    ///
    /// `new_state` is `None` when the entity was removed, `old_state` is
    /// `None` when the entity was written for the first time.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        pub new_state: Option<State>,
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }

    /// What happened to a registry entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum RegistryAction {
        Create,
        Update,
        Remove,
    }

    /// Data for ENTITY_REGISTRY_UPDATED events
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct EntityRegistryUpdatedData {
        pub action: RegistryAction,
        pub entity_id: EntityId,
        /// Set on updates that renamed the entity
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub old_entity_id: Option<EntityId>,
        /// Previous values of the fields an update touched
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        pub changes: HashMap<String, serde_json::Value>,
    }

    impl EntityRegistryUpdatedData {
        /// True when the update changed the entity's id
        pub fn renamed(&self) -> bool {
            self.action == RegistryAction::Update && self.changes.contains_key("entity_id")
        }
    }

    impl EventData for EntityRegistryUpdatedData {
        fn event_type() -> &'static str {
            ENTITY_REGISTRY_UPDATED
        }
    }
}
