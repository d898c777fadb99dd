//! Config Entry types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::state_machine::InvalidTransition;

/// User-configurable options of an entry
pub type Options = HashMap<String, serde_json::Value>;

/// Config entry lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntryState {
    /// Not set up, or unloaded
    #[default]
    NotLoaded,
    /// Setup handler running
    SetupInProgress,
    /// Set up and running
    Loaded,
    /// Setup handler refused the entry
    SetupError,
    /// Unload handler running
    UnloadInProgress,
    /// Unload handler failed (terminal)
    FailedUnload,
}

impl ConfigEntryState {
    /// Whether unload/reload may start from this state
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ConfigEntryState::NotLoaded | ConfigEntryState::Loaded | ConfigEntryState::SetupError
        )
    }
}

/// Where the entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntrySource {
    /// Created by a user
    #[default]
    User,
    /// Imported from the YAML configuration
    Import,
}

/// A configuration entry for an integration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Unique identifier (ULID)
    pub entry_id: String,

    /// Integration domain (`wasp_in_a_box`)
    pub domain: String,

    /// Human-readable name, also the name of the entity it creates
    pub title: String,

    /// User-configurable options
    #[serde(default)]
    pub options: Options,

    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_version")]
    pub minor_version: u32,

    /// Optional unique identifier for duplicate prevention
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,

    #[serde(default)]
    pub source: ConfigEntrySource,

    /// Current lifecycle state
    #[serde(skip, default)]
    pub state: ConfigEntryState,

    /// Why the entry is in a failed state
    #[serde(skip, default)]
    pub reason: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

impl ConfigEntry {
    pub fn new(domain: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            entry_id: ulid::Ulid::new().to_string(),
            domain: domain.into(),
            title: title.into(),
            options: Options::new(),
            version: 1,
            minor_version: 1,
            unique_id: None,
            source: ConfigEntrySource::User,
            state: ConfigEntryState::NotLoaded,
            reason: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn with_entry_id(mut self, entry_id: impl Into<String>) -> Self {
        self.entry_id = entry_id.into();
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }

    pub fn with_source(mut self, source: ConfigEntrySource) -> Self {
        self.source = source;
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.state == ConfigEntryState::Loaded
    }

    /// Move to a new state, validating the transition
    pub fn try_set_state(
        &mut self,
        new_state: ConfigEntryState,
        reason: Option<String>,
    ) -> Result<(), InvalidTransition> {
        self.state = self.state.try_transition(new_state)?;
        self.reason = reason;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_entry_new() {
        let entry = ConfigEntry::new("wasp_in_a_box", "Bathroom");
        assert_eq!(entry.domain, "wasp_in_a_box");
        assert_eq!(entry.title, "Bathroom");
        assert_eq!(entry.state, ConfigEntryState::NotLoaded);
        assert!(!entry.entry_id.is_empty());
    }

    #[test]
    fn test_try_set_state_records_reason() {
        let mut entry = ConfigEntry::new("wasp_in_a_box", "Bathroom");
        entry.try_set_state(ConfigEntryState::SetupInProgress, None).unwrap();
        entry
            .try_set_state(ConfigEntryState::SetupError, Some("unknown entity".into()))
            .unwrap();
        assert_eq!(entry.reason.as_deref(), Some("unknown entity"));

        let err = entry.try_set_state(ConfigEntryState::Loaded, None).unwrap_err();
        assert_eq!(err.from, ConfigEntryState::SetupError);
        assert_eq!(entry.state, ConfigEntryState::SetupError);
    }

    #[test]
    fn test_state_is_not_serialized() {
        let mut entry = ConfigEntry::new("wasp_in_a_box", "Bathroom")
            .with_options(Options::from([("immediate_on".to_string(), json!(false))]))
            .with_source(ConfigEntrySource::Import);
        entry.state = ConfigEntryState::Loaded;

        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("state").is_none());

        let parsed: ConfigEntry = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.state, ConfigEntryState::NotLoaded);
        assert_eq!(parsed.source, ConfigEntrySource::Import);
        assert_eq!(parsed.options["immediate_on"], json!(false));
    }
}
