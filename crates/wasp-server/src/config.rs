//! Server configuration file
//!
//! ```yaml
//! logger:
//!   default: debug
//!
//! entities:
//!   - entity_id: binary_sensor.bathroom_motion
//!     state: "off"
//!   - entity_id: binary_sensor.bathroom_door
//!
//! wasp_in_a_box:
//!   - name: Bathroom
//!     wasp_id: binary_sensor.bathroom_motion
//!     box_id: binary_sensor.bathroom_door
//!     door_closed_delay: 30
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use wasp_core::{EntityId, EntityIdError};
use wasp_in_a_box::{OptionsError, WaspInABoxOptions};

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML in {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid entity id '{entity_id}': {source}")]
    InvalidEntityId {
        entity_id: String,
        #[source]
        source: EntityIdError,
    },

    #[error("invalid wasp_in_a_box entry '{name}': {source}")]
    InvalidEntry {
        name: String,
        #[source]
        source: OptionsError,
    },

    #[error("configuration validation failed: {message}")]
    ValidationFailed { message: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggerConfig {
    /// Level filter used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub default: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
        }
    }
}

/// A source entity the host registers at startup
#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntity {
    pub entity_id: String,
    /// Initial state, none if absent
    #[serde(default)]
    pub state: Option<String>,
}

/// One wasp_in_a_box config entry
#[derive(Debug, Clone, Deserialize)]
pub struct EntryConfig {
    /// Entry title and name of the created sensor
    pub name: String,
    #[serde(default)]
    pub unique_id: Option<String>,
    #[serde(flatten)]
    pub options: WaspInABoxOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub logger: LoggerConfig,
    #[serde(default)]
    pub entities: Vec<SourceEntity>,
    #[serde(default, rename = "wasp_in_a_box")]
    pub entries: Vec<EntryConfig>,
}

impl ServerConfig {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        debug!("Loading configuration file: {:?}", path);

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_yaml(&content, path)
    }

    pub fn from_yaml(content: &str, source_path: &Path) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        for entity in &self.entities {
            entity
                .entity_id
                .parse::<EntityId>()
                .map_err(|source| ConfigError::InvalidEntityId {
                    entity_id: entity.entity_id.clone(),
                    source,
                })?;
        }

        let mut names = HashSet::new();
        for entry in &self.entries {
            entry
                .options
                .validate()
                .map_err(|source| ConfigError::InvalidEntry {
                    name: entry.name.clone(),
                    source,
                })?;

            if !names.insert(entry.name.to_lowercase()) {
                return Err(ConfigError::ValidationFailed {
                    message: format!("duplicate wasp_in_a_box name '{}'", entry.name),
                });
            }
        }

        Ok(())
    }
}
