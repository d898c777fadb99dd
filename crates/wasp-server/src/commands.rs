//! Line commands read from stdin
//!
//! ```text
//! set binary_sensor.door off
//! remove binary_sensor.door
//! rename binary_sensor.door binary_sensor.front_door
//! show binary_sensor.bathroom
//! entries
//! ```

use std::str::FromStr;

use thiserror::Error;
use wasp_core::{Context, EntityId, EntityIdError};
use wasp_registries::RegistryError;
use wasp_state_store::Attributes;

use crate::host::Host;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command '{0}' (expected set, remove, rename, show or entries)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error(transparent)]
    InvalidEntityId(#[from] EntityIdError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{0} has no state")]
    NoState(EntityId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Write a state, keeping the entity's attributes
    Set { entity_id: EntityId, state: String },
    /// Remove an entity from the registry and the state store
    Remove(EntityId),
    /// Rename an entity in the registry and move its state
    Rename { from: EntityId, to: EntityId },
    Show(EntityId),
    /// List config entries
    Entries,
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        match (name, args.as_slice()) {
            ("set", [entity_id, state]) => Ok(Command::Set {
                entity_id: entity_id.parse()?,
                state: state.to_string(),
            }),
            ("set", _) => Err(CommandError::Usage("set <entity_id> <state>")),
            ("remove", [entity_id]) => Ok(Command::Remove(entity_id.parse()?)),
            ("remove", _) => Err(CommandError::Usage("remove <entity_id>")),
            ("rename", [from, to]) => Ok(Command::Rename {
                from: from.parse()?,
                to: to.parse()?,
            }),
            ("rename", _) => Err(CommandError::Usage("rename <entity_id> <new_entity_id>")),
            ("show", [entity_id]) => Ok(Command::Show(entity_id.parse()?)),
            ("show", _) => Err(CommandError::Usage("show <entity_id>")),
            ("entries", []) => Ok(Command::Entries),
            (other, _) => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

impl Command {
    /// Run the command against the host, returning what to print
    pub fn execute(self, host: &Host) -> Result<String, CommandError> {
        match self {
            Command::Set { entity_id, state } => {
                let key = entity_id.to_string();
                let attributes = host
                    .store
                    .get(&key)
                    .map(|s| s.attributes)
                    .unwrap_or_else(Attributes::new);
                host.store.set(entity_id, state.as_str(), attributes, Context::new());
                Ok(format!("{} = {}", key, state))
            }
            Command::Remove(entity_id) => {
                let registered = host.registry.remove(&entity_id).is_some();
                let had_state = host.store.remove(&entity_id, Context::new()).is_some();
                if !registered && !had_state {
                    return Err(RegistryError::NotFound(entity_id.to_string()).into());
                }
                Ok(format!("removed {}", entity_id))
            }
            Command::Rename { from, to } => {
                host.registry.update_entity_id(&from, to.clone())?;
                if let Some(state) = host.store.remove(&from, Context::new()) {
                    host.store
                        .set(to.clone(), state.state, state.attributes, Context::new());
                }
                Ok(format!("renamed {} to {}", from, to))
            }
            Command::Show(entity_id) => {
                let state = host
                    .store
                    .get(&entity_id.to_string())
                    .ok_or_else(|| CommandError::NoState(entity_id.clone()))?;
                let attributes =
                    serde_json::to_string(&state.attributes).unwrap_or_else(|_| "{}".to_string());
                Ok(format!("{} = {} {}", entity_id, state.state, attributes))
            }
            Command::Entries => {
                let lines: Vec<String> = host
                    .config_entries
                    .get_by_domain(wasp_in_a_box::DOMAIN)
                    .into_iter()
                    .map(|entry| {
                        let sensor = host
                            .integration
                            .sensor_entity_id(&entry.entry_id)
                            .map(|id| id.to_string())
                            .unwrap_or_else(|| "-".to_string());
                        format!("{} [{:?}] {}", entry.title, entry.state, sensor)
                    })
                    .collect();
                Ok(lines.join("\n"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasp_registries::EntityEntry;

    fn id(s: &str) -> EntityId {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            "set binary_sensor.door off".parse::<Command>().unwrap(),
            Command::Set {
                entity_id: id("binary_sensor.door"),
                state: "off".to_string()
            }
        );
        assert_eq!(
            "  remove   binary_sensor.door ".parse::<Command>().unwrap(),
            Command::Remove(id("binary_sensor.door"))
        );
        assert_eq!(
            "rename binary_sensor.a binary_sensor.b".parse::<Command>().unwrap(),
            Command::Rename {
                from: id("binary_sensor.a"),
                to: id("binary_sensor.b")
            }
        );
        assert_eq!("entries".parse::<Command>().unwrap(), Command::Entries);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!("set binary_sensor.door".parse::<Command>(), Err(CommandError::Usage(_))));
        assert!(matches!("show door".parse::<Command>(), Err(CommandError::InvalidEntityId(_))));
        assert!(matches!("toggle x".parse::<Command>(), Err(CommandError::Unknown(_))));
    }

    #[tokio::test]
    async fn test_set_and_show() {
        let host = Host::new();

        let out = "set binary_sensor.door on".parse::<Command>().unwrap().execute(&host).unwrap();
        assert_eq!(out, "binary_sensor.door = on");

        let out = "show binary_sensor.door".parse::<Command>().unwrap().execute(&host).unwrap();
        assert_eq!(out, "binary_sensor.door = on {}");

        let err = "show binary_sensor.window".parse::<Command>().unwrap().execute(&host);
        assert!(matches!(err, Err(CommandError::NoState(_))));
    }

    #[tokio::test]
    async fn test_rename_moves_state() {
        let host = Host::new();
        host.registry
            .get_or_create(EntityEntry::new(id("binary_sensor.door"), "config", None));
        Command::Set {
            entity_id: id("binary_sensor.door"),
            state: "off".to_string(),
        }
        .execute(&host)
        .unwrap();

        Command::Rename {
            from: id("binary_sensor.door"),
            to: id("binary_sensor.front_door"),
        }
        .execute(&host)
        .unwrap();

        assert!(host.registry.get("binary_sensor.front_door").is_some());
        assert!(host.store.get("binary_sensor.door").is_none());
        assert!(host.store.is_state("binary_sensor.front_door", "off"));

        let err = Command::Remove(id("binary_sensor.door")).execute(&host);
        assert!(matches!(err, Err(CommandError::Registry(_))));
    }
}
