//! Entity ID type: a validated `domain.object_id` pair

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for invalid entity IDs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("entity_id '{0}' must contain exactly one '.' separator")]
    InvalidFormat(String),

    #[error("invalid domain '{0}' (lowercase alphanumeric and underscores, no leading/trailing or double underscore)")]
    InvalidDomain(String),

    #[error("invalid object_id '{0}' (lowercase alphanumeric and underscores, no leading/trailing underscore)")]
    InvalidObjectId(String),
}

/// A host entity ID such as `binary_sensor.hallway_motion`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    domain: String,
    object_id: String,
}

impl EntityId {
    /// Build an entity ID from its two parts
    pub fn new(
        domain: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Result<Self, EntityIdError> {
        let domain = domain.into();
        let object_id = object_id.into();

        if domain.contains("__") || !is_slug(&domain) {
            return Err(EntityIdError::InvalidDomain(domain));
        }
        if !is_slug(&object_id) {
            return Err(EntityIdError::InvalidObjectId(object_id));
        }

        Ok(Self { domain, object_id })
    }

    /// Build an entity ID whose object_id is derived from a display name
    ///
    /// `"Bathroom Occupancy"` in domain `binary_sensor` becomes
    /// `binary_sensor.bathroom_occupancy`.
    pub fn from_name(domain: impl Into<String>, name: &str) -> Result<Self, EntityIdError> {
        let object_id = slugify(name);
        if object_id.is_empty() {
            return Err(EntityIdError::InvalidObjectId(name.to_string()));
        }
        Self::new(domain, object_id)
    }

    /// The domain part (`binary_sensor`)
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The object_id part (`hallway_motion`)
    pub fn object_id(&self) -> &str {
        &self.object_id
    }
}

/// Lowercase ASCII alphanumerics and underscores, not starting or ending
/// with an underscore.
fn is_slug(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('_')
        && !s.ends_with('_')
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Turn free text into an object_id: runs of anything that is not an ASCII
/// alphanumeric collapse into one underscore.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((domain, object_id)) if !object_id.contains('.') => Self::new(domain, object_id),
            _ => Err(EntityIdError::InvalidFormat(s.to_string())),
        }
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.object_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entity_id() {
        let id: EntityId = "binary_sensor.hallway_motion".parse().unwrap();
        assert_eq!(id.domain(), "binary_sensor");
        assert_eq!(id.object_id(), "hallway_motion");
        assert_eq!(id.to_string(), "binary_sensor.hallway_motion");
    }

    #[test]
    fn test_invalid_format() {
        assert!(matches!(
            "no_separator".parse::<EntityId>(),
            Err(EntityIdError::InvalidFormat(_))
        ));
        assert!(matches!(
            "too.many.parts".parse::<EntityId>(),
            Err(EntityIdError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_invalid_parts() {
        assert!(matches!(
            ".door".parse::<EntityId>(),
            Err(EntityIdError::InvalidDomain(_))
        ));
        assert!(matches!(
            "binary_sensor.".parse::<EntityId>(),
            Err(EntityIdError::InvalidObjectId(_))
        ));
        assert!(matches!(
            "Binary_sensor.door".parse::<EntityId>(),
            Err(EntityIdError::InvalidDomain(_))
        ));
        assert!(matches!(
            "binary__sensor.door".parse::<EntityId>(),
            Err(EntityIdError::InvalidDomain(_))
        ));
        assert!(matches!(
            "binary_sensor._door".parse::<EntityId>(),
            Err(EntityIdError::InvalidObjectId(_))
        ));
        // double underscore is fine in the object_id
        assert!("binary_sensor.front__door".parse::<EntityId>().is_ok());
    }

    #[test]
    fn test_from_name() {
        let id = EntityId::from_name("binary_sensor", "Bathroom Occupancy").unwrap();
        assert_eq!(id.to_string(), "binary_sensor.bathroom_occupancy");

        let id = EntityId::from_name("binary_sensor", "  Wasp -- In a Box! ").unwrap();
        assert_eq!(id.to_string(), "binary_sensor.wasp_in_a_box");

        assert!(EntityId::from_name("binary_sensor", "***").is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let id = EntityId::new("input_boolean", "guest_mode").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"input_boolean.guest_mode\"");

        let err = serde_json::from_str::<EntityId>("\"nope\"");
        assert!(err.is_err());
    }
}
