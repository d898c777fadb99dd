//! Registries
//!
//! Only the entity registry is needed by the integration: it resolves the
//! configured input ids, records the occupancy sensor it creates, and tells
//! listeners when a tracked entity is renamed or removed.
//!
//! Entries live for the lifetime of the process; nothing is persisted.

pub mod entity_registry;

pub use entity_registry::{EntityEntry, EntityRegistry, RegistryError, RegistryResult};
