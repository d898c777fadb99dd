//! Config Entries
//!
//! A config entry is one configured instance of an integration, here one
//! wasp-in-a-box occupancy sensor. This crate owns the entry type, the
//! lifecycle state machine and the manager that drives setup, unload,
//! reload and removal through the integration's handler.
//!
//! # Key Types
//!
//! - [`ConfigEntry`] - A single integration configuration
//! - [`ConfigEntryState`] - Lifecycle state of an entry
//! - [`ConfigEntries`] - Manager for all config entries
//! - [`Integration`] - Handler an integration registers for its domain

pub mod entry;
pub mod manager;
pub mod state_machine;

pub use entry::{ConfigEntry, ConfigEntrySource, ConfigEntryState, Options};
pub use manager::{ConfigEntries, ConfigEntriesError, ConfigEntriesResult, Integration};
pub use state_machine::InvalidTransition;
