//! Wasp-in-a-box integration
//!
//! Each config entry of the `wasp_in_a_box` domain creates one occupancy
//! `binary_sensor` fed by a motion sensor (the wasp) and a door sensor (the
//! box). The entry follows its inputs in the entity registry: removing an
//! input removes the entry, renaming one reloads it.
//!
//! # Key Types
//!
//! - [`WaspInABox`] - Config entry handler registered for the domain
//! - [`WaspInABoxOptions`] - Parsed and validated entry options
//! - [`WaspInABoxSensor`] - The running sensor task of one entry

pub mod binary_sensor;
pub mod constants;
pub mod integration;
pub mod options;

pub use binary_sensor::{SensorSpec, StateStoreSink, TokioScheduler, WaspInABoxSensor};
pub use constants::DOMAIN;
pub use integration::{SetupError, WaspInABox};
pub use options::{OptionsError, WaspInABoxOptions};
