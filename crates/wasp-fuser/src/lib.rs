//! Wasp-in-a-box occupancy fusion
//!
//! Derives a room occupancy signal from a motion sensor (the wasp) and a
//! door sensor (the box). A room whose door is closed and in which motion was
//! seen stays occupied until the door opens, even when the motion sensor
//! stops reporting.
//!
//! The state machine is sans-IO: it is driven by input notifications and
//! timer expiries, arms timers through a [`Scheduler`] and reports results to
//! an [`OccupancySink`]. The host decides how time passes and where the
//! output goes.
//!
//! # Key Types
//!
//! - [`OccupancyFuser`] - The state machine
//! - [`InputSignal`] - Normalized tri-state input value
//! - [`Occupancy`] - Tri-state output
//! - [`FuserConfig`] - Delays and switches, fixed per instance

pub mod config;
pub mod fuser;
pub mod output;
pub mod signal;
pub mod timer;

pub use config::FuserConfig;
pub use fuser::OccupancyFuser;
pub use output::{Occupancy, OccupancySink};
pub use signal::{InputSignal, Vocabulary};
pub use timer::{Scheduler, TimerHandle, TimerKind, TimerToken};
