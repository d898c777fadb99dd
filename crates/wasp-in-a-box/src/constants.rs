//! Constants for the wasp_in_a_box integration

use std::ops::RangeInclusive;

pub const DOMAIN: &str = "wasp_in_a_box";

/// Domain of the entity each entry creates
pub const OUTPUT_DOMAIN: &str = "binary_sensor";

/// Domains an input entity may belong to
pub const INPUT_DOMAINS: &[&str] = &["binary_sensor", "input_boolean"];

pub const DEVICE_CLASS_OCCUPANCY: &str = "occupancy";

pub const CONF_DOOR_CLOSED_DELAY: &str = "door_closed_delay";
pub const CONF_DOOR_OPEN_TIMEOUT: &str = "door_open_timeout";

pub const DEFAULT_DOOR_CLOSED_DELAY: u64 = 30;
pub const DEFAULT_DOOR_OPEN_TIMEOUT: u64 = 300;
pub const DEFAULT_IMMEDIATE_ON: bool = true;

/// Seconds
pub const DOOR_CLOSED_DELAY_RANGE: RangeInclusive<u64> = 1..=600;
/// Seconds
pub const DOOR_OPEN_TIMEOUT_RANGE: RangeInclusive<u64> = 1..=3600;
