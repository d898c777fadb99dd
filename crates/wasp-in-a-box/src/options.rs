//! Config entry options

use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wasp_config_entries::Options;
use wasp_core::EntityId;
use wasp_fuser::{FuserConfig, Vocabulary};

use crate::constants::{
    CONF_DOOR_CLOSED_DELAY, CONF_DOOR_OPEN_TIMEOUT, DEFAULT_DOOR_CLOSED_DELAY,
    DEFAULT_DOOR_OPEN_TIMEOUT, DEFAULT_IMMEDIATE_ON, DOOR_CLOSED_DELAY_RANGE,
    DOOR_OPEN_TIMEOUT_RANGE, INPUT_DOMAINS,
};

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("Invalid options: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{option} must be between {} and {} seconds, got {value}", .range.start(), .range.end())]
    OutOfRange {
        option: &'static str,
        value: u64,
        range: RangeInclusive<u64>,
    },

    #[error("{0} is not a binary_sensor or input_boolean")]
    UnsupportedDomain(EntityId),

    #[error("Motion and door must be different entities, both are {0}")]
    SameEntity(EntityId),
}

/// Options of one wasp-in-a-box entry
///
/// Entity ids may be given as entity ids or as entity registry ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaspInABoxOptions {
    /// Motion sensor
    pub wasp_id: String,
    /// Door sensor
    pub box_id: String,
    /// Seconds; `delay` is the version 1 name
    #[serde(default = "default_door_closed_delay", alias = "delay")]
    pub door_closed_delay: u64,
    /// Seconds
    #[serde(default = "default_door_open_timeout")]
    pub door_open_timeout: u64,
    #[serde(default = "default_immediate_on")]
    pub immediate_on: bool,
    #[serde(default)]
    pub vocabulary: Vocabulary,
}

fn default_door_closed_delay() -> u64 {
    DEFAULT_DOOR_CLOSED_DELAY
}

fn default_door_open_timeout() -> u64 {
    DEFAULT_DOOR_OPEN_TIMEOUT
}

fn default_immediate_on() -> bool {
    DEFAULT_IMMEDIATE_ON
}

impl WaspInABoxOptions {
    pub fn new(wasp_id: impl Into<String>, box_id: impl Into<String>) -> Self {
        Self {
            wasp_id: wasp_id.into(),
            box_id: box_id.into(),
            door_closed_delay: DEFAULT_DOOR_CLOSED_DELAY,
            door_open_timeout: DEFAULT_DOOR_OPEN_TIMEOUT,
            immediate_on: DEFAULT_IMMEDIATE_ON,
            vocabulary: Vocabulary::default(),
        }
    }

    /// Parse and validate the options of a config entry
    pub fn from_options(options: &Options) -> Result<Self, OptionsError> {
        let value = serde_json::Value::Object(options.clone().into_iter().collect());
        let parsed: Self = serde_json::from_value(value)?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn to_options(&self) -> Result<Options, OptionsError> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
            _ => Ok(Options::new()),
        }
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        check_range(CONF_DOOR_CLOSED_DELAY, self.door_closed_delay, DOOR_CLOSED_DELAY_RANGE)?;
        check_range(CONF_DOOR_OPEN_TIMEOUT, self.door_open_timeout, DOOR_OPEN_TIMEOUT_RANGE)?;
        Ok(())
    }

    pub fn fuser_config(&self) -> FuserConfig {
        FuserConfig::default()
            .with_door_closed_delay(Duration::from_secs(self.door_closed_delay))
            .with_door_open_timeout(Duration::from_secs(self.door_open_timeout))
            .with_immediate_on(self.immediate_on)
            .with_vocabulary(self.vocabulary)
    }

    /// Point every reference to `old` at `new`, returning whether anything changed
    pub fn rename(&mut self, old: &EntityId, new: &EntityId) -> bool {
        let old = old.to_string();
        let mut changed = false;
        for id in [&mut self.wasp_id, &mut self.box_id] {
            if *id == old {
                *id = new.to_string();
                changed = true;
            }
        }
        changed
    }
}

fn check_range(
    option: &'static str,
    value: u64,
    range: RangeInclusive<u64>,
) -> Result<(), OptionsError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(OptionsError::OutOfRange {
            option,
            value,
            range,
        })
    }
}

/// Check the resolved input entities
pub fn validate_inputs(wasp: &EntityId, door: &EntityId) -> Result<(), OptionsError> {
    for entity_id in [wasp, door] {
        if !INPUT_DOMAINS.contains(&entity_id.domain()) {
            return Err(OptionsError::UnsupportedDomain(entity_id.clone()));
        }
    }
    if wasp == door {
        return Err(OptionsError::SameEntity(wasp.clone()));
    }
    Ok(())
}
