//! Fuser configuration

use std::time::Duration;

use crate::signal::Vocabulary;
use crate::timer::TimerKind;

pub const DEFAULT_DOOR_CLOSED_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_DOOR_OPEN_TIMEOUT: Duration = Duration::from_secs(300);

/// Per-instance settings, fixed for the fuser's lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuserConfig {
    /// How long a just-closed door waits before motion is re-evaluated
    pub door_closed_delay: Duration,
    /// How long an open door with no motion keeps the room occupied
    pub door_open_timeout: Duration,
    /// Open door or fresh motion means occupied right away
    pub immediate_on: bool,
    pub vocabulary: Vocabulary,
}

impl FuserConfig {
    pub fn with_door_closed_delay(mut self, delay: Duration) -> Self {
        self.door_closed_delay = delay;
        self
    }

    pub fn with_door_open_timeout(mut self, timeout: Duration) -> Self {
        self.door_open_timeout = timeout;
        self
    }

    pub fn with_immediate_on(mut self, immediate_on: bool) -> Self {
        self.immediate_on = immediate_on;
        self
    }

    pub fn with_vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    /// Duration of a timer kind
    pub fn duration_of(&self, kind: TimerKind) -> Duration {
        match kind {
            TimerKind::DoorClosedDelay => self.door_closed_delay,
            TimerKind::DoorOpenTimeout => self.door_open_timeout,
        }
    }
}

impl Default for FuserConfig {
    fn default() -> Self {
        Self {
            door_closed_delay: DEFAULT_DOOR_CLOSED_DELAY,
            door_open_timeout: DEFAULT_DOOR_OPEN_TIMEOUT,
            immediate_on: true,
            vocabulary: Vocabulary::Binary,
        }
    }
}
