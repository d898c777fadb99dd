//! Timer primitive consumed by the fuser

use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Armed when the door closes; expiry clears the motion latch
    DoorClosedDelay,
    /// Armed when motion stops with the door open; expiry declares the room empty
    DoorOpenTimeout,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerKind::DoorClosedDelay => f.write_str("door_closed_delay"),
            TimerKind::DoorOpenTimeout => f.write_str("door_open_timeout"),
        }
    }
}

/// Identifies one arming of a timer
///
/// The scheduler hands the token back on expiry. An expiry whose token is no
/// longer the armed one (cancelled or re-armed meanwhile) is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub generation: u64,
}

/// One-shot delayed delivery of a [`TimerToken`]
pub trait Scheduler {
    type Handle: TimerHandle;

    /// Deliver `token` back to the fuser after `after`
    fn schedule_after(&mut self, after: Duration, token: TimerToken) -> Self::Handle;
}

pub trait TimerHandle {
    /// Stop the timer; a no-op once it fired or was cancelled
    fn cancel(&mut self);
}

/// At most one pending timer of a kind
#[derive(Debug)]
pub(crate) struct TimerSlot<H> {
    pending: Option<(TimerToken, H)>,
}

impl<H: TimerHandle> TimerSlot<H> {
    pub(crate) fn new() -> Self {
        Self { pending: None }
    }

    /// Cancel the pending timer, returning whether there was one
    pub(crate) fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some((_, mut handle)) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn set(&mut self, token: TimerToken, handle: H) {
        self.cancel();
        self.pending = Some((token, handle));
    }

    /// Clear the slot if `token` is the armed one
    pub(crate) fn take_if_current(&mut self, token: TimerToken) -> bool {
        match &self.pending {
            Some((armed, _)) if *armed == token => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
