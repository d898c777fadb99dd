//! The occupancy state machine

use tracing::{debug, trace};

use crate::config::FuserConfig;
use crate::output::{Occupancy, OccupancySink};
use crate::signal::InputSignal;
use crate::timer::{Scheduler, TimerKind, TimerSlot, TimerToken};

/// Fuses a motion input and a door input into an occupancy output
///
/// All transitions run to completion on the caller's thread; timer expiries
/// come back through [`OccupancyFuser::timer_fired`] and interleave with input
/// notifications in arrival order.
///
/// Dropping the fuser cancels both timers.
pub struct OccupancyFuser<S: Scheduler, O: OccupancySink> {
    config: FuserConfig,
    scheduler: S,
    sink: O,
    motion: InputSignal,
    door: InputSignal,
    /// Motion seen since the last timer expiry
    motion_latch: bool,
    door_closed_timer: TimerSlot<S::Handle>,
    door_open_timer: TimerSlot<S::Handle>,
    next_generation: u64,
    output: Occupancy,
}

impl<S: Scheduler, O: OccupancySink> OccupancyFuser<S, O> {
    pub fn new(config: FuserConfig, scheduler: S, sink: O) -> Self {
        Self {
            config,
            scheduler,
            sink,
            motion: InputSignal::Unknown,
            door: InputSignal::Unknown,
            motion_latch: false,
            door_closed_timer: TimerSlot::new(),
            door_open_timer: TimerSlot::new(),
            next_generation: 0,
            output: Occupancy::Unknown,
        }
    }

    /// The motion (wasp) input changed to `new`
    pub fn motion_changed(&mut self, new: Option<&str>) {
        let motion = self.config.vocabulary.normalize(new);
        debug!(raw = ?new, %motion, "Wasp state changed");
        self.motion = motion;

        self.cancel(TimerKind::DoorOpenTimeout);

        if motion == InputSignal::Inactive && self.door != InputSignal::Inactive {
            debug!(
                "Motion unoccupied and door open, waiting {} seconds before recalculating",
                self.config.door_open_timeout.as_secs()
            );
            self.arm(TimerKind::DoorOpenTimeout);
        }

        self.recompute();
    }

    /// The door (box) input changed from `previous` to `new`
    pub fn door_changed(&mut self, previous: Option<&str>, new: Option<&str>) {
        let previous = self.config.vocabulary.normalize(previous);
        let door = self.config.vocabulary.normalize(new);
        debug!(raw = ?new, from = %previous, to = %door, "Box state changed");
        self.door_transition(previous, door);
    }

    /// Catch up with inputs whose changes may have been missed
    ///
    /// Each input whose value differs from the last one seen goes through
    /// its normal transition, motion first. Nothing happens for inputs that
    /// still match.
    pub fn resync(&mut self, motion: Option<&str>, door: Option<&str>) {
        let vocabulary = self.config.vocabulary;
        if vocabulary.normalize(motion) != self.motion {
            self.motion_changed(motion);
        }

        let door_now = vocabulary.normalize(door);
        if door_now != self.door {
            debug!(raw = ?door, from = %self.door, to = %door_now, "Box state resynced");
            self.door_transition(self.door, door_now);
        }
    }

    fn door_transition(&mut self, previous: InputSignal, door: InputSignal) {
        self.door = door;

        if previous == InputSignal::Active && door == InputSignal::Inactive {
            // Recalculated when the delay expires
            debug!(
                "Door closed, waiting {} seconds before recalculating",
                self.config.door_closed_delay.as_secs()
            );
            self.arm(TimerKind::DoorClosedDelay);
            return;
        }

        self.cancel(TimerKind::DoorClosedDelay);
        self.cancel(TimerKind::DoorOpenTimeout);

        if self.motion == InputSignal::Inactive && door == InputSignal::Active {
            debug!(
                "Motion unoccupied and door open, waiting {} seconds before recalculating",
                self.config.door_open_timeout.as_secs()
            );
            self.arm(TimerKind::DoorOpenTimeout);
        }

        self.recompute();
    }

    /// A timer armed by this fuser expired
    ///
    /// Tokens of timers that were cancelled or re-armed since are ignored.
    pub fn timer_fired(&mut self, token: TimerToken) {
        if !self.slot(token.kind).take_if_current(token) {
            trace!(kind = %token.kind, generation = token.generation, "Ignoring stale timer");
            return;
        }

        match token.kind {
            TimerKind::DoorClosedDelay => {
                debug!("Door closed delay expired, recalculating state");
                self.motion_latch = false;
                self.recompute();
            }
            TimerKind::DoorOpenTimeout => {
                debug!("Door open timeout expired, setting state to off");
                self.motion = InputSignal::Inactive;
                self.motion_latch = false;
                self.emit(Occupancy::Unoccupied);
            }
        }
    }

    /// Recompute the output from the current state and publish it
    pub fn recompute(&mut self) -> Occupancy {
        debug!(
            motion = %self.motion,
            door = %self.door,
            motion_latch = self.motion_latch,
            "Calculating state"
        );

        if self.motion == InputSignal::Unknown {
            self.emit(Occupancy::Unknown);
            return self.output;
        }

        let door_closed = self.door == InputSignal::Inactive;
        let motion_now = self.motion == InputSignal::Active;
        self.motion_latch = motion_now || self.motion_latch;

        let immediate_on = self.config.immediate_on;
        let occupancy = if (door_closed && self.motion_latch)
            || (immediate_on && (!door_closed || motion_now))
        {
            Occupancy::Occupied
        } else {
            Occupancy::Unoccupied
        };

        self.emit(occupancy);
        self.output
    }

    /// Cancel both timers
    pub fn shutdown(&mut self) {
        let closed = self.door_closed_timer.cancel();
        let open = self.door_open_timer.cancel();
        if closed || open {
            debug!("Cancelled pending timers");
        }
    }

    pub fn output(&self) -> Occupancy {
        self.output
    }

    pub fn motion(&self) -> InputSignal {
        self.motion
    }

    pub fn door(&self) -> InputSignal {
        self.door
    }

    pub fn motion_latch(&self) -> bool {
        self.motion_latch
    }

    pub fn is_pending(&self, kind: TimerKind) -> bool {
        match kind {
            TimerKind::DoorClosedDelay => self.door_closed_timer.is_pending(),
            TimerKind::DoorOpenTimeout => self.door_open_timer.is_pending(),
        }
    }

    pub fn config(&self) -> &FuserConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn sink(&self) -> &O {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut O {
        &mut self.sink
    }

    fn slot(&mut self, kind: TimerKind) -> &mut TimerSlot<S::Handle> {
        match kind {
            TimerKind::DoorClosedDelay => &mut self.door_closed_timer,
            TimerKind::DoorOpenTimeout => &mut self.door_open_timer,
        }
    }

    fn cancel(&mut self, kind: TimerKind) {
        if self.slot(kind).cancel() {
            trace!(%kind, "Cancelled timer");
        }
    }

    fn arm(&mut self, kind: TimerKind) {
        self.cancel(kind);

        self.next_generation += 1;
        let token = TimerToken {
            kind,
            generation: self.next_generation,
        };
        let after = self.config.duration_of(kind);
        let handle = self.scheduler.schedule_after(after, token);
        self.slot(kind).set(token, handle);
    }

    fn emit(&mut self, occupancy: Occupancy) {
        self.output = occupancy;
        self.sink.publish(occupancy);
    }
}

impl<S: Scheduler, O: OccupancySink> Drop for OccupancyFuser<S, O> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
