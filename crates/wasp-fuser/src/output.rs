//! Occupancy output

use std::fmt;

/// Fused occupancy of the room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Occupancy {
    Occupied,
    Unoccupied,
    #[default]
    Unknown,
}

impl Occupancy {
    /// Binary sensor state value (`on` / `off` / `unknown`)
    pub fn as_state(&self) -> &'static str {
        match self {
            Occupancy::Occupied => "on",
            Occupancy::Unoccupied => "off",
            Occupancy::Unknown => "unknown",
        }
    }

    pub fn is_occupied(&self) -> bool {
        *self == Occupancy::Occupied
    }
}

impl fmt::Display for Occupancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_state())
    }
}

/// Receiver of every computed occupancy value
///
/// Called once per recompute, so consecutive values may repeat.
pub trait OccupancySink {
    fn publish(&mut self, occupancy: Occupancy);
}

impl<F: FnMut(Occupancy)> OccupancySink for F {
    fn publish(&mut self, occupancy: Occupancy) {
        self(occupancy)
    }
}
