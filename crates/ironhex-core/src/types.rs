//! Core type aliases used throughout the crate.

use serde::{Deserialize, Serialize};

/// Unique identifier for a game session.
pub type SessionId = String;

/// Unique identifier for a participant.
pub type PlayerId = String;

/// Unique identifier for a unit.
pub type UnitId = u64;

/// Milliseconds since the Unix epoch, as stamped by the command originator.
pub type Timestamp = u64;

/// Monotonic position of a broadcast in the authoritative event sequence.
pub type Sequence = u64;

/// Color tag for player identification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl PlayerColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Default colors by join order.
    pub const fn default_for_slot(slot: usize) -> Self {
        match slot {
            0 => Self::new(200, 30, 30),    // Red
            1 => Self::new(30, 60, 200),    // Blue
            2 => Self::new(220, 200, 20),   // Yellow
            3 => Self::new(30, 160, 60),    // Green
            4 => Self::new(128, 0, 128),    // Purple
            5 => Self::new(255, 140, 0),    // Orange
            _ => Self::new(128, 128, 128), // Gray
        }
    }

    /// Convert to hex string (e.g., "#C81E1E").
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl Default for PlayerColor {
    fn default() -> Self {
        Self::new(128, 128, 128)
    }
}
