//! Smart-home commands and their wire payload.
//!
//! A `Command` is one committed (mode, action) selection.  It travels over
//! the broker as a small JSON object:
//!
//! ```json
//! {"mode": "blinds", "action": "up", "timestamp": 1718000000000}
//! ```

use std::fmt;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::json;

// ── Mode ───────────────────────────────────────────────────

/// Device category armed for control.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Temperature,
    Lights,
    Blinds,
    Door,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Self::Temperature, Self::Lights, Self::Blinds, Self::Door];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Lights => "lights",
            Self::Blinds => "blinds",
            Self::Door => "door",
        }
    }

    /// Mode selected by holding up `count` fingers (1-4).
    pub fn from_finger_count(count: u8) -> Option<Mode> {
        match count {
            1 => Some(Self::Temperature),
            2 => Some(Self::Lights),
            3 => Some(Self::Blinds),
            4 => Some(Self::Door),
            _ => None,
        }
    }

    pub fn finger_count(&self) -> u8 {
        match self {
            Self::Temperature => 1,
            Self::Lights => 2,
            Self::Blinds => 3,
            Self::Door => 4,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Action ─────────────────────────────────────────────────

/// Operation applied to the armed mode.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    On,
    Off,
    Up,
    Down,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Command ────────────────────────────────────────────────

/// A committed gesture selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub mode: Mode,
    pub action: Action,
    /// Per-session sequence number, starting at 1.
    pub seq: u64,
    /// Unix milliseconds at which the committing frame was received.
    pub timestamp_ms: u64,
}

impl Command {
    /// Wire payload for this command.
    pub fn payload(&self) -> CommandPayload {
        CommandPayload {
            mode: self.mode,
            action: self.action,
            timestamp: self.timestamp_ms,
        }
    }

    /// Encode the wire payload as a JSON string.
    pub fn encode(&self) -> String {
        json!(self.payload()).to_string()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} {}", self.seq, self.mode, self.action)
    }
}

/// The JSON object published on the command topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub mode: Mode,
    pub action: Action,
    pub timestamp: u64,
}

impl CommandPayload {
    /// Decode a payload received from the broker.
    pub fn decode(raw: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(raw).context("invalid command payload")
    }
}

// ── Tests ──────────────────────────────────────────────────
