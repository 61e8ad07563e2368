//! Simulated smart-home devices driven by received commands.
//!
//! The dashboard keeps one `DeviceState`: the four devices, the mode named
//! by the most recent command, and a short activity history.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, warn};

use crate::command::{Action, CommandPayload, Mode};

/// Entries kept in the activity history.
pub const HISTORY_LIMIT: usize = 20;

const SETPOINT_MIN_C: i32 = 16;
const SETPOINT_MAX_C: i32 = 30;
const LIGHT_STEP: u8 = 20;
const BLINDS_STEP: u8 = 25;

// ── Devices ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thermostat {
    pub ac_on: bool,
    pub setpoint_c: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lights {
    pub on: bool,
    /// Brightness, 0-100.
    pub level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Blinds {
    /// Openness, 0 (closed) to 100 (open).
    pub position: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Door {
    pub locked: bool,
}

/// Snapshot of every device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Devices {
    pub temperature: Thermostat,
    pub lights: Lights,
    pub blinds: Blinds,
    pub door: Door,
}

impl Default for Devices {
    fn default() -> Self {
        Self {
            temperature: Thermostat {
                ac_on: false,
                setpoint_c: 22,
            },
            lights: Lights {
                on: false,
                level: 0,
            },
            blinds: Blinds { position: 0 },
            door: Door { locked: true },
        }
    }
}

/// Result of applying one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Changed,
    /// Valid command that left the device as it was (e.g. already on).
    Unchanged,
    /// The device has no meaning for this action.
    Unsupported,
}

impl Devices {
    /// Apply `action` to the device for `mode`.
    pub fn apply(&mut self, mode: Mode, action: Action) -> ApplyOutcome {
        let before = self.clone();
        match mode {
            Mode::Temperature => {
                let t = &mut self.temperature;
                match action {
                    Action::On => t.ac_on = true,
                    Action::Off => t.ac_on = false,
                    Action::Up => t.setpoint_c = (t.setpoint_c + 1).min(SETPOINT_MAX_C),
                    Action::Down => t.setpoint_c = (t.setpoint_c - 1).max(SETPOINT_MIN_C),
                }
            }
            Mode::Lights => {
                let l = &mut self.lights;
                match action {
                    Action::On => {
                        l.on = true;
                        if l.level == 0 {
                            l.level = 100;
                        }
                    }
                    Action::Off => l.on = false,
                    Action::Up => {
                        l.level = l.level.saturating_add(LIGHT_STEP).min(100);
                        l.on = true;
                    }
                    Action::Down => {
                        l.level = l.level.saturating_sub(LIGHT_STEP);
                        if l.level == 0 {
                            l.on = false;
                        }
                    }
                }
            }
            Mode::Blinds => {
                let b = &mut self.blinds;
                b.position = match action {
                    Action::On => 100,
                    Action::Off => 0,
                    Action::Up => b.position.saturating_add(BLINDS_STEP).min(100),
                    Action::Down => b.position.saturating_sub(BLINDS_STEP),
                };
            }
            Mode::Door => match action {
                Action::On => self.door.locked = false,
                Action::Off => self.door.locked = true,
                Action::Up | Action::Down => return ApplyOutcome::Unsupported,
            },
        }

        if *self == before {
            ApplyOutcome::Unchanged
        } else {
            ApplyOutcome::Changed
        }
    }

    /// Short human-readable status for one device.
    pub fn describe(&self, mode: Mode) -> String {
        match mode {
            Mode::Temperature => format!(
                "AC {}, set to {}°C",
                if self.temperature.ac_on { "on" } else { "off" },
                self.temperature.setpoint_c
            ),
            Mode::Lights if self.lights.on => format!("on at {}%", self.lights.level),
            Mode::Lights => "off".to_string(),
            Mode::Blinds => match self.blinds.position {
                0 => "closed".to_string(),
                100 => "open".to_string(),
                p => format!("{p}% open"),
            },
            Mode::Door if self.door.locked => "locked".to_string(),
            Mode::Door => "unlocked".to_string(),
        }
    }
}

// ── Dashboard state ────────────────────────────────────────

/// One applied command, as shown in the activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEntry {
    pub mode: Mode,
    pub action: Action,
    /// Timestamp carried by the command (unix ms).
    pub sent_ms: u64,
    /// When the dashboard received it (unix ms).
    pub received_ms: u64,
    /// Device status after the command.
    pub status: String,
}

/// Everything the dashboard displays.
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    pub devices: Devices,
    pub current_mode: Option<Mode>,
    history: VecDeque<ActivityEntry>,
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a received command and record it in the history.
    ///
    /// Unsupported commands still set the current mode but are not
    /// recorded.
    pub fn apply(&mut self, payload: &CommandPayload, received_ms: u64) -> ApplyOutcome {
        self.current_mode = Some(payload.mode);
        let outcome = self.devices.apply(payload.mode, payload.action);

        if outcome == ApplyOutcome::Unsupported {
            warn!(
                mode = %payload.mode,
                action = %payload.action,
                "action not supported by device, ignoring"
            );
            return outcome;
        }

        let entry = ActivityEntry {
            mode: payload.mode,
            action: payload.action,
            sent_ms: payload.timestamp,
            received_ms,
            status: self.devices.describe(payload.mode),
        };
        debug!(mode = %entry.mode, status = %entry.status, ?outcome, "command applied");

        self.history.push_front(entry);
        self.history.truncate(HISTORY_LIMIT);
        outcome
    }

    /// Activity history, newest first.
    pub fn history(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.history.iter()
    }

    pub fn latest(&self) -> Option<&ActivityEntry> {
        self.history.front()
    }
}

// ── Tests ──────────────────────────────────────────────────
