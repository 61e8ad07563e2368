//! Debounced gesture state machine.
//!
//! Consumes one `PoseLabel` per frame and decides when a mode is armed and
//! when an action is committed.  A pose must be held for `mode_frames`
//! consecutive frames to lock a mode, and an action shape for
//! `action_frames` frames to commit a `Command`.  Holding a shape keeps
//! committing once per full debounce cycle.
//!
//! ```text
//!   Idle ──count×T_mode──▶ ModeLocked ──shape×T_action──▶ Committed
//!    ▲                       │   ▲                           │
//!    │ timeout / pinch       │   └───────────────────────────┘
//!    └───────────────────────┘
//! ```

use std::fmt;

use tracing::{debug, info};

use super::pose::PoseLabel;
use crate::command::{Action, Command, Mode};

// ── Config ─────────────────────────────────────────────────

/// Debounce and timeout settings.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Consecutive frames of a finger count needed to lock a mode.
    pub mode_frames: u32,
    /// Consecutive frames of a shape needed to commit an action.
    pub action_frames: u32,
    /// How long an armed mode survives without a hand (ms).
    pub idle_timeout_ms: u64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            mode_frames: 10,
            action_frames: 10,
            idle_timeout_ms: 5000,
        }
    }
}

// ── States and events ──────────────────────────────────────

/// Current position in the selection flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    /// Nothing armed.
    Idle,
    /// A finger count is being held.  `armed` is the mode that was locked
    /// when this re-selection started, if any.
    ModeSelecting {
        candidate: Mode,
        frames: u32,
        armed: Option<Mode>,
    },
    /// A mode is armed and waiting for an action.
    ModeLocked { mode: Mode },
    /// An action shape is being held against the armed mode.
    ActionSelecting {
        mode: Mode,
        candidate: Action,
        frames: u32,
    },
    /// A pinch is being held to disarm the mode.
    Releasing { mode: Mode, frames: u32 },
}

impl MachineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ModeSelecting { .. } => "mode-selecting",
            Self::ModeLocked { .. } => "mode-locked",
            Self::ActionSelecting { .. } => "action-selecting",
            Self::Releasing { .. } => "releasing",
        }
    }

    /// Mode currently armed, if any.  A re-selection keeps the previous
    /// mode armed until the new one locks.
    pub fn armed_mode(&self) -> Option<Mode> {
        match *self {
            Self::Idle => None,
            Self::ModeSelecting { armed, .. } => armed,
            Self::ModeLocked { mode }
            | Self::ActionSelecting { mode, .. }
            | Self::Releasing { mode, .. } => Some(mode),
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::ModeSelecting {
                candidate, frames, ..
            } => write!(f, "mode-selecting({candidate}, {frames})"),
            Self::ModeLocked { mode } => write!(f, "mode-locked({mode})"),
            Self::ActionSelecting {
                mode,
                candidate,
                frames,
            } => write!(f, "action-selecting({mode}, {candidate}, {frames})"),
            Self::Releasing { mode, frames } => write!(f, "releasing({mode}, {frames})"),
        }
    }
}

/// Something the frame loop should act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GestureEvent {
    /// A mode finished debouncing and is now armed.
    ModeLocked { mode: Mode },
    /// An action finished debouncing; publish this command.
    Committed(Command),
    /// A held pinch disarmed the mode.
    Released { mode: Mode },
    /// The hand was gone longer than the idle timeout.
    TimedOut { mode: Mode },
}

// ── Machine ────────────────────────────────────────────────

/// One session's gesture state.  Owned by the frame loop.
#[derive(Debug)]
pub struct GestureMachine {
    pub config: MachineConfig,
    state: MachineState,
    next_seq: u64,
    last_seen_ms: Option<u64>,
}

impl GestureMachine {
    pub fn new(config: MachineConfig) -> Self {
        Self {
            config,
            state: MachineState::Idle,
            next_seq: 1,
            last_seen_ms: None,
        }
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    /// Number of commands committed so far.
    pub fn committed(&self) -> u64 {
        self.next_seq - 1
    }

    /// Advance by one frame.
    pub fn update(&mut self, pose: PoseLabel, timestamp_ms: u64) -> Option<GestureEvent> {
        if pose.is_hand() {
            self.last_seen_ms = Some(timestamp_ms);
        }

        let (next, event) = match self.state {
            MachineState::Idle => match pose.mode() {
                Some(mode) => self.select_mode(mode, 1, None),
                None => (MachineState::Idle, None),
            },

            MachineState::ModeSelecting {
                candidate,
                frames,
                armed,
            } => match (pose, pose.mode()) {
                (PoseLabel::NoHand, _) => (MachineState::Idle, None),
                (_, Some(mode)) if mode == candidate => {
                    self.select_mode(candidate, frames + 1, armed)
                }
                (_, Some(mode)) => match armed {
                    Some(previous) if previous == mode => {
                        (MachineState::ModeLocked { mode }, None)
                    }
                    _ => self.select_mode(mode, 1, armed),
                },
                (_, None) => match armed {
                    Some(mode) => self.locked(mode, pose, timestamp_ms),
                    None => (MachineState::Idle, None),
                },
            },

            MachineState::ModeLocked { mode } => self.locked(mode, pose, timestamp_ms),

            MachineState::ActionSelecting {
                mode,
                candidate,
                frames,
            } => match (pose, pose.action()) {
                (PoseLabel::NoHand, _) => (MachineState::ModeLocked { mode }, None),
                (_, Some(action)) if action == candidate => {
                    self.select_action(mode, candidate, frames + 1, timestamp_ms)
                }
                _ => self.locked(mode, pose, timestamp_ms),
            },

            MachineState::Releasing { mode, frames } => match pose {
                PoseLabel::Pinch => self.release(mode, frames + 1),
                PoseLabel::NoHand => (MachineState::ModeLocked { mode }, None),
                _ => self.locked(mode, pose, timestamp_ms),
            },
        };

        if next != self.state {
            debug!(from = %self.state, to = %next, pose = %pose, "gesture state");
        }
        self.state = next;
        event
    }

    /// Advance the clock without a frame.  Only the idle timeout is
    /// checked; candidates and their frame counts are left alone.
    pub fn tick(&mut self, now_ms: u64) -> Option<GestureEvent> {
        if self.state == MachineState::Idle {
            return None;
        }
        let elapsed = self
            .last_seen_ms
            .map_or(0, |seen| now_ms.saturating_sub(seen));
        if elapsed < self.config.idle_timeout_ms {
            return None;
        }

        let armed = self.state.armed_mode();
        debug!(from = %self.state, elapsed_ms = elapsed, "input stalled");
        self.state = MachineState::Idle;
        armed.map(|mode| {
            info!(mode = %mode, elapsed_ms = elapsed, "no input, disarming");
            GestureEvent::TimedOut { mode }
        })
    }

    /// Reaction to `pose` while `mode` is armed and nothing is being held.
    fn locked(
        &mut self,
        mode: Mode,
        pose: PoseLabel,
        timestamp_ms: u64,
    ) -> (MachineState, Option<GestureEvent>) {
        if let Some(action) = pose.action() {
            return self.select_action(mode, action, 1, timestamp_ms);
        }

        match pose {
            PoseLabel::Pinch => self.release(mode, 1),
            PoseLabel::NoHand => {
                let elapsed = self
                    .last_seen_ms
                    .map_or(0, |seen| timestamp_ms.saturating_sub(seen));
                if elapsed >= self.config.idle_timeout_ms {
                    info!(mode = %mode, elapsed_ms = elapsed, "no hand, disarming");
                    (MachineState::Idle, Some(GestureEvent::TimedOut { mode }))
                } else {
                    (MachineState::ModeLocked { mode }, None)
                }
            }
            _ => match pose.mode() {
                Some(next) if next != mode => self.select_mode(next, 1, Some(mode)),
                _ => (MachineState::ModeLocked { mode }, None),
            },
        }
    }

    fn select_mode(
        &mut self,
        candidate: Mode,
        frames: u32,
        armed: Option<Mode>,
    ) -> (MachineState, Option<GestureEvent>) {
        if frames >= self.config.mode_frames.max(1) {
            info!(mode = %candidate, "mode locked");
            return (
                MachineState::ModeLocked { mode: candidate },
                Some(GestureEvent::ModeLocked { mode: candidate }),
            );
        }
        (
            MachineState::ModeSelecting {
                candidate,
                frames,
                armed,
            },
            None,
        )
    }

    fn select_action(
        &mut self,
        mode: Mode,
        candidate: Action,
        frames: u32,
        timestamp_ms: u64,
    ) -> (MachineState, Option<GestureEvent>) {
        if frames >= self.config.action_frames.max(1) {
            let command = Command {
                mode,
                action: candidate,
                seq: self.next_seq,
                timestamp_ms,
            };
            self.next_seq += 1;
            info!(seq = command.seq, mode = %mode, action = %candidate, "command committed");
            return (
                MachineState::ModeLocked { mode },
                Some(GestureEvent::Committed(command)),
            );
        }
        (
            MachineState::ActionSelecting {
                mode,
                candidate,
                frames,
            },
            None,
        )
    }

    fn release(&mut self, mode: Mode, frames: u32) -> (MachineState, Option<GestureEvent>) {
        if frames >= self.config.action_frames.max(1) {
            info!(mode = %mode, "mode released");
            return (MachineState::Idle, Some(GestureEvent::Released { mode }));
        }
        (MachineState::Releasing { mode, frames }, None)
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const T: u32 = 10;

    struct Run {
        machine: GestureMachine,
        now_ms: u64,
    }

    impl Run {
        fn new() -> Self {
            Self {
                machine: GestureMachine::new(MachineConfig::default()),
                now_ms: 1_000,
            }
        }

        /// Feed `pose` for `frames` frames at 30 fps, collecting events.
        fn feed(&mut self, pose: PoseLabel, frames: u32) -> Vec<GestureEvent> {
            let mut events = Vec::new();
            for _ in 0..frames {
                self.now_ms += 33;
                events.extend(self.machine.update(pose, self.now_ms));
            }
            events
        }

        fn commands(events: &[GestureEvent]) -> Vec<Command> {
            events
                .iter()
                .filter_map(|e| match e {
                    GestureEvent::Committed(cmd) => Some(*cmd),
                    _ => None,
                })
                .collect()
        }

        fn lock(&mut self, mode: Mode) {
            self.feed(PoseLabel::FingerCount(mode.finger_count()), T);
            assert_eq!(self.machine.state(), MachineState::ModeLocked { mode });
        }
    }

    #[test]
    fn test_starts_idle() {
        let run = Run::new();
        assert_eq!(run.machine.state(), MachineState::Idle);
        assert_eq!(run.machine.state().armed_mode(), None);
        assert_eq!(run.machine.committed(), 0);
    }

    #[test]
    fn test_idle_ignores_shapes_and_out_of_range_counts() {
        let mut run = Run::new();
        for pose in [
            PoseLabel::OpenHand,
            PoseLabel::Fist,
            PoseLabel::PointLeft,
            PoseLabel::Pinch,
            PoseLabel::FingerCount(0),
            PoseLabel::FingerCount(5),
            PoseLabel::NoHand,
        ] {
            assert!(run.feed(pose, T * 2).is_empty());
            assert_eq!(run.machine.state(), MachineState::Idle, "after {pose}");
        }
    }

    #[test]
    fn test_mode_lock_emits_no_command() {
        let mut run = Run::new();
        let events = run.feed(PoseLabel::FingerCount(2), T);
        assert_eq!(events, vec![GestureEvent::ModeLocked { mode: Mode::Lights }]);
        assert_eq!(
            run.machine.state(),
            MachineState::ModeLocked { mode: Mode::Lights }
        );
    }

    #[test]
    fn test_mode_needs_full_debounce() {
        let mut run = Run::new();
        run.feed(PoseLabel::FingerCount(2), T - 1);
        assert!(matches!(
            run.machine.state(),
            MachineState::ModeSelecting {
                candidate: Mode::Lights,
                frames: 9,
                armed: None,
            }
        ));
    }

    #[test]
    fn test_no_hand_restarts_mode_debounce() {
        let mut run = Run::new();
        run.feed(PoseLabel::FingerCount(1), T - 1);
        run.feed(PoseLabel::NoHand, 1);
        assert_eq!(run.machine.state(), MachineState::Idle);

        assert!(run.feed(PoseLabel::FingerCount(1), T - 1).is_empty());
        let events = run.feed(PoseLabel::FingerCount(1), 1);
        assert_eq!(
            events,
            vec![GestureEvent::ModeLocked {
                mode: Mode::Temperature
            }]
        );
    }

    #[test]
    fn test_changing_count_restarts_candidate() {
        let mut run = Run::new();
        run.feed(PoseLabel::FingerCount(1), 5);
        run.feed(PoseLabel::FingerCount(3), 1);
        assert!(matches!(
            run.machine.state(),
            MachineState::ModeSelecting {
                candidate: Mode::Blinds,
                frames: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_unarmed_selection_resets_on_shape() {
        let mut run = Run::new();
        run.feed(PoseLabel::FingerCount(3), 5);
        run.feed(PoseLabel::Fist, 1);
        assert_eq!(run.machine.state(), MachineState::Idle);
    }

    #[test]
    fn test_action_commits_once_and_returns_to_locked() {
        let mut run = Run::new();
        run.lock(Mode::Lights);

        let events = run.feed(PoseLabel::OpenHand, T);
        let commands = Run::commands(&events);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].mode, Mode::Lights);
        assert_eq!(commands[0].action, Action::On);
        assert_eq!(commands[0].seq, 1);
        assert_eq!(
            run.machine.state(),
            MachineState::ModeLocked { mode: Mode::Lights }
        );
    }

    #[test]
    fn test_held_shape_commits_once_per_cycle() {
        let mut run = Run::new();
        run.lock(Mode::Temperature);

        let events = run.feed(PoseLabel::PointRight, T * 3 + 5);
        let commands = Run::commands(&events);
        assert_eq!(commands.len(), 3);
        let seqs: Vec<u64> = commands.iter().map(|c| c.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert!(commands.iter().all(|c| c.action == Action::Up));
        assert_eq!(run.machine.committed(), 3);
    }

    #[test]
    fn test_blinds_up_sequence() {
        let mut run = Run::new();
        let mut events = run.feed(PoseLabel::FingerCount(3), 10);
        events.extend(run.feed(PoseLabel::PointRight, 10));

        let commands = Run::commands(&events);
        assert_eq!(commands.len(), 1);
        let payload: serde_json::Value = serde_json::from_str(&commands[0].encode()).unwrap();
        assert_eq!(payload["mode"], "blinds");
        assert_eq!(payload["action"], "up");
    }

    #[test]
    fn test_command_carries_frame_timestamp() {
        let mut run = Run::new();
        run.lock(Mode::Door);
        let events = run.feed(PoseLabel::Fist, T);
        let commands = Run::commands(&events);
        assert_eq!(commands[0].timestamp_ms, run.now_ms);
    }

    #[test]
    fn test_switching_shape_restarts_action() {
        let mut run = Run::new();
        run.lock(Mode::Lights);
        run.feed(PoseLabel::OpenHand, T - 1);
        let events = run.feed(PoseLabel::Fist, T - 1);
        assert!(Run::commands(&events).is_empty());

        let events = run.feed(PoseLabel::Fist, 1);
        let commands = Run::commands(&events);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].action, Action::Off);
    }

    #[test]
    fn test_no_hand_during_action_keeps_mode() {
        let mut run = Run::new();
        run.lock(Mode::Blinds);
        run.feed(PoseLabel::PointLeft, 4);
        run.feed(PoseLabel::NoHand, 1);
        assert_eq!(
            run.machine.state(),
            MachineState::ModeLocked { mode: Mode::Blinds }
        );

        // Debounce starts over.
        assert!(run.feed(PoseLabel::PointLeft, T - 1).is_empty());
    }

    #[test]
    fn test_brief_hand_loss_keeps_mode_armed() {
        let mut run = Run::new();
        run.lock(Mode::Lights);
        run.feed(PoseLabel::NoHand, 30);
        assert_eq!(
            run.machine.state(),
            MachineState::ModeLocked { mode: Mode::Lights }
        );
    }

    #[test]
    fn test_idle_timeout_disarms() {
        let mut run = Run::new();
        run.lock(Mode::Lights);
        let seen = run.now_ms;

        assert!(run.machine.update(PoseLabel::NoHand, seen + 4_999).is_none());
        let event = run.machine.update(PoseLabel::NoHand, seen + 5_000);
        assert_eq!(event, Some(GestureEvent::TimedOut { mode: Mode::Lights }));
        assert_eq!(run.machine.state(), MachineState::Idle);
    }

    #[test]
    fn test_timeout_counts_from_last_hand() {
        let mut run = Run::new();
        run.lock(Mode::Door);
        let start = run.now_ms;
        run.machine.update(PoseLabel::NoHand, start + 3_000);
        run.machine.update(PoseLabel::FingerCount(0), start + 4_000);
        assert!(run.machine.update(PoseLabel::NoHand, start + 8_000).is_none());
        assert!(run.machine.update(PoseLabel::NoHand, start + 9_000).is_some());
    }

    #[test]
    fn test_tick_keeps_candidate_count() {
        let mut run = Run::new();
        for _ in 0..T - 1 {
            run.feed(PoseLabel::FingerCount(2), 1);
            run.now_ms += 150;
            assert!(run.machine.tick(run.now_ms).is_none());
        }
        assert!(matches!(
            run.machine.state(),
            MachineState::ModeSelecting { frames: 9, .. }
        ));
        let events = run.feed(PoseLabel::FingerCount(2), 1);
        assert_eq!(events, vec![GestureEvent::ModeLocked { mode: Mode::Lights }]);
    }

    #[test]
    fn test_tick_times_out_armed_mode() {
        let mut run = Run::new();
        run.lock(Mode::Blinds);
        run.feed(PoseLabel::PointLeft, 3);
        let seen = run.now_ms;

        assert!(run.machine.tick(seen + 4_999).is_none());
        assert!(matches!(
            run.machine.state(),
            MachineState::ActionSelecting { frames: 3, .. }
        ));
        assert_eq!(
            run.machine.tick(seen + 5_000),
            Some(GestureEvent::TimedOut { mode: Mode::Blinds })
        );
        assert_eq!(run.machine.state(), MachineState::Idle);
        assert!(run.machine.tick(seen + 9_000).is_none());
    }

    #[test]
    fn test_tick_drops_stale_unarmed_candidate() {
        let mut run = Run::new();
        run.feed(PoseLabel::FingerCount(3), 4);
        assert!(run.machine.tick(run.now_ms + 5_000).is_none());
        assert_eq!(run.machine.state(), MachineState::Idle);
    }

    #[test]
    fn test_reselect_without_idle() {
        let mut run = Run::new();
        run.lock(Mode::Lights);

        run.feed(PoseLabel::FingerCount(3), 1);
        assert_eq!(run.machine.state().armed_mode(), Some(Mode::Lights));

        let events = run.feed(PoseLabel::FingerCount(3), T - 1);
        assert_eq!(events, vec![GestureEvent::ModeLocked { mode: Mode::Blinds }]);
        assert_eq!(
            run.machine.state(),
            MachineState::ModeLocked { mode: Mode::Blinds }
        );
    }

    #[test]
    fn test_same_count_while_locked_stays_locked() {
        let mut run = Run::new();
        run.lock(Mode::Lights);
        assert!(run.feed(PoseLabel::FingerCount(2), T * 2).is_empty());
        assert_eq!(
            run.machine.state(),
            MachineState::ModeLocked { mode: Mode::Lights }
        );
    }

    #[test]
    fn test_abandoned_reselect_returns_to_armed_mode() {
        let mut run = Run::new();
        run.lock(Mode::Lights);
        run.feed(PoseLabel::FingerCount(4), 3);
        run.feed(PoseLabel::FingerCount(5), 1);
        assert_eq!(
            run.machine.state(),
            MachineState::ModeLocked { mode: Mode::Lights }
        );

        run.feed(PoseLabel::FingerCount(4), 3);
        run.feed(PoseLabel::FingerCount(2), 1);
        assert_eq!(
            run.machine.state(),
            MachineState::ModeLocked { mode: Mode::Lights }
        );
    }

    #[test]
    fn test_shape_during_reselect_acts_on_armed_mode() {
        let mut run = Run::new();
        run.lock(Mode::Temperature);
        run.feed(PoseLabel::FingerCount(4), 3);
        run.feed(PoseLabel::Fist, 1);
        assert!(matches!(
            run.machine.state(),
            MachineState::ActionSelecting {
                mode: Mode::Temperature,
                candidate: Action::Off,
                frames: 1,
            }
        ));
    }

    #[test]
    fn test_no_hand_during_reselect_goes_idle() {
        let mut run = Run::new();
        run.lock(Mode::Temperature);
        run.feed(PoseLabel::FingerCount(4), 3);
        run.feed(PoseLabel::NoHand, 1);
        assert_eq!(run.machine.state(), MachineState::Idle);
    }

    #[test]
    fn test_pinch_releases_mode() {
        let mut run = Run::new();
        run.lock(Mode::Blinds);
        let events = run.feed(PoseLabel::Pinch, T);
        assert_eq!(events, vec![GestureEvent::Released { mode: Mode::Blinds }]);
        assert_eq!(run.machine.state(), MachineState::Idle);
    }

    #[test]
    fn test_short_pinch_aborts_release() {
        let mut run = Run::new();
        run.lock(Mode::Blinds);
        run.feed(PoseLabel::Pinch, T - 1);
        run.feed(PoseLabel::FingerCount(0), 1);
        assert_eq!(
            run.machine.state(),
            MachineState::ModeLocked { mode: Mode::Blinds }
        );
    }

    #[test]
    fn test_pinch_ignored_when_idle() {
        let mut run = Run::new();
        assert!(run.feed(PoseLabel::Pinch, T * 2).is_empty());
        assert_eq!(run.machine.state(), MachineState::Idle);
    }

    #[test]
    fn test_single_frame_thresholds() {
        let mut machine = GestureMachine::new(MachineConfig {
            mode_frames: 1,
            action_frames: 0,
            idle_timeout_ms: 5000,
        });
        assert_eq!(
            machine.update(PoseLabel::FingerCount(1), 1),
            Some(GestureEvent::ModeLocked {
                mode: Mode::Temperature
            })
        );
        assert!(matches!(
            machine.update(PoseLabel::OpenHand, 2),
            Some(GestureEvent::Committed(Command {
                action: Action::On,
                ..
            }))
        ));
    }

    #[test]
    fn test_state_display() {
        let state = MachineState::ActionSelecting {
            mode: Mode::Lights,
            candidate: Action::Up,
            frames: 3,
        };
        assert_eq!(state.to_string(), "action-selecting(lights, up, 3)");
        assert_eq!(state.as_str(), "action-selecting");
    }
}
