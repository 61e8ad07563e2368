//! Frame loop: landmarks in, commands out.
//!
//! Pulls frames from a `LandmarkSource`, smooths and classifies them, runs
//! the gesture machine, and hands committed commands to a `Publisher`.
//! Runs until the input ends, a shutdown signal arrives, or the optional
//! exit timer fires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::command::Mode;
use crate::hand::{
    classify, GestureEvent, GestureMachine, LandmarkSmoother, MachineConfig, PoseConfig,
    PoseLabel, SmoothingConfig,
};
use crate::mqtt::Publisher;
use crate::source::{now_ms, Frame, LandmarkSource, SourceEvent};

/// Global flag set by SIGTERM/SIGINT handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

const STATUS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default)]
pub struct TrackerConfig {
    pub pose: PoseConfig,
    pub machine: MachineConfig,
    pub smoothing: SmoothingConfig,
    /// Stop after this long (for scripted runs).
    pub exit_after: Option<Duration>,
}

/// Counters reported in status lines and at exit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub hand_frames: u64,
    pub published: u64,
    pub dropped: u64,
}

/// Per-session recognition pipeline.
///
/// Gesture timing uses the receive time passed in by the caller, never the
/// tracker's own frame stamps.
pub struct Session {
    pose: PoseConfig,
    smoother: LandmarkSmoother,
    machine: GestureMachine,
    last_pose: PoseLabel,
    pub stats: SessionStats,
}

impl Session {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            pose: config.pose.clone(),
            smoother: LandmarkSmoother::new(config.smoothing.clone()),
            machine: GestureMachine::new(config.machine.clone()),
            last_pose: PoseLabel::NoHand,
            stats: SessionStats::default(),
        }
    }

    /// Run one frame, received at `received_ms`, through smoothing,
    /// classification and the machine.
    pub fn process(&mut self, frame: Frame, received_ms: u64) -> Option<GestureEvent> {
        self.stats.frames += 1;
        let hand = self.smoother.smooth(frame.hand);
        let pose = classify(hand.as_ref(), &self.pose);
        if pose.is_hand() {
            self.stats.hand_frames += 1;
        }
        if pose != self.last_pose {
            debug!(%pose, frame_ts = frame.timestamp_ms, "pose changed");
            self.last_pose = pose;
        }
        self.machine.update(pose, received_ms)
    }

    /// The source is still waiting for a frame.
    pub fn tick(&mut self, now_ms: u64) -> Option<GestureEvent> {
        self.machine.tick(now_ms)
    }

    fn log_status(&self) {
        let state = self.machine.state();
        info!(
            frames = self.stats.frames,
            hand_frames = self.stats.hand_frames,
            commits = self.machine.committed(),
            published = self.stats.published,
            dropped = self.stats.dropped,
            armed = ?state.armed_mode(),
            state = state.as_str(),
            "tracker status"
        );
    }
}

/// Install signal handlers for graceful shutdown (SIGTERM, SIGINT).
///
/// No `SA_RESTART`: a read blocked on stdin fails with `EINTR`, so the
/// loop sees the flag without waiting for another line.
fn install_signal_handlers() {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = signal_handler as libc::sighandler_t;
        action.sa_flags = 0;
        libc::sigemptyset(&mut action.sa_mask);
        for signal in [libc::SIGTERM, libc::SIGINT] {
            if libc::sigaction(signal, &action, std::ptr::null_mut()) != 0 {
                warn!(signal, "failed to install signal handler");
            }
        }
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Run the frame loop until the source ends or shutdown is requested.
pub fn run(
    source: &mut dyn LandmarkSource,
    publisher: &mut dyn Publisher,
    config: TrackerConfig,
) -> anyhow::Result<SessionStats> {
    install_signal_handlers();

    for mode in Mode::ALL {
        debug!(fingers = mode.finger_count(), %mode, "mode gesture");
    }

    let mut session = Session::new(&config);
    let start_time = Instant::now();
    let mut last_status_log = Instant::now();
    info!(
        mode_frames = config.machine.mode_frames,
        action_frames = config.machine.action_frames,
        idle_timeout_ms = config.machine.idle_timeout_ms,
        mirrored = config.pose.mirrored,
        "tracker started"
    );

    loop {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!("shutdown signal received, exiting");
            break;
        }

        if let Some(dur) = config.exit_after {
            if start_time.elapsed() >= dur {
                info!("exit timer fired after {}s", dur.as_secs());
                break;
            }
        }

        if last_status_log.elapsed() >= STATUS_INTERVAL {
            session.log_status();
            last_status_log = Instant::now();
        }

        let event = match source.next_frame()? {
            SourceEvent::Frame(frame) => session.process(frame, now_ms()),
            SourceEvent::Waiting => session.tick(now_ms()),
            SourceEvent::Ended => {
                info!("landmark input ended");
                break;
            }
        };

        if let Some(GestureEvent::Committed(command)) = event {
            if publisher.publish(&command) {
                session.stats.published += 1;
            } else {
                session.stats.dropped += 1;
            }
        }
    }

    publisher.shutdown();
    session.log_status();
    Ok(session.stats)
}
