//! Landmark frame sources.
//!
//! A hand tracker (MediaPipe or similar) runs out of process and hands us
//! one JSON document per camera frame:
//!
//! ```json
//! {"timestamp_ms": 1718000000000, "landmarks": [{"x": 0.5, "y": 0.8, "z": 0.0}, ...]}
//! ```
//!
//! `landmarks` is `null` (or absent) when no hand is visible.  Frames are
//! read either as JSON lines from stdin or a file, or as length-prefixed
//! messages over a Unix socket.
//!
//! The tracker's `timestamp_ms` is kept for logging only.  Gesture timing
//! runs on the receiver's clock, since trackers stamp frames with whatever
//! clock their pipeline uses.

pub mod lines;
pub mod socket;

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use serde::Deserialize;
use tracing::{info, warn};

use crate::hand::{HandLandmarks, LandmarkPoint};

pub use lines::LineSource;
pub use socket::SocketSource;

/// Landmarks whose visibility score is below this are treated as occluded.
const MIN_VISIBILITY: f32 = 0.5;

/// Unix time in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ── Frames ─────────────────────────────────────────────────

/// One tracker frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Tracker's own stamp, or the receive time when it sent none.
    pub timestamp_ms: u64,
    pub hand: Option<HandLandmarks>,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    timestamp_ms: Option<u64>,
    #[serde(default)]
    landmarks: Option<Vec<RawPoint>>,
}

#[derive(Debug, Deserialize)]
struct RawPoint {
    x: f32,
    y: f32,
    #[serde(default)]
    z: f32,
    visibility: Option<f32>,
}

impl Frame {
    pub fn no_hand(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            hand: None,
        }
    }

    /// Parse a tracker frame.  Unparseable input becomes a no-hand frame
    /// stamped with `now_ms`.
    pub fn from_json(text: &str, now_ms: u64) -> Self {
        let raw: RawFrame = match serde_json::from_str(text) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "malformed landmark frame, treating as no hand");
                return Self::no_hand(now_ms);
            }
        };

        let hand = raw.landmarks.map(|points| {
            HandLandmarks::new(
                points
                    .into_iter()
                    .map(|p| {
                        let mut point = LandmarkPoint::new(p.x, p.y, p.z);
                        if p.visibility.is_some_and(|v| v < MIN_VISIBILITY) {
                            point.valid = false;
                        }
                        point
                    })
                    .collect(),
            )
        });

        Self {
            timestamp_ms: raw.timestamp_ms.unwrap_or(now_ms),
            hand,
        }
    }
}

// ── Sources ────────────────────────────────────────────────

/// What a source produced while the frame loop waited on it.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Frame(Frame),
    /// Nothing arrived yet.  The caller may check timers and call again.
    Waiting,
    /// The input is exhausted.
    Ended,
}

/// Something that yields tracker frames.
pub trait LandmarkSource {
    /// Block until the next frame, or return `Waiting` when the source
    /// gives the caller a chance to run its timers.
    fn next_frame(&mut self) -> anyhow::Result<SourceEvent>;
}

/// Open a source from its command-line name: `stdin` (or `-`), `socket`,
/// `socket:<path>`, or a path to a JSON-lines file.  `wait` bounds how long
/// the socket source blocks before returning `Waiting`.
pub fn open(name: &str, wait: Duration) -> anyhow::Result<Box<dyn LandmarkSource>> {
    match name {
        "stdin" | "-" => {
            info!("reading landmark frames from stdin");
            Ok(Box::new(LineSource::new(io::stdin().lock())))
        }
        "socket" => Ok(Box::new(SocketSource::bind(
            SocketSource::default_socket_path(),
            wait,
        )?)),
        _ => {
            if let Some(path) = name.strip_prefix("socket:") {
                return Ok(Box::new(SocketSource::bind(
                    PathBuf::from(path),
                    wait,
                )?));
            }
            let file = File::open(name)
                .with_context(|| format!("failed to open landmark file {name}"))?;
            info!(path = name, "replaying landmark frames");
            Ok(Box::new(LineSource::new(BufReader::new(file))))
        }
    }
}

// ── Tests ──────────────────────────────────────────────────
