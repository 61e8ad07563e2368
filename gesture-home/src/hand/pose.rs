//! Pose classification from hand landmarks.
//!
//! Turns one frame's landmarks into a single `PoseLabel`: a raw finger
//! count, or one of the named shapes (open hand, fist, pointing left or
//! right, pinch).  Shapes take priority over the count, so five spread
//! fingers read as `OpenHand` rather than `FingerCount(5)`.  Incomplete
//! landmark sets classify as `NoHand`; this module never fails.

use std::fmt;

use tracing::trace;

use super::landmarks::{Finger, HandJoint, HandLandmarks};
use crate::command::{Action, Mode};

/// Palm sizes below this are treated as a degenerate detection.
const MIN_PALM_SIZE: f32 = 1e-4;

// ── Labels ─────────────────────────────────────────────────

/// Classified hand configuration for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoseLabel {
    /// Number of extended fingers (thumb included), 0-5.
    FingerCount(u8),
    /// All five fingers extended and spread.
    OpenHand,
    /// All fingers curled.
    Fist,
    /// Index finger pointing toward the user's left.
    PointLeft,
    /// Index finger pointing toward the user's right.
    PointRight,
    /// Thumb and index tips touching, other fingers extended ("OK" sign).
    Pinch,
    /// No usable hand in the frame.
    NoHand,
}

impl PoseLabel {
    /// Mode selected by this pose, for finger counts 1-4.
    pub fn mode(&self) -> Option<Mode> {
        match self {
            Self::FingerCount(n) => Mode::from_finger_count(*n),
            _ => None,
        }
    }

    /// Action selected by this pose, for the four action shapes.
    pub fn action(&self) -> Option<Action> {
        match self {
            Self::OpenHand => Some(Action::On),
            Self::Fist => Some(Action::Off),
            Self::PointRight => Some(Action::Up),
            Self::PointLeft => Some(Action::Down),
            _ => None,
        }
    }

    pub fn is_hand(&self) -> bool {
        !matches!(self, Self::NoHand)
    }
}

impl fmt::Display for PoseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FingerCount(n) => write!(f, "fingers-{n}"),
            Self::OpenHand => f.write_str("open-hand"),
            Self::Fist => f.write_str("fist"),
            Self::PointLeft => f.write_str("point-left"),
            Self::PointRight => f.write_str("point-right"),
            Self::Pinch => f.write_str("pinch"),
            Self::NoHand => f.write_str("no-hand"),
        }
    }
}

// ── Config ─────────────────────────────────────────────────

/// Thresholds for pose classification.  All ratios are relative to the
/// palm size (wrist to middle MCP), so they hold at any camera distance.
#[derive(Debug, Clone)]
pub struct PoseConfig {
    /// A finger is extended when its tip is this many times farther from
    /// the wrist than its PIP joint.
    pub extend_ratio: f32,
    /// Minimum thumb-tip to index-MCP distance for an extended thumb.
    pub thumb_ratio: f32,
    /// Minimum mean gap between adjacent fingertips for an open hand.
    pub spread_ratio: f32,
    /// The index finger points sideways when its horizontal extent exceeds
    /// its vertical extent by this factor.
    pub point_ratio: f32,
    /// Maximum thumb-tip to index-tip distance for a pinch.
    pub pinch_ratio: f32,
    /// Frames come from a mirrored (selfie-view) image.
    pub mirrored: bool,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            extend_ratio: 1.15,
            thumb_ratio: 0.55,
            spread_ratio: 0.15,
            point_ratio: 1.0,
            pinch_ratio: 0.25,
            mirrored: false,
        }
    }
}

// ── Finger states ──────────────────────────────────────────

/// Extended/curled state of each finger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FingerStates {
    pub thumb: bool,
    pub index: bool,
    pub middle: bool,
    pub ring: bool,
    pub pinky: bool,
}

impl FingerStates {
    /// Number of extended fingers, 0-5.
    pub fn count(&self) -> u8 {
        [self.thumb, self.index, self.middle, self.ring, self.pinky]
            .iter()
            .filter(|&&extended| extended)
            .count() as u8
    }

    fn finger(&self, finger: Finger) -> bool {
        match finger {
            Finger::Index => self.index,
            Finger::Middle => self.middle,
            Finger::Ring => self.ring,
            Finger::Pinky => self.pinky,
        }
    }
}

/// Determine which fingers are extended.  Expects a complete hand.
pub fn finger_states(hand: &HandLandmarks, config: &PoseConfig) -> FingerStates {
    let palm = hand.palm_size();
    let extended = |finger: Finger| {
        hand.distance(HandJoint::Wrist, finger.tip())
            > config.extend_ratio * hand.distance(HandJoint::Wrist, finger.pip())
    };

    FingerStates {
        thumb: hand.distance(HandJoint::ThumbTip, HandJoint::IndexMcp) > config.thumb_ratio * palm,
        index: extended(Finger::Index),
        middle: extended(Finger::Middle),
        ring: extended(Finger::Ring),
        pinky: extended(Finger::Pinky),
    }
}

// ── Classification ─────────────────────────────────────────

/// Classify one frame.  `None` means the tracker reported no hand.
pub fn classify(hand: Option<&HandLandmarks>, config: &PoseConfig) -> PoseLabel {
    let hand = match hand {
        Some(h) => h,
        None => return PoseLabel::NoHand,
    };

    if !hand.is_complete() {
        let missing = hand.points.iter().position(|p| !p.valid);
        if let Some(joint) = missing.and_then(HandJoint::from_index) {
            trace!(joint = joint.as_str(), "invalid landmark, treating as no hand");
        } else {
            trace!(points = hand.points.len(), "incomplete hand, treating as no hand");
        }
        return PoseLabel::NoHand;
    }

    let palm = hand.palm_size();
    if palm < MIN_PALM_SIZE {
        trace!(palm, "degenerate palm size");
        return PoseLabel::NoHand;
    }

    let fingers = finger_states(hand, config);
    let others = [Finger::Middle, Finger::Ring, Finger::Pinky];
    let others_extended = others.iter().all(|&f| fingers.finger(f));
    let others_curled = !others.iter().any(|&f| fingers.finger(f));

    // Pinch: "OK" sign, so it never collides with a fist.
    if others_extended
        && hand.distance(HandJoint::ThumbTip, HandJoint::IndexTip) < config.pinch_ratio * palm
    {
        return PoseLabel::Pinch;
    }

    let count = fingers.count();
    if count == 0 {
        return PoseLabel::Fist;
    }

    if count == 5 && mean_fingertip_gap(hand) > config.spread_ratio * palm {
        return PoseLabel::OpenHand;
    }

    if fingers.index && others_curled {
        if let Some(label) = pointing_direction(hand, config) {
            return label;
        }
    }

    PoseLabel::FingerCount(count)
}

/// Mean distance between adjacent fingertips (index through pinky).
fn mean_fingertip_gap(hand: &HandLandmarks) -> f32 {
    let tips = HandJoint::fingertip_joints();
    let gaps: Vec<f32> = tips[1..]
        .windows(2)
        .map(|pair| hand.distance(pair[0], pair[1]))
        .collect();
    gaps.iter().sum::<f32>() / gaps.len() as f32
}

/// Sideways pointing direction of the index finger, if it is horizontal
/// enough to count as pointing.
fn pointing_direction(hand: &HandLandmarks, config: &PoseConfig) -> Option<PoseLabel> {
    let mcp = hand.point(HandJoint::IndexMcp);
    let tip = hand.point(HandJoint::IndexTip);
    let dx = tip.x() - mcp.x();
    let dy = tip.y() - mcp.y();
    if dx.abs() <= config.point_ratio * dy.abs() {
        return None;
    }

    // An un-mirrored camera faces the user: image-right is the user's left.
    let image_right = tip.x() > hand.point(HandJoint::Wrist).x();
    let user_left = image_right != config.mirrored;
    Some(if user_left {
        PoseLabel::PointLeft
    } else {
        PoseLabel::PointRight
    })
}

// ── Test helpers ───────────────────────────────────────────


// ── Tests ──────────────────────────────────────────────────
