//! Hand landmark data structures.
//!
//! Models the 21-point hand topology produced by MediaPipe-style hand
//! trackers: the wrist, four thumb joints, then MCP/PIP/DIP/tip for each of
//! the four fingers.  Coordinates are normalized image coordinates (x grows
//! to the right, y grows downward) with an optional relative depth in z.

use tracing::trace;

// ── Joint definitions ──────────────────────────────────────

/// The 21 hand landmarks, in tracker output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandJoint {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexMcp,
    IndexPip,
    IndexDip,
    IndexTip,
    MiddleMcp,
    MiddlePip,
    MiddleDip,
    MiddleTip,
    RingMcp,
    RingPip,
    RingDip,
    RingTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Total number of landmarks per hand.
pub const JOINT_COUNT: usize = 21;

impl HandJoint {
    pub const ALL: [HandJoint; JOINT_COUNT] = [
        Self::Wrist,
        Self::ThumbCmc,
        Self::ThumbMcp,
        Self::ThumbIp,
        Self::ThumbTip,
        Self::IndexMcp,
        Self::IndexPip,
        Self::IndexDip,
        Self::IndexTip,
        Self::MiddleMcp,
        Self::MiddlePip,
        Self::MiddleDip,
        Self::MiddleTip,
        Self::RingMcp,
        Self::RingPip,
        Self::RingDip,
        Self::RingTip,
        Self::PinkyMcp,
        Self::PinkyPip,
        Self::PinkyDip,
        Self::PinkyTip,
    ];

    /// Joint at a tracker array index.
    pub fn from_index(index: usize) -> Option<HandJoint> {
        Self::ALL.get(index).copied()
    }

    /// Convert joint enum to array index (0-20).
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wrist => "wrist",
            Self::ThumbCmc => "thumb-cmc",
            Self::ThumbMcp => "thumb-mcp",
            Self::ThumbIp => "thumb-ip",
            Self::ThumbTip => "thumb-tip",
            Self::IndexMcp => "index-mcp",
            Self::IndexPip => "index-pip",
            Self::IndexDip => "index-dip",
            Self::IndexTip => "index-tip",
            Self::MiddleMcp => "middle-mcp",
            Self::MiddlePip => "middle-pip",
            Self::MiddleDip => "middle-dip",
            Self::MiddleTip => "middle-tip",
            Self::RingMcp => "ring-mcp",
            Self::RingPip => "ring-pip",
            Self::RingDip => "ring-dip",
            Self::RingTip => "ring-tip",
            Self::PinkyMcp => "pinky-mcp",
            Self::PinkyPip => "pinky-pip",
            Self::PinkyDip => "pinky-dip",
            Self::PinkyTip => "pinky-tip",
        }
    }

    /// Fingertip joints, thumb first.
    pub fn fingertip_joints() -> [HandJoint; 5] {
        [
            Self::ThumbTip,
            Self::IndexTip,
            Self::MiddleTip,
            Self::RingTip,
            Self::PinkyTip,
        ]
    }
}

// ── Fingers ────────────────────────────────────────────────

/// One of the four non-thumb fingers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Finger {
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 4] = [Self::Index, Self::Middle, Self::Ring, Self::Pinky];

    pub fn mcp(&self) -> HandJoint {
        match self {
            Self::Index => HandJoint::IndexMcp,
            Self::Middle => HandJoint::MiddleMcp,
            Self::Ring => HandJoint::RingMcp,
            Self::Pinky => HandJoint::PinkyMcp,
        }
    }

    pub fn pip(&self) -> HandJoint {
        match self {
            Self::Index => HandJoint::IndexPip,
            Self::Middle => HandJoint::MiddlePip,
            Self::Ring => HandJoint::RingPip,
            Self::Pinky => HandJoint::PinkyPip,
        }
    }

    pub fn tip(&self) -> HandJoint {
        match self {
            Self::Index => HandJoint::IndexTip,
            Self::Middle => HandJoint::MiddleTip,
            Self::Ring => HandJoint::RingTip,
            Self::Pinky => HandJoint::PinkyTip,
        }
    }
}

// ── Landmark point ─────────────────────────────────────────

/// Position of a single landmark.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandmarkPoint {
    /// Normalized position (x, y, z).
    pub position: [f32; 3],
    /// Whether the tracker saw this landmark (not occluded, finite).
    pub valid: bool,
}

impl LandmarkPoint {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        let valid = x.is_finite() && y.is_finite() && z.is_finite();
        Self {
            position: [x, y, z],
            valid,
        }
    }

    pub fn x(&self) -> f32 {
        self.position[0]
    }

    pub fn y(&self) -> f32 {
        self.position[1]
    }
}

impl Default for LandmarkPoint {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            valid: false,
        }
    }
}

// ── Hand landmarks ─────────────────────────────────────────

/// One frame's worth of landmarks for a single hand.
#[derive(Debug, Clone, PartialEq)]
pub struct HandLandmarks {
    /// Landmarks indexed by `HandJoint`.  Anything other than
    /// `JOINT_COUNT` entries is a partial detection.
    pub points: Vec<LandmarkPoint>,
}

impl HandLandmarks {
    pub fn new(points: Vec<LandmarkPoint>) -> Self {
        Self { points }
    }

    /// True when all 21 landmarks are present and valid.
    pub fn is_complete(&self) -> bool {
        self.points.len() == JOINT_COUNT && self.points.iter().all(|p| p.valid)
    }

    /// Landmark for a joint.  Callers check `is_complete` first.
    pub fn point(&self, joint: HandJoint) -> &LandmarkPoint {
        &self.points[joint.index()]
    }

    /// Distance between two landmarks in the image plane.
    pub fn distance(&self, a: HandJoint, b: HandJoint) -> f32 {
        planar_distance(&self.point(a).position, &self.point(b).position)
    }

    /// Reference length used to normalize all other distances: wrist to
    /// middle-finger MCP.
    pub fn palm_size(&self) -> f32 {
        self.distance(HandJoint::Wrist, HandJoint::MiddleMcp)
    }
}

/// Euclidean distance between two points, ignoring depth.
pub fn planar_distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    (dx * dx + dy * dy).sqrt()
}

// ── Smoothing ──────────────────────────────────────────────

/// Configuration for landmark smoothing.
#[derive(Debug, Clone)]
pub struct SmoothingConfig {
    /// Smoothing factor (0.0 = no smoothing, values near 1.0 = heavy).
    pub smoothing: f32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self { smoothing: 0.0 }
    }
}

/// Exponential smoothing of landmark positions across frames.
///
/// History is dropped whenever the hand is lost or a partial detection
/// arrives, so a re-acquired hand never blends with a stale one.
#[derive(Debug, Clone)]
pub struct LandmarkSmoother {
    pub config: SmoothingConfig,
    previous: Option<HandLandmarks>,
}

impl LandmarkSmoother {
    pub fn new(config: SmoothingConfig) -> Self {
        Self {
            config,
            previous: None,
        }
    }

    /// Blend `hand` with the previous frame and return the smoothed result.
    pub fn smooth(&mut self, hand: Option<HandLandmarks>) -> Option<HandLandmarks> {
        let alpha = self.config.smoothing.clamp(0.0, 0.99);
        let hand = match hand {
            Some(h) if h.is_complete() => h,
            other => {
                self.previous = None;
                return other;
            }
        };

        if alpha <= 0.0 {
            return Some(hand);
        }

        let smoothed = match self.previous.take() {
            Some(prev) => {
                let points = prev
                    .points
                    .iter()
                    .zip(hand.points.iter())
                    .map(|(old, new)| LandmarkPoint {
                        position: [
                            lerp(old.position[0], new.position[0], 1.0 - alpha),
                            lerp(old.position[1], new.position[1], 1.0 - alpha),
                            lerp(old.position[2], new.position[2], 1.0 - alpha),
                        ],
                        valid: true,
                    })
                    .collect();
                trace!(alpha, "smoothed hand landmarks");
                HandLandmarks::new(points)
            }
            None => hand,
        };

        self.previous = Some(smoothed.clone());
        Some(smoothed)
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_hand(x: f32) -> HandLandmarks {
        HandLandmarks::new(
            (0..JOINT_COUNT)
                .map(|i| LandmarkPoint::new(x, i as f32 * 0.01, 0.0))
                .collect(),
        )
    }

    #[test]
    fn test_joint_indices_follow_tracker_order() {
        assert_eq!(HandJoint::Wrist.index(), 0);
        assert_eq!(HandJoint::ThumbTip.index(), 4);
        assert_eq!(HandJoint::IndexPip.index(), 6);
        assert_eq!(HandJoint::MiddleMcp.index(), 9);
        assert_eq!(HandJoint::PinkyTip.index(), JOINT_COUNT - 1);
    }

    #[test]
    fn test_fingertips() {
        let tips = HandJoint::fingertip_joints();
        assert_eq!(tips[0], HandJoint::ThumbTip);
        assert_eq!(tips[4], HandJoint::PinkyTip);
        for finger in Finger::ALL {
            assert!(tips.contains(&finger.tip()));
            assert_eq!(finger.pip().index(), finger.tip().index() - 2);
            assert_eq!(finger.mcp().index(), finger.tip().index() - 3);
        }
    }

    #[test]
    fn test_from_index_round_trips() {
        for (i, joint) in HandJoint::ALL.iter().enumerate() {
            assert_eq!(joint.index(), i);
            assert_eq!(HandJoint::from_index(i), Some(*joint));
        }
        assert_eq!(HandJoint::from_index(JOINT_COUNT), None);
    }

    #[test]
    fn test_joint_as_str() {
        assert_eq!(HandJoint::Wrist.as_str(), "wrist");
        assert_eq!(HandJoint::IndexTip.as_str(), "index-tip");
        assert_eq!(HandJoint::PinkyDip.as_str(), "pinky-dip");
    }

    #[test]
    fn test_non_finite_point_is_invalid() {
        assert!(LandmarkPoint::new(0.1, 0.2, 0.0).valid);
        assert!(!LandmarkPoint::new(f32::NAN, 0.2, 0.0).valid);
        assert!(!LandmarkPoint::new(0.1, f32::INFINITY, 0.0).valid);
    }

    #[test]
    fn test_is_complete() {
        let mut hand = flat_hand(0.5);
        assert!(hand.is_complete());

        hand.points[HandJoint::RingTip.index()].valid = false;
        assert!(!hand.is_complete());

        let partial = HandLandmarks::new(vec![LandmarkPoint::new(0.0, 0.0, 0.0); 20]);
        assert!(!partial.is_complete());
    }

    #[test]
    fn test_distance_ignores_depth() {
        let mut hand = flat_hand(0.0);
        hand.points[0] = LandmarkPoint::new(0.0, 0.0, 5.0);
        hand.points[9] = LandmarkPoint::new(0.3, 0.4, -5.0);
        assert!((hand.palm_size() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_smoothing_disabled_passes_through() {
        let mut smoother = LandmarkSmoother::new(SmoothingConfig::default());
        smoother.smooth(Some(flat_hand(0.0)));
        let out = smoother.smooth(Some(flat_hand(1.0))).unwrap();
        assert_eq!(out.points[0].x(), 1.0);
    }

    #[test]
    fn test_smoothing_blends_positions() {
        let mut smoother = LandmarkSmoother::new(SmoothingConfig { smoothing: 0.5 });
        smoother.smooth(Some(flat_hand(0.0)));
        let out = smoother.smooth(Some(flat_hand(1.0))).unwrap();
        assert!((out.points[0].x() - 0.5).abs() < 1e-6);

        let out = smoother.smooth(Some(flat_hand(1.0))).unwrap();
        assert!((out.points[0].x() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_smoothing_resets_on_hand_loss() {
        let mut smoother = LandmarkSmoother::new(SmoothingConfig { smoothing: 0.5 });
        smoother.smooth(Some(flat_hand(0.0)));
        assert!(smoother.smooth(None).is_none());

        let out = smoother.smooth(Some(flat_hand(1.0))).unwrap();
        assert_eq!(out.points[0].x(), 1.0, "history should not survive hand loss");
    }

    #[test]
    fn test_smoothing_passes_partial_hand_untouched() {
        let mut smoother = LandmarkSmoother::new(SmoothingConfig { smoothing: 0.5 });
        smoother.smooth(Some(flat_hand(0.0)));

        let partial = HandLandmarks::new(vec![LandmarkPoint::new(0.0, 0.0, 0.0); 5]);
        let out = smoother.smooth(Some(partial.clone()));
        assert_eq!(out, Some(partial));
    }
}
