//! landmarks — hand landmark geometry and finger counting
//!
//! The detector reports 21 normalized points per hand. Everything here is a
//! pure function of those points and the handedness label: no history, no
//! smoothing, no hidden state.

use serde::{Deserialize, Serialize};

// ── Landmark indices ─────────────────────────────────────────────────────────

pub const LANDMARK_COUNT: usize = 21;

pub const WRIST: usize = 0;
pub const THUMB_CMC: usize = 1;
pub const THUMB_MCP: usize = 2;
pub const THUMB_IP: usize = 3;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_PIP: usize = 6;
pub const INDEX_DIP: usize = 7;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_DIP: usize = 11;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_PIP: usize = 14;
pub const RING_DIP: usize = 15;
pub const RING_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_PIP: usize = 18;
pub const PINKY_DIP: usize = 19;
pub const PINKY_TIP: usize = 20;

/// (tip, pip) pairs for the four non-thumb fingers.
const FINGER_JOINTS: [(usize, usize); 4] = [
    (INDEX_TIP, INDEX_PIP),
    (MIDDLE_TIP, MIDDLE_PIP),
    (RING_TIP, RING_PIP),
    (PINKY_TIP, PINKY_PIP),
];

// ── Types ────────────────────────────────────────────────────────────────────

/// A single landmark in normalized image coordinates (0-1, y grows down).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    /// Relative depth; carried through but unused for counting.
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    #[default]
    Right,
}

impl Handedness {
    /// Parse a detector label ("Left"/"Right", any case). Unknown labels
    /// fall back to `Right`, which is what the detector reports by default.
    pub fn from_label(label: &str) -> Self {
        if label.eq_ignore_ascii_case("left") {
            Self::Left
        } else {
            Self::Right
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "Left",
            Self::Right => "Right",
        }
    }
}

/// Exactly 21 landmarks for one detected hand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Landmark>", into = "Vec<Landmark>")]
pub struct LandmarkSet {
    points: [Landmark; LANDMARK_COUNT],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("expected 21 hand landmarks, got {0}")]
pub struct LandmarkCountError(pub usize);

impl LandmarkSet {
    pub fn new(points: [Landmark; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Landmark; LANDMARK_COUNT] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<Landmark> {
        self.points.get(index).copied()
    }

    /// Axis-aligned extent `(min_x, min_y, max_x, max_y)` in normalized units.
    pub fn extent(&self) -> (f32, f32, f32, f32) {
        self.points.iter().fold(
            (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
            |(min_x, min_y, max_x, max_y), p| {
                (min_x.min(p.x), min_y.min(p.y), max_x.max(p.x), max_y.max(p.y))
            },
        )
    }

    pub fn finger_count(&self, handedness: Handedness) -> u8 {
        count_extended_fingers(&self.points, handedness)
    }

    /// Build a plausible upright hand with the first `fingers` digits raised
    /// (thumb first, then index, middle, ring, pinky). Used by the replay
    /// script shorthand and by tests.
    pub fn with_extended_fingers(fingers: u8, handedness: Handedness) -> Self {
        let fingers = fingers.min(5) as usize;
        let mut points = [Landmark::default(); LANDMARK_COUNT];

        points[WRIST] = Landmark::new(0.5, 0.80);

        // Thumb sits to the image-left of the palm for a right hand.
        // Extended means the tip is further out than the IP joint.
        let outward = match handedness {
            Handedness::Right => -1.0,
            Handedness::Left => 1.0,
        };
        let thumb_reach = if fingers >= 1 { 0.12 } else { 0.04 };
        points[THUMB_CMC] = Landmark::new(0.5 + outward * 0.04, 0.75);
        points[THUMB_MCP] = Landmark::new(0.5 + outward * 0.07, 0.70);
        points[THUMB_IP] = Landmark::new(0.5 + outward * 0.09, 0.66);
        points[THUMB_TIP] = Landmark::new(0.5 + outward * thumb_reach, 0.63);

        let columns = [0.46, 0.50, 0.54, 0.58];
        for (finger, &x) in columns.iter().enumerate() {
            let base = INDEX_MCP + finger * 4;
            let raised = fingers > finger + 1;
            points[base] = Landmark::new(x, 0.60);
            points[base + 1] = Landmark::new(x, 0.50);
            if raised {
                points[base + 2] = Landmark::new(x, 0.42);
                points[base + 3] = Landmark::new(x, 0.35);
            } else {
                // Curled: tip folds back below the PIP joint.
                points[base + 2] = Landmark::new(x, 0.55);
                points[base + 3] = Landmark::new(x, 0.58);
            }
        }

        Self { points }
    }
}

impl TryFrom<Vec<Landmark>> for LandmarkSet {
    type Error = LandmarkCountError;

    fn try_from(points: Vec<Landmark>) -> Result<Self, Self::Error> {
        let len = points.len();
        let points: [Landmark; LANDMARK_COUNT] =
            points.try_into().map_err(|_| LandmarkCountError(len))?;
        Ok(Self { points })
    }
}

impl From<LandmarkSet> for Vec<Landmark> {
    fn from(set: LandmarkSet) -> Self {
        set.points.to_vec()
    }
}

// ── Finger counting ──────────────────────────────────────────────────────────

/// Count extended fingers on one hand.
///
/// The thumb bends sideways, so it is judged on x: a right hand's thumb is
/// extended when its tip is left of the IP joint, a left hand's when it is
/// right of it. The other four fingers are extended when the tip sits
/// above (smaller y than) the PIP joint.
///
/// Returns 0 unless exactly 21 landmarks are supplied.
pub fn count_extended_fingers(landmarks: &[Landmark], handedness: Handedness) -> u8 {
    if landmarks.len() != LANDMARK_COUNT {
        return 0;
    }

    let thumb_tip = landmarks[THUMB_TIP];
    let thumb_ip = landmarks[THUMB_IP];
    let thumb_extended = match handedness {
        Handedness::Right => thumb_tip.x < thumb_ip.x,
        Handedness::Left => thumb_tip.x > thumb_ip.x,
    };

    let fingers = FINGER_JOINTS
        .iter()
        .filter(|&&(tip, pip)| landmarks[tip].y < landmarks[pip].y)
        .count() as u8;

    fingers + u8::from(thumb_extended)
}
