//! detection — the hand-landmark detector seam
//!
//! The landmark model itself lives outside this crate. A backend is
//! initialized once per session (`DetectorBackend::initialize`) and the
//! resulting `HandDetector` is awaited once per frame. Results come back as
//! plain data so the frame pump can interpret them without knowing which
//! backend produced them.
//!
//! `ScriptedBackend` / `ScriptedDetector` replay a recorded sequence of
//! per-frame results; the replay CLI and the session tests both use them.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DetectorOptions;
use crate::landmarks::{Handedness, LandmarkSet};
use crate::video::RgbFrame;

// ── Results ──────────────────────────────────────────────────────────────────

/// One detected hand: its landmarks and which hand the model thinks it is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandObservation {
    pub landmarks: LandmarkSet,
    pub handedness: Handedness,
}

impl HandObservation {
    pub fn finger_count(&self) -> u8 {
        self.landmarks.finger_count(self.handedness)
    }
}

/// Raw detector output for one frame. Both lists are empty when no hand is
/// in view. `handedness` may be shorter than `landmark_sets` if the model
/// omitted labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub landmark_sets: Vec<LandmarkSet>,
    #[serde(default)]
    pub handedness: Vec<Handedness>,
}

impl DetectionResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(observation: HandObservation) -> Self {
        Self {
            landmark_sets: vec![observation.landmarks],
            handedness: vec![observation.handedness],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.landmark_sets.is_empty()
    }

    /// The first detected hand. A missing handedness label defaults to
    /// `Right`.
    pub fn primary(&self) -> Option<HandObservation> {
        let landmarks = *self.landmark_sets.first()?;
        let handedness = self.handedness.first().copied().unwrap_or_default();
        Some(HandObservation {
            landmarks,
            handedness,
        })
    }
}

// ── Traits ───────────────────────────────────────────────────────────────────

/// A ready-to-use detector instance.
#[async_trait]
pub trait HandDetector: Send {
    /// Run detection on one frame. Errors are per-frame and non-fatal.
    async fn detect(&mut self, frame: &RgbFrame) -> Result<DetectionResult>;
}

/// Loads a detector. Called once per session; a failure leaves the session
/// without gesture detection.
#[async_trait]
pub trait DetectorBackend: Send {
    type Detector: HandDetector;

    async fn initialize(&mut self, options: &DetectorOptions) -> Result<Self::Detector>;
}

// ── Scripted detector ────────────────────────────────────────────────────────

/// What the scripted detector reports for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptedHand {
    /// Explicit landmarks, as a real model would report them.
    Landmarks {
        landmarks: LandmarkSet,
        #[serde(default)]
        handedness: Handedness,
    },
    /// Shorthand: a synthetic upright hand showing `fingers` fingers.
    Fingers {
        fingers: u8,
        #[serde(default)]
        handedness: Handedness,
    },
}

impl ScriptedHand {
    pub fn observation(&self) -> HandObservation {
        match *self {
            Self::Landmarks {
                landmarks,
                handedness,
            } => HandObservation {
                landmarks,
                handedness,
            },
            Self::Fingers {
                fingers,
                handedness,
            } => HandObservation {
                landmarks: LandmarkSet::with_extended_fingers(fingers, handedness),
                handedness,
            },
        }
    }
}

/// One script entry, covering `repeat` consecutive detector calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptStep {
    /// `None` means no hand in view.
    #[serde(default)]
    pub hand: Option<ScriptedHand>,
    /// When set, the detector call fails with this message instead.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    /// Simulated inference latency per call.
    #[serde(default)]
    pub delay_ms: u64,
}

fn default_repeat() -> u32 {
    1
}

impl ScriptStep {
    pub fn fingers(fingers: u8) -> Self {
        Self {
            hand: Some(ScriptedHand::Fingers {
                fingers,
                handedness: Handedness::Right,
            }),
            error: None,
            repeat: 1,
            delay_ms: 0,
        }
    }

    pub fn no_hand() -> Self {
        Self {
            hand: None,
            error: None,
            repeat: 1,
            delay_ms: 0,
        }
    }

    pub fn failure(message: &str) -> Self {
        Self {
            hand: None,
            error: Some(message.to_string()),
            repeat: 1,
            delay_ms: 0,
        }
    }

    pub fn times(mut self, repeat: u32) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn delayed(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// Load a JSON array of `ScriptStep`s.
pub fn load_script<P: AsRef<Path>>(path: P) -> Result<Vec<ScriptStep>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read detector script {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid detector script {}", path.display()))
}

/// Replays a script one detector call at a time. Once the script runs out
/// every further call reports an empty frame.
pub struct ScriptedDetector {
    steps: VecDeque<ScriptStep>,
    calls: u64,
}

impl ScriptedDetector {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps: steps.into_iter().filter(|s| s.repeat > 0).collect(),
            calls: 0,
        }
    }

    /// Number of `detect` calls served so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn is_exhausted(&self) -> bool {
        self.steps.is_empty()
    }

    fn next_step(&mut self) -> Option<ScriptStep> {
        let front = self.steps.front_mut()?;
        if front.repeat > 1 {
            front.repeat -= 1;
            Some(front.clone())
        } else {
            self.steps.pop_front()
        }
    }
}

#[async_trait]
impl HandDetector for ScriptedDetector {
    async fn detect(&mut self, frame: &RgbFrame) -> Result<DetectionResult> {
        self.calls += 1;
        let Some(step) = self.next_step() else {
            return Ok(DetectionResult::empty());
        };

        if step.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
        }

        if let Some(message) = step.error {
            return Err(anyhow!(message));
        }

        debug!(
            call = self.calls,
            pts = frame.pts,
            hand = step.hand.is_some(),
            "scripted detection"
        );

        Ok(match step.hand {
            Some(hand) => DetectionResult::single(hand.observation()),
            None => DetectionResult::empty(),
        })
    }
}

/// Hands out a `ScriptedDetector`, or fails initialization on demand.
pub struct ScriptedBackend {
    steps: Option<Vec<ScriptStep>>,
    failure: Option<String>,
}

impl ScriptedBackend {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps: Some(steps),
            failure: None,
        }
    }

    /// A backend whose model never loads.
    pub fn failing(message: &str) -> Self {
        Self {
            steps: None,
            failure: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl DetectorBackend for ScriptedBackend {
    type Detector = ScriptedDetector;

    async fn initialize(&mut self, options: &DetectorOptions) -> Result<ScriptedDetector> {
        if let Some(message) = &self.failure {
            return Err(anyhow!("{message}"));
        }
        let steps = self
            .steps
            .take()
            .context("scripted detector already initialized")?;
        debug!(
            max_hands = options.max_hands,
            steps = steps.len(),
            "scripted detector initialized"
        );
        Ok(ScriptedDetector::new(steps))
    }
}
