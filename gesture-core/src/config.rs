//! config — tunables for one capture session
//!
//! Every field has a default matching the shipped dialog, so an empty JSON
//! object (or no file at all) yields a working configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Largest accepted camera width or height, in pixels.
pub const MAX_CAMERA_DIMENSION: u32 = 8192;

// ── Detector ─────────────────────────────────────────────────────────────────

/// Options handed to the detector backend on initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorOptions {
    pub max_hands: u32,
    pub model_complexity: u32,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            max_hands: 1,
            model_complexity: 1,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }
}

// ── Camera ───────────────────────────────────────────────────────────────────

/// Constraints passed to the camera when acquiring a live source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConstraints {
    /// `"user"` selects the front-facing camera.
    pub facing_mode: String,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            facing_mode: "user".to_string(),
            width: 640,
            height: 480,
        }
    }
}

// ── Gesture sequence ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureSettings {
    /// Continuous hold required before a step counts as done.
    pub hold_seconds: f32,
    /// Last required finger count; the sequence runs 1..=final_step.
    pub final_step: u8,
    /// Seconds between sequence completion and the shutter.
    pub countdown_seconds: u32,
}

impl Default for GestureSettings {
    fn default() -> Self {
        Self {
            hold_seconds: 1.0,
            final_step: 3,
            countdown_seconds: 3,
        }
    }
}

impl GestureSettings {
    /// Falls back to one second for values `validate` would reject.
    pub fn hold_duration(&self) -> Duration {
        match Duration::try_from_secs_f32(self.hold_seconds) {
            Ok(hold) if !hold.is_zero() => hold,
            _ => Duration::from_secs(1),
        }
    }
}

// ── Overlay ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayStyle {
    /// Fraction of the normalized frame added around the landmark extent.
    pub padding: f32,
    pub stroke_width: u32,
    pub correct_color: [u8; 3],
    pub incorrect_color: [u8; 3],
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            padding: 0.05,
            stroke_width: 4,
            correct_color: [0x00, 0xff, 0x00],
            incorrect_color: [0xff, 0x00, 0x00],
        }
    }
}

// ── Top level ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub detector: DetectorOptions,
    pub camera: CameraConstraints,
    pub gesture: GestureSettings,
    pub overlay: OverlayStyle,
    /// Frame clock period; 16 ms is roughly one display refresh.
    pub frame_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            detector: DetectorOptions::default(),
            camera: CameraConstraints::default(),
            gesture: GestureSettings::default(),
            overlay: OverlayStyle::default(),
            frame_interval_ms: 16,
        }
    }
}

impl CaptureConfig {
    /// Load a JSON config file. Missing fields fall back to defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.gesture.hold_seconds.is_nan() || self.gesture.hold_seconds <= 0.0 {
            bail!("gesture.hold_seconds must be positive");
        }
        if !(1..=5).contains(&self.gesture.final_step) {
            bail!("gesture.final_step must be between 1 and 5");
        }
        if self.gesture.countdown_seconds == 0 {
            bail!("gesture.countdown_seconds must be non-zero");
        }
        if self.frame_interval_ms == 0 {
            bail!("frame_interval_ms must be non-zero");
        }
        if !(0.0..=0.5).contains(&self.overlay.padding) {
            bail!("overlay.padding must be within [0, 0.5]");
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            bail!("camera width and height must be non-zero");
        }
        if self.camera.width > MAX_CAMERA_DIMENSION || self.camera.height > MAX_CAMERA_DIMENSION {
            bail!("camera width and height must not exceed {MAX_CAMERA_DIMENSION}");
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_yields_defaults() {
        let config: CaptureConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CaptureConfig::default());
        assert_eq!(config.frame_interval_ms, 16);
        assert_eq!(config.gesture.final_step, 3);
        assert_eq!(config.gesture.hold_duration(), Duration::from_secs(1));
        assert_eq!(config.detector.max_hands, 1);
        assert_eq!(config.camera.facing_mode, "user");
    }

    #[test]
    fn test_partial_override() {
        let config: CaptureConfig =
            serde_json::from_str(r#"{"gesture": {"countdown_seconds": 5}, "frame_interval_ms": 33}"#)
                .unwrap();
        assert_eq!(config.gesture.countdown_seconds, 5);
        assert_eq!(config.gesture.final_step, 3);
        assert_eq!(config.frame_interval(), Duration::from_millis(33));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = CaptureConfig::default();
        config.gesture.hold_seconds = 0.0;
        assert!(config.validate().is_err());

        let mut config = CaptureConfig::default();
        config.gesture.final_step = 6;
        assert!(config.validate().is_err());

        let mut config = CaptureConfig::default();
        config.frame_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = CaptureConfig::default();
        config.overlay.padding = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_countdown() {
        let mut config = CaptureConfig::default();
        config.gesture.countdown_seconds = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("countdown_seconds"));

        config.gesture.countdown_seconds = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_caps_camera_dimensions() {
        let mut config = CaptureConfig::default();
        config.camera.width = 70_000;
        config.camera.height = 70_000;
        assert!(config.validate().is_err());

        config.camera.width = MAX_CAMERA_DIMENSION;
        config.camera.height = MAX_CAMERA_DIMENSION;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_hold_duration_falls_back_on_bad_values() {
        for bad in [0.0, -2.0, f32::NAN] {
            let settings = GestureSettings {
                hold_seconds: bad,
                ..GestureSettings::default()
            };
            assert_eq!(settings.hold_duration(), Duration::from_secs(1));
        }
        let settings = GestureSettings {
            hold_seconds: 0.25,
            ..GestureSettings::default()
        };
        assert_eq!(settings.hold_duration(), Duration::from_millis(250));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.json");
        std::fs::write(&path, r#"{"camera": {"width": 320, "height": 240}}"#).unwrap();

        let config = CaptureConfig::from_file(&path).unwrap();
        assert_eq!(config.camera.width, 320);
        assert_eq!(config.camera.height, 240);
        assert_eq!(config.camera.facing_mode, "user");

        assert!(CaptureConfig::from_file(dir.path().join("missing.json")).is_err());
    }
}
