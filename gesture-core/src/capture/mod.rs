//! capture — countdown timer and still-frame capture
//!
//! Once the gesture sequence completes the controller hides the overlay and
//! ticks once per second. When the sequencer's countdown reaches zero the
//! session hands over the current video frame, which is PNG-encoded into a
//! `CaptureArtifact`.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::CaptureError;
use crate::gesture::{CapturePhase, GestureSequencer};
use crate::rendering::OverlayRenderer;
use crate::video::RgbFrame;

const TICK: Duration = Duration::from_secs(1);

// ── Artifact ─────────────────────────────────────────────────────────────────

/// The captured still, PNG-encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureArtifact {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at: SystemTime,
}

impl CaptureArtifact {
    pub fn from_frame(frame: &RgbFrame) -> Result<Self, CaptureError> {
        let image = frame.to_image().ok_or(CaptureError::NoFrame)?;
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        Ok(Self {
            png,
            width: frame.width,
            height: frame.height,
            captured_at: SystemTime::now(),
        })
    }

    /// `data:image/png;base64,...`, ready for an `<img src>` or a form field.
    pub fn to_data_url(&self) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(&self.png))
    }

    pub fn file_name(&self) -> String {
        let millis = self
            .captured_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("gesture-capture-{millis}.png")
    }

    /// Write the PNG into `dir` (created if needed) and return its path.
    pub fn save_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf, CaptureError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        std::fs::write(&path, &self.png)?;
        info!(path = %path.display(), bytes = self.png.len(), "capture saved");
        Ok(path)
    }
}

// ── Countdown ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct CountdownController {
    timer: Option<Interval>,
    artifact: Option<CaptureArtifact>,
}

impl CountdownController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    pub fn artifact(&self) -> Option<&CaptureArtifact> {
        self.artifact.as_ref()
    }

    pub fn take_artifact(&mut self) -> Option<CaptureArtifact> {
        self.artifact.take()
    }

    /// Begin the countdown after the sequence completes. Hides the overlay
    /// and arms a one-second timer whose first tick lands one second from
    /// now. Returns false (and does nothing) if already running or if the
    /// sequencer is not counting down.
    pub fn start(&mut self, sequencer: &GestureSequencer, overlay: &mut OverlayRenderer) -> bool {
        let CapturePhase::CountingDown { remaining } = sequencer.phase() else {
            return false;
        };
        if self.is_running() {
            return false;
        }

        overlay.disable();
        let mut timer = interval_at(Instant::now() + TICK, TICK);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.timer = Some(timer);
        info!(remaining, "countdown started");
        true
    }

    /// Resolves on the next countdown tick; never resolves when idle.
    pub async fn next_tick(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Apply one elapsed second. Returns the seconds left; at 0 the timer is
    /// disarmed and the caller should capture.
    pub fn on_tick(&mut self, sequencer: &mut GestureSequencer) -> u32 {
        let remaining = sequencer.countdown_tick();
        debug!(remaining, "countdown tick");
        if remaining == 0 {
            self.timer = None;
        }
        remaining
    }

    /// Encode `frame` and mark the sequence captured. `None` means the
    /// source had nothing to give.
    pub fn capture(
        &mut self,
        frame: Option<RgbFrame>,
        sequencer: &mut GestureSequencer,
    ) -> Result<&CaptureArtifact, CaptureError> {
        self.timer = None;
        let frame = frame.ok_or(CaptureError::NoFrame)?;
        let artifact = CaptureArtifact::from_frame(&frame)?;
        info!(
            width = artifact.width,
            height = artifact.height,
            bytes = artifact.png.len(),
            "photo captured"
        );
        sequencer.mark_captured();
        Ok(self.artifact.insert(artifact))
    }

    /// Disarm any pending tick. Idempotent.
    pub fn cancel(&mut self) {
        if self.timer.take().is_some() {
            debug!("countdown cancelled");
        }
    }

    /// Cancel and discard any captured artifact.
    pub fn reset(&mut self) {
        self.cancel();
        self.artifact = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GestureSettings, OverlayStyle};
    use crate::landmarks::{Handedness, LandmarkSet};

    fn completed_sequencer() -> GestureSequencer {
        let settings = GestureSettings {
            final_step: 1,
            ..GestureSettings::default()
        };
        let mut seq = GestureSequencer::new(&settings);
        let t0 = std::time::Instant::now();
        seq.on_finger_count(1, t0);
        seq.on_finger_count(1, t0 + Duration::from_secs(1));
        assert_eq!(seq.phase(), CapturePhase::CountingDown { remaining: 3 });
        seq
    }

    fn frame() -> RgbFrame {
        let mut frame = RgbFrame::blank(8, 6, 0);
        frame.data[0] = 200;
        frame
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_ticks_once_per_second() {
        let mut seq = completed_sequencer();
        let mut overlay = OverlayRenderer::new(&OverlayStyle::default());
        let mut countdown = CountdownController::new();

        let started = Instant::now();
        assert!(countdown.start(&seq, &mut overlay));
        assert!(!overlay.is_enabled());

        let mut seen = Vec::new();
        while countdown.is_running() {
            countdown.next_tick().await;
            seen.push(countdown.on_tick(&mut seq));
        }
        assert_eq!(seen, vec![2, 1, 0]);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_noop() {
        let seq = completed_sequencer();
        let mut overlay = OverlayRenderer::new(&OverlayStyle::default());
        let mut countdown = CountdownController::new();
        assert!(countdown.start(&seq, &mut overlay));
        assert!(!countdown.start(&seq, &mut overlay));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_requires_completed_sequence() {
        let seq = GestureSequencer::new(&GestureSettings::default());
        let mut overlay = OverlayRenderer::new(&OverlayStyle::default());
        let hand = LandmarkSet::with_extended_fingers(1, Handedness::Right);
        overlay.draw(&hand, true, 1, 10, 10);

        let mut countdown = CountdownController::new();
        assert!(!countdown.start(&seq, &mut overlay));
        assert!(overlay.is_enabled());
        assert!(overlay.last().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_encodes_png() {
        let mut seq = completed_sequencer();
        let mut countdown = CountdownController::new();
        let artifact = countdown.capture(Some(frame()), &mut seq).unwrap().clone();

        assert_eq!((artifact.width, artifact.height), (8, 6));
        assert_eq!(&artifact.png[..8], b"\x89PNG\r\n\x1a\n");
        assert_eq!(seq.phase(), CapturePhase::Captured);

        let decoded = image::load_from_memory(&artifact.png).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (8, 6));
        assert_eq!(decoded.get_pixel(0, 0)[0], 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_without_frame_fails() {
        let mut seq = completed_sequencer();
        let mut countdown = CountdownController::new();
        let err = countdown.capture(None, &mut seq).unwrap_err();
        assert!(matches!(err, CaptureError::NoFrame));
        assert!(countdown.artifact().is_none());
        assert_ne!(seq.phase(), CapturePhase::Captured);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_reset() {
        let mut seq = completed_sequencer();
        let mut overlay = OverlayRenderer::new(&OverlayStyle::default());
        let mut countdown = CountdownController::new();
        countdown.start(&seq, &mut overlay);
        countdown.cancel();
        countdown.cancel();
        assert!(!countdown.is_running());

        countdown.capture(Some(frame()), &mut seq).unwrap();
        assert!(countdown.artifact().is_some());
        countdown.reset();
        assert!(countdown.artifact().is_none());
    }

    #[test]
    fn test_data_url_and_save() {
        let artifact = CaptureArtifact::from_frame(&frame()).unwrap();
        let url = artifact.to_data_url();
        assert!(url.starts_with("data:image/png;base64,iVBORw0KGgo"));

        let dir = tempfile::tempdir().unwrap();
        let path = artifact.save_to_dir(dir.path().join("out")).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("gesture-capture-"));
        assert!(name.ends_with(".png"));
        assert_eq!(std::fs::read(&path).unwrap(), artifact.png);
    }

    #[test]
    fn test_malformed_frame_is_rejected() {
        let broken = RgbFrame {
            data: vec![0; 3],
            width: 8,
            height: 8,
            pts: 0,
        };
        assert!(matches!(
            CaptureArtifact::from_frame(&broken),
            Err(CaptureError::NoFrame)
        ));
    }
}
