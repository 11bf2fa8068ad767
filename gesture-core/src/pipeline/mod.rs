//! pipeline — the capture session and its frame pump
//!
//! A `CaptureSession` owns everything for one trip through the capture
//! dialog: the camera, its live source, the detector instance, the gesture
//! sequencer, the overlay and the countdown. `run` drives a single
//! cooperative loop:
//!
//! ```text
//!  frame clock ─► source.ready_frame ─► detector.detect (awaited)
//!                                          │
//!            interpreter ─► sequencer ─► overlay / countdown.start
//!  countdown tick ─► sequencer.countdown_tick ─► (0) capture snapshot
//! ```
//!
//! At most one detection is in flight. Cancellation drops it, stops the
//! source and resets all gesture state.

use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::capture::{CaptureArtifact, CountdownController};
use crate::config::CaptureConfig;
use crate::detection::{DetectionResult, DetectorBackend, HandDetector};
use crate::error::CaptureError;
use crate::gesture::{self, CapturePhase, GestureSequencer, SequenceEvent};
use crate::rendering::OverlayRenderer;
use crate::runtime::CancelFlag;
use crate::video::{Camera, RgbFrame, VideoSource};

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorStatus {
    Loading,
    Ready,
    Failed(String),
}

/// Why `run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// A photo was taken and is waiting for `submit` or `retake`.
    Captured,
    Cancelled,
    /// The video source stopped delivering frames.
    SourceEnded,
    /// No detector is loaded; gestures cannot be recognized.
    DetectorUnavailable,
    /// `open` has not succeeded.
    NotOpen,
}

/// Progress notifications for a UI or the CLI spinner.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// One frame went through the detector. `fingers` is `None` when no hand
    /// was found.
    FrameProcessed {
        fingers: Option<u8>,
        step: u8,
        progress: f32,
    },
    StepAdvanced {
        from: u8,
        to: u8,
    },
    SequenceComplete,
    Countdown {
        remaining: u32,
    },
    Captured {
        width: u32,
        height: u32,
    },
    CaptureFailed(String),
}

/// Snapshot of everything a dialog would render besides the video itself.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub camera_error: Option<String>,
    pub detector: DetectorStatus,
    pub step: u8,
    pub phase: CapturePhase,
    pub guidance: Option<String>,
}

pub type EventSink = Box<dyn FnMut(SessionEvent) + Send>;
pub type SubmitHandler = Box<dyn FnMut(CaptureArtifact) + Send>;

// ── Profiling ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct PumpStats {
    frames: u64,
    detect_errors: u64,
    detect: Duration,
}

impl PumpStats {
    fn record(&mut self, detect: Duration, failed: bool) {
        self.frames += 1;
        self.detect += detect;
        if failed {
            self.detect_errors += 1;
        }
        if self.frames % 300 == 0 {
            info!(
                frames = self.frames,
                detect_errors = self.detect_errors,
                detect_ms_per_frame = format!(
                    "{:.2}",
                    self.detect.as_secs_f64() * 1000.0 / self.frames as f64
                ),
                "frame pump timing"
            );
        }
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

pub struct CaptureSession<C: Camera, D: HandDetector> {
    config: CaptureConfig,
    camera: C,
    source: Option<C::Source>,
    camera_error: Option<String>,
    detector: Option<D>,
    detector_status: DetectorStatus,

    sequencer: GestureSequencer,
    overlay: OverlayRenderer,
    countdown: CountdownController,

    cancel: CancelFlag,
    events: Option<EventSink>,
    on_submit: Option<SubmitHandler>,
    stats: PumpStats,
}

impl<C: Camera, D: HandDetector> CaptureSession<C, D> {
    pub fn new(camera: C, config: CaptureConfig) -> Self {
        Self {
            sequencer: GestureSequencer::new(&config.gesture),
            overlay: OverlayRenderer::new(&config.overlay),
            countdown: CountdownController::new(),
            config,
            camera,
            source: None,
            camera_error: None,
            detector: None,
            detector_status: DetectorStatus::Loading,
            cancel: CancelFlag::new(),
            events: None,
            on_submit: None,
            stats: PumpStats::default(),
        }
    }

    pub fn set_event_sink(&mut self, sink: EventSink) {
        self.events = Some(sink);
    }

    pub fn on_submit(&mut self, handler: SubmitHandler) {
        self.on_submit = Some(handler);
    }

    /// A cancel handle usable from another task while `run` is awaited.
    pub fn handle(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn sequencer(&self) -> &GestureSequencer {
        &self.sequencer
    }

    pub fn overlay(&self) -> &OverlayRenderer {
        &self.overlay
    }

    pub fn artifact(&self) -> Option<&CaptureArtifact> {
        self.countdown.artifact()
    }

    pub fn is_open(&self) -> bool {
        self.source.as_ref().is_some_and(|s| s.is_live())
    }

    pub fn guidance(&self) -> Option<String> {
        gesture::guidance(self.sequencer.current_step(), self.sequencer.phase())
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            camera_error: self.camera_error.clone(),
            detector: self.detector_status.clone(),
            step: self.sequencer.current_step(),
            phase: self.sequencer.phase(),
            guidance: self.guidance(),
        }
    }

    /// Initialize this session's detector. On failure the session stays
    /// usable but `run` reports `DetectorUnavailable`.
    pub async fn load_detector<B>(&mut self, backend: &mut B) -> Result<(), CaptureError>
    where
        B: DetectorBackend<Detector = D>,
    {
        self.detector_status = DetectorStatus::Loading;
        match backend.initialize(&self.config.detector).await {
            Ok(detector) => {
                self.detector = Some(detector);
                self.detector_status = DetectorStatus::Ready;
                info!("hand detector ready");
                Ok(())
            }
            Err(e) => {
                let msg = format!("{e:#}");
                warn!(error = %msg, "failed to load hand detector");
                self.detector = None;
                self.detector_status = DetectorStatus::Failed(msg.clone());
                Err(CaptureError::DetectorLoad(msg))
            }
        }
    }

    /// Acquire a live source with fresh gesture state. Also used to reopen a
    /// closed session. A no-op if a live source is already held.
    pub async fn open(&mut self) -> Result<(), CaptureError> {
        if self.is_open() {
            return Ok(());
        }

        self.stop_source();
        self.cancel.reset();
        self.countdown.reset();
        self.sequencer.reset();
        self.overlay.enable();
        self.overlay.clear();

        match self.camera.acquire(&self.config.camera).await {
            Ok(source) => {
                self.source = Some(source);
                self.camera_error = None;
                info!(
                    width = self.config.camera.width,
                    height = self.config.camera.height,
                    "camera opened"
                );
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "camera unavailable");
                self.camera_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Pump frames until a photo is captured, the source ends, or the
    /// session is cancelled.
    pub async fn run(&mut self) -> SessionOutcome {
        if self.detector.is_none() {
            warn!(status = ?self.detector_status, "no hand detector; not starting frame pump");
            return SessionOutcome::DetectorUnavailable;
        }
        if self.source.is_none() {
            return SessionOutcome::NotOpen;
        }
        if self.sequencer.phase() == CapturePhase::Captured {
            return SessionOutcome::Captured;
        }

        let cancel = self.cancel.clone();
        let mut frame_clock = tokio::time::interval(self.config.frame_interval());
        frame_clock.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            frame_interval_ms = self.config.frame_interval_ms,
            step = self.sequencer.current_step(),
            "frame pump started"
        );

        let outcome = loop {
            if cancel.is_cancelled() {
                break SessionOutcome::Cancelled;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break SessionOutcome::Cancelled,

                _ = self.countdown.next_tick(), if self.countdown.is_running() => {
                    if let Some(outcome) = self.on_countdown_tick() {
                        break outcome;
                    }
                }

                _ = frame_clock.tick() => {
                    let pumped = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Some(SessionOutcome::Cancelled),
                        outcome = self.pump_frame() => outcome,
                    };
                    if let Some(outcome) = pumped {
                        break outcome;
                    }
                }
            }
        };

        if outcome == SessionOutcome::Cancelled {
            self.close();
        }
        info!(?outcome, frames = self.stats.frames, "frame pump stopped");
        outcome
    }

    /// Discard the photo and start over on a freshly acquired source.
    pub async fn retake(&mut self) -> Result<(), CaptureError> {
        info!("retake requested");
        self.stop_source();
        self.open().await
    }

    /// Hand the captured photo to the submit handler, then close.
    pub fn submit(&mut self) -> Result<(), CaptureError> {
        let artifact = self
            .countdown
            .take_artifact()
            .ok_or(CaptureError::NothingCaptured)?;
        match self.on_submit.as_mut() {
            Some(handler) => handler(artifact),
            None => warn!("capture submitted with no submit handler"),
        }
        self.close();
        Ok(())
    }

    /// Stop everything and reset state. Idempotent.
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.countdown.reset();
        self.stop_source();
        self.sequencer.reset();
        self.overlay.clear();
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn stop_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.stop();
            debug!("video source released");
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        if let Some(sink) = self.events.as_mut() {
            sink(event);
        }
    }

    /// One frame-clock iteration. `Some` ends the run.
    async fn pump_frame(&mut self) -> Option<SessionOutcome> {
        let source = self.source.as_mut()?;
        let frame = source.ready_frame();
        if !source.is_live() {
            return Some(SessionOutcome::SourceEnded);
        }
        let frame = frame?;

        // Frames keep flowing during the countdown so the snapshot is fresh,
        // but they are not sent to the detector.
        if !self.sequencer.is_detecting() {
            return None;
        }

        let detector = match self.detector.as_mut() {
            Some(detector) => detector,
            None => return Some(SessionOutcome::DetectorUnavailable),
        };

        let detect_start = Instant::now();
        let result = detector.detect(&frame).await;
        let detect_elapsed = detect_start.elapsed();

        match result {
            Ok(detection) => {
                self.stats.record(detect_elapsed, false);
                self.apply_detection(&detection, &frame);
            }
            Err(e) => {
                self.stats.record(detect_elapsed, true);
                warn!(pts = frame.pts, "detection error: {e:#}");
            }
        }
        None
    }

    /// Interpreter → sequencer → overlay, in that order.
    fn apply_detection(&mut self, detection: &DetectionResult, frame: &RgbFrame) {
        let now = clock_now();

        let Some(hand) = detection.primary() else {
            self.sequencer.on_hand_lost(now);
            self.overlay.clear();
            self.emit(SessionEvent::FrameProcessed {
                fingers: None,
                step: self.sequencer.current_step(),
                progress: 0.0,
            });
            return;
        };

        let fingers = hand.finger_count();
        let event = self.sequencer.on_finger_count(fingers, now);
        let step = self.sequencer.current_step();
        self.emit(SessionEvent::FrameProcessed {
            fingers: Some(fingers),
            step,
            progress: self.sequencer.progress(now),
        });

        match event {
            SequenceEvent::Advanced { from, to } => {
                self.emit(SessionEvent::StepAdvanced { from, to });
            }
            SequenceEvent::Completed => {
                self.emit(SessionEvent::SequenceComplete);
                if self.countdown.start(&self.sequencer, &mut self.overlay) {
                    self.emit(SessionEvent::Countdown {
                        remaining: self.config.gesture.countdown_seconds,
                    });
                }
                return;
            }
            _ => {}
        }

        self.overlay
            .draw(&hand.landmarks, fingers == step, step, frame.width, frame.height);
    }

    /// One countdown second. At zero, capture from the live source.
    fn on_countdown_tick(&mut self) -> Option<SessionOutcome> {
        let remaining = self.countdown.on_tick(&mut self.sequencer);
        self.emit(SessionEvent::Countdown { remaining });
        if remaining > 0 {
            return None;
        }

        let snapshot = self.source.as_ref().and_then(|s| s.snapshot());
        match self.countdown.capture(snapshot, &mut self.sequencer) {
            Ok(artifact) => {
                let (width, height) = (artifact.width, artifact.height);
                self.emit(SessionEvent::Captured { width, height });
                Some(SessionOutcome::Captured)
            }
            Err(e) => {
                warn!(error = %e, "capture failed; restarting gesture sequence");
                self.emit(SessionEvent::CaptureFailed(e.to_string()));
                self.sequencer.reset();
                self.overlay.enable();
                None
            }
        }
    }
}

impl<C: Camera, D: HandDetector> Drop for CaptureSession<C, D> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Current time on the tokio clock, so paused-time tests drive hold timing.
fn clock_now() -> Instant {
    tokio::time::Instant::now().into_std()
}
