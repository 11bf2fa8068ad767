//! gesture — three-step hold-to-confirm sequencer
//!
//! State machine:
//!
//! ```text
//!  Detecting(step=1) ─hold 1s─► Detecting(step=2) ─hold 1s─► Detecting(step=3)
//!         ▲                                                         │ hold 1s
//!         │ reset()                                                 ▼
//!      Captured ◄──── mark_captured() ◄──── CountingDown{remaining}
//! ```
//!
//! A step is satisfied when the finger count equals the step number for the
//! whole hold window. Any other count, or losing the hand, drops the hold
//! back to idle with no partial credit.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::GestureSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldState {
    Idle,
    Holding { since: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Detecting,
    CountingDown { remaining: u32 },
    Captured,
}

/// What a single finger-count observation did to the sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SequenceEvent {
    /// Not detecting (countdown or captured); the count was dropped.
    Ignored,
    /// Count did not match the current step; any hold was discarded.
    Mismatch,
    /// Count matches and the hold is in progress.
    Holding { progress: f32 },
    Advanced { from: u8, to: u8 },
    /// The final step was held; the countdown phase has begun.
    Completed,
}

pub struct GestureSequencer {
    hold: Duration,
    final_step: u8,
    countdown_seconds: u32,

    step: u8,
    hold_state: HoldState,
    phase: CapturePhase,
    just_advanced: bool,
}

impl GestureSequencer {
    pub fn new(settings: &GestureSettings) -> Self {
        Self {
            hold: settings.hold_duration(),
            final_step: settings.final_step.clamp(1, 5),
            countdown_seconds: settings.countdown_seconds,
            step: 1,
            hold_state: HoldState::Idle,
            phase: CapturePhase::Detecting,
            just_advanced: false,
        }
    }

    pub fn current_step(&self) -> u8 {
        self.step
    }

    pub fn final_step(&self) -> u8 {
        self.final_step
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    pub fn hold_state(&self) -> HoldState {
        self.hold_state
    }

    pub fn is_detecting(&self) -> bool {
        self.phase == CapturePhase::Detecting
    }

    /// Hold progress in [0, 1]; 0 when idle.
    pub fn progress(&self, now: Instant) -> f32 {
        match self.hold_state {
            HoldState::Idle => 0.0,
            HoldState::Holding { since } => {
                let elapsed = now.saturating_duration_since(since);
                (elapsed.as_secs_f32() / self.hold.as_secs_f32()).min(1.0)
            }
        }
    }

    /// Feed one frame's finger count.
    pub fn on_finger_count(&mut self, count: u8, now: Instant) -> SequenceEvent {
        if !self.is_detecting() {
            return SequenceEvent::Ignored;
        }

        if count != self.step {
            self.drop_hold();
            return SequenceEvent::Mismatch;
        }

        if self.hold_state == HoldState::Idle {
            self.hold_state = HoldState::Holding { since: now };
            self.just_advanced = false;
            debug!(step = self.step, "hold started");
        }

        let progress = self.progress(now);
        if progress < 1.0 || self.just_advanced {
            return SequenceEvent::Holding { progress };
        }

        self.just_advanced = true;
        self.hold_state = HoldState::Idle;

        if self.step < self.final_step {
            let from = self.step;
            self.step += 1;
            info!(from, to = self.step, "gesture step advanced");
            SequenceEvent::Advanced { from, to: self.step }
        } else {
            self.phase = CapturePhase::CountingDown {
                remaining: self.countdown_seconds,
            };
            info!(
                countdown = self.countdown_seconds,
                "gesture sequence complete"
            );
            SequenceEvent::Completed
        }
    }

    /// No hand in the frame. Treated exactly like a mismatch.
    pub fn on_hand_lost(&mut self, _now: Instant) -> SequenceEvent {
        if !self.is_detecting() {
            return SequenceEvent::Ignored;
        }
        self.drop_hold();
        SequenceEvent::Mismatch
    }

    /// One countdown second elapsed. Returns the seconds left; stays at 0
    /// once reached. Outside the countdown phase this is a no-op returning 0.
    pub fn countdown_tick(&mut self) -> u32 {
        match self.phase {
            CapturePhase::CountingDown { remaining } => {
                let remaining = remaining.saturating_sub(1);
                self.phase = CapturePhase::CountingDown { remaining };
                remaining
            }
            _ => 0,
        }
    }

    pub fn mark_captured(&mut self) {
        self.phase = CapturePhase::Captured;
    }

    /// Back to step 1, detecting, nothing held. Idempotent.
    pub fn reset(&mut self) {
        self.step = 1;
        self.hold_state = HoldState::Idle;
        self.phase = CapturePhase::Detecting;
        self.just_advanced = false;
    }

    fn drop_hold(&mut self) {
        if let HoldState::Holding { .. } = self.hold_state {
            debug!(step = self.step, "hold broken");
        }
        self.hold_state = HoldState::Idle;
        self.just_advanced = false;
    }
}

/// Prompt shown to the user for the current phase. `None` once captured.
pub fn guidance(step: u8, phase: CapturePhase) -> Option<String> {
    match phase {
        CapturePhase::Detecting => Some(format!("Step {step} (Pose {step})")),
        CapturePhase::CountingDown { remaining } => {
            Some(format!("Capturing photo in {remaining}"))
        }
        CapturePhase::Captured => None,
    }
}
