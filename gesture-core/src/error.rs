//! error — failures that cross into the caller's UI
//!
//! Per-frame detector faults never show up here; the frame pump logs and
//! swallows them. Everything in this enum is something the user can act on
//! (grant camera access, retry, cancel).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// Camera permission denied, device busy, or no device at all.
    #[error("Unable to access webcam: {0}")]
    CameraUnavailable(String),

    #[error("Failed to load hand detection model: {0}")]
    DetectorLoad(String),

    /// The countdown expired but the video source had no frame to grab.
    #[error("no video frame available to capture")]
    NoFrame,

    #[error("failed to encode captured frame: {0}")]
    Encode(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no captured image to submit")]
    NothingCaptured,
}

impl CaptureError {
    /// Whether a fresh `open`/`retake` could plausibly clear this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CameraUnavailable(_) | Self::NoFrame)
    }
}
