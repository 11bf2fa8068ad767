pub mod capture;
pub mod config;
pub mod detection;
pub mod error;
pub mod gesture;
pub mod landmarks;
pub mod pipeline;
pub mod rendering;
pub mod runtime;
pub mod video;

pub use capture::CaptureArtifact;
pub use config::CaptureConfig;
pub use error::CaptureError;
pub use landmarks::{count_extended_fingers, Handedness, Landmark, LandmarkSet};
pub use pipeline::{CaptureSession, SessionEvent, SessionOutcome};

// Re-export anyhow so callers only need `gesture_core::Error` for plumbing
pub use anyhow::Error;
pub use anyhow::Result;
