//! video — camera acquisition and frame sources
//!
//! A `Camera` is asked once per session for a live `VideoSource` matching the
//! configured constraints. The frame pump polls the source every tick; the
//! countdown grabs a snapshot when it reaches zero. Stopping a source ends
//! the stream and is safe to repeat.
//!
//! `ReplayCamera` serves still images (from memory or a directory) in a loop,
//! scaled to the requested resolution.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use fast_image_resize as fr;
use image::RgbImage;
use tracing::{debug, info};

use crate::config::CameraConstraints;
use crate::error::CaptureError;

/// A single video frame in RGB24 format, along with its presentation index.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbFrame {
    pub data: Vec<u8>, // packed RGB24, row-major
    pub width: u32,
    pub height: u32,
    pub pts: i64,
}

impl RgbFrame {
    pub fn blank(width: u32, height: u32, pts: i64) -> Self {
        Self {
            data: vec![0u8; width as usize * height as usize * 3],
            width,
            height,
            pts,
        }
    }

    pub fn from_image(image: RgbImage, pts: i64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            pts,
        }
    }

    /// `None` if the buffer length does not match the dimensions.
    pub fn to_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }
}

// ── Traits ───────────────────────────────────────────────────────────────────

/// A running stream of frames.
pub trait VideoSource: Send {
    /// False once the stream has been stopped or has run dry.
    fn is_live(&self) -> bool;

    /// The next frame, or `None` if nothing is ready yet.
    fn ready_frame(&mut self) -> Option<RgbFrame>;

    /// The most recently delivered frame, without advancing the stream.
    fn snapshot(&self) -> Option<RgbFrame>;

    /// Release the device. Idempotent.
    fn stop(&mut self);
}

/// Something that can hand out a live `VideoSource`.
#[async_trait]
pub trait Camera: Send {
    type Source: VideoSource;

    async fn acquire(
        &mut self,
        constraints: &CameraConstraints,
    ) -> Result<Self::Source, CaptureError>;
}

// ── Scaling ──────────────────────────────────────────────────────────────────

/// Reusable resize context so every replayed frame shares one `Resizer`.
pub struct FrameScaler {
    resizer: fr::Resizer,
}

impl FrameScaler {
    pub fn new() -> Self {
        Self {
            resizer: fr::Resizer::new(),
        }
    }

    /// Scale `frame` to exactly `width × height` (aspect is not preserved).
    pub fn fit(&mut self, frame: &RgbFrame, width: u32, height: u32) -> Result<RgbFrame> {
        if frame.width == width && frame.height == height {
            return Ok(frame.clone());
        }

        let src =
            fr::images::ImageRef::new(frame.width, frame.height, &frame.data, fr::PixelType::U8x3)
                .context("failed to create fast_image_resize source for camera frame")?;
        let mut dst = fr::images::Image::new(width.max(1), height.max(1), fr::PixelType::U8x3);

        let options = fr::ResizeOptions::new()
            .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::CatmullRom));
        self.resizer
            .resize(&src, &mut dst, Some(&options))
            .context("fast_image_resize camera scale failed")?;

        Ok(RgbFrame {
            data: dst.into_vec(),
            width: width.max(1),
            height: height.max(1),
            pts: frame.pts,
        })
    }
}

impl Default for FrameScaler {
    fn default() -> Self {
        Self::new()
    }
}

// ── Replay camera ────────────────────────────────────────────────────────────

/// Serves a fixed set of frames, cycling through them until stopped.
pub struct ReplayCamera {
    frames: Vec<RgbFrame>,
    denial: Option<String>,
    max_frames: Option<u64>,
}

impl ReplayCamera {
    pub fn from_frames(frames: Vec<RgbFrame>) -> Self {
        Self {
            frames,
            denial: None,
            max_frames: None,
        }
    }

    /// A single black frame of the given size.
    pub fn blank(width: u32, height: u32) -> Self {
        Self::from_frames(vec![RgbFrame::blank(width, height, 0)])
    }

    /// Load every PNG/JPEG in `dir`, in file-name order.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .with_context(|| format!("failed to read frame directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for (i, path) in paths.iter().enumerate() {
            let image = image::open(path)
                .with_context(|| format!("failed to decode frame {}", path.display()))?
                .to_rgb8();
            frames.push(RgbFrame::from_image(image, i as i64));
        }
        info!(dir = %dir.display(), frames = frames.len(), "loaded replay frames");
        Ok(Self::from_frames(frames))
    }

    /// A camera whose acquisition always fails, as if permission were denied.
    pub fn denied(reason: &str) -> Self {
        Self {
            frames: Vec::new(),
            denial: Some(reason.to_string()),
            max_frames: None,
        }
    }

    /// End the stream after `max` frames have been delivered.
    pub fn with_max_frames(mut self, max: u64) -> Self {
        self.max_frames = Some(max);
        self
    }
}

#[async_trait]
impl Camera for ReplayCamera {
    type Source = ReplaySource;

    async fn acquire(
        &mut self,
        constraints: &CameraConstraints,
    ) -> Result<ReplaySource, CaptureError> {
        if let Some(reason) = &self.denial {
            return Err(CaptureError::CameraUnavailable(reason.clone()));
        }
        if self.frames.is_empty() {
            return Err(CaptureError::CameraUnavailable(
                "no video device available".to_string(),
            ));
        }

        let mut scaler = FrameScaler::new();
        let frames = self
            .frames
            .iter()
            .map(|f| scaler.fit(f, constraints.width, constraints.height))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| CaptureError::CameraUnavailable(format!("{e:#}")))?;

        debug!(
            facing_mode = %constraints.facing_mode,
            width = constraints.width,
            height = constraints.height,
            frames = frames.len(),
            "replay camera acquired"
        );

        Ok(ReplaySource {
            frames: frames.into(),
            cursor: 0,
            delivered: 0,
            max_frames: self.max_frames,
            last: None,
            live: Arc::new(AtomicBool::new(true)),
        })
    }
}

pub struct ReplaySource {
    frames: Arc<[RgbFrame]>,
    cursor: usize,
    delivered: u64,
    max_frames: Option<u64>,
    last: Option<RgbFrame>,
    live: Arc<AtomicBool>,
}

impl ReplaySource {
    /// Shared view of the live flag, for observing the source after it has
    /// been moved into a session.
    pub fn live_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.live)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

impl VideoSource for ReplaySource {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn ready_frame(&mut self) -> Option<RgbFrame> {
        if !self.is_live() {
            return None;
        }
        if self.max_frames.is_some_and(|max| self.delivered >= max) {
            debug!(delivered = self.delivered, "replay source exhausted");
            self.stop();
            return None;
        }

        let mut frame = self.frames[self.cursor].clone();
        frame.pts = self.delivered as i64;
        self.cursor = (self.cursor + 1) % self.frames.len();
        self.delivered += 1;
        self.last = Some(frame.clone());
        Some(frame)
    }

    fn snapshot(&self) -> Option<RgbFrame> {
        if !self.is_live() {
            return None;
        }
        self.last.clone()
    }

    fn stop(&mut self) {
        if self.live.swap(false, Ordering::AcqRel) {
            debug!(delivered = self.delivered, "replay source stopped");
        }
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraints(width: u32, height: u32) -> CameraConstraints {
        CameraConstraints {
            width,
            height,
            ..CameraConstraints::default()
        }
    }

    #[tokio::test]
    async fn test_replay_cycles_frames() {
        let frames = vec![RgbFrame::blank(8, 8, 0), RgbFrame::blank(8, 8, 0)];
        let mut camera = ReplayCamera::from_frames(frames);
        let mut source = camera.acquire(&constraints(8, 8)).await.unwrap();

        assert!(source.snapshot().is_none());
        for expected in 0..5 {
            let frame = source.ready_frame().unwrap();
            assert_eq!(frame.pts, expected);
        }
        assert_eq!(source.snapshot().unwrap().pts, 4);
        assert_eq!(source.delivered(), 5);
    }

    #[tokio::test]
    async fn test_frames_scaled_to_constraints() {
        let mut camera = ReplayCamera::blank(32, 24);
        let mut source = camera.acquire(&constraints(16, 12)).await.unwrap();
        let frame = source.ready_frame().unwrap();
        assert_eq!((frame.width, frame.height), (16, 12));
        assert_eq!(frame.data.len(), 16 * 12 * 3);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut camera = ReplayCamera::blank(4, 4);
        let mut source = camera.acquire(&constraints(4, 4)).await.unwrap();
        let live = source.live_flag();
        source.ready_frame();

        source.stop();
        source.stop();
        assert!(!source.is_live());
        assert!(!live.load(Ordering::Acquire));
        assert!(source.ready_frame().is_none());
        assert!(source.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_max_frames_ends_stream() {
        let mut camera = ReplayCamera::blank(4, 4).with_max_frames(2);
        let mut source = camera.acquire(&constraints(4, 4)).await.unwrap();
        assert!(source.ready_frame().is_some());
        assert!(source.ready_frame().is_some());
        assert!(source.ready_frame().is_none());
        assert!(!source.is_live());
    }

    #[tokio::test]
    async fn test_denied_camera() {
        let mut camera = ReplayCamera::denied("Permission denied");
        let err = camera.acquire(&constraints(4, 4)).await.err().unwrap();
        assert_eq!(err.to_string(), "Unable to access webcam: Permission denied");
        assert!(err.is_retryable());

        let mut empty = ReplayCamera::from_frames(Vec::new());
        assert!(empty.acquire(&constraints(4, 4)).await.is_err());
    }

    #[test]
    fn test_from_dir_loads_images_in_order() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(4, 4, image::Rgb([255, 0, 0]))
            .save(dir.path().join("b.png"))
            .unwrap();
        RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 255]))
            .save(dir.path().join("a.png"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let camera = ReplayCamera::from_dir(dir.path()).unwrap();
        assert_eq!(camera.frames.len(), 2);
        assert_eq!(&camera.frames[0].data[..3], &[0, 0, 255]);
        assert_eq!(&camera.frames[1].data[..3], &[255, 0, 0]);
    }

    #[test]
    fn test_frame_image_conversion() {
        let frame = RgbFrame::from_image(RgbImage::new(3, 2), 7);
        assert_eq!(frame.data.len(), 18);
        assert_eq!(frame.to_image().unwrap().dimensions(), (3, 2));

        let broken = RgbFrame {
            data: vec![0; 5],
            width: 3,
            height: 2,
            pts: 0,
        };
        assert!(broken.to_image().is_none());
    }

    #[test]
    fn test_blank_frame_matches_dimensions() {
        let frame = RgbFrame::blank(640, 480, 3);
        assert_eq!(frame.data.len(), 640 * 480 * 3);
        assert_eq!(frame.to_image().unwrap().dimensions(), (640, 480));
        assert_eq!(frame.pts, 3);
    }
}
