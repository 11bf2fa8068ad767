//! rendering — detection overlay drawn above the live video
//!
//! The overlay is a transparent RGBA surface the same size as the video
//! frame. Each processed frame either redraws it (hand present) or clears it
//! (no hand), so a stale box is never left on screen. During the countdown
//! the renderer is disabled and draws nothing.

use ab_glyph::{FontRef, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size, Blend,
};
use imageproc::rect::Rect;
use tracing::warn;

use crate::config::OverlayStyle;
use crate::landmarks::LandmarkSet;

/// Label plate fill, black at 70% opacity.
const PLATE_COLOR: Rgba<u8> = Rgba([0, 0, 0, 178]);
const PLATE_HEIGHT: u32 = 28;
const LABEL_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans-Bold.ttf");
const LABEL_SCALE: f32 = 20.0;
/// Per-glyph advance used to size the plate if the font cannot be parsed.
const FALLBACK_GLYPH_WIDTH: u32 = 11;
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Axis-aligned rectangle in surface pixels. `x`/`y` may be negative for the
/// label plate; drawing clips to the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    fn to_rect(self) -> Rect {
        Rect::at(self.x, self.y).of_size(self.width.max(1), self.height.max(1))
    }
}

/// What was last drawn onto the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayFrame {
    pub rect: PixelRect,
    pub plate: PixelRect,
    pub color: [u8; 3],
    pub label: String,
}

pub struct OverlayRenderer {
    style: OverlayStyle,
    surface: RgbaImage,
    enabled: bool,
    last: Option<OverlayFrame>,
    font: Option<FontRef<'static>>,
}

impl OverlayRenderer {
    pub fn new(style: &OverlayStyle) -> Self {
        Self {
            style: style.clone(),
            surface: RgbaImage::new(1, 1),
            enabled: true,
            last: None,
            font: load_label_font(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    pub fn last(&self) -> Option<&OverlayFrame> {
        self.last.as_ref()
    }

    /// Redraw the overlay for one detected hand. No-op while disabled.
    pub fn draw(
        &mut self,
        landmarks: &LandmarkSet,
        is_correct: bool,
        step: u8,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<&OverlayFrame> {
        if !self.enabled {
            return None;
        }

        self.fit_surface(frame_width, frame_height);
        self.wipe();

        let rect = padded_box(landmarks, self.style.padding, frame_width, frame_height);
        let (color, label) = if is_correct {
            (self.style.correct_color, format!("Pose {step}"))
        } else {
            (self.style.incorrect_color, "Undetected".to_string())
        };

        let ink = Rgba([color[0], color[1], color[2], 255]);
        self.stroke(rect, ink);

        let plate = label_plate(rect, self.label_width(&label));
        // Translucent; composite over the stroke.
        let mut canvas = Blend(std::mem::take(&mut self.surface));
        draw_filled_rect_mut(&mut canvas, plate.to_rect(), PLATE_COLOR);
        self.surface = canvas.0;

        if let Some(font) = &self.font {
            let text_y = (rect.y - 30).max(0);
            draw_text_mut(
                &mut self.surface,
                ink,
                rect.x,
                text_y,
                PxScale::from(LABEL_SCALE),
                font,
                &label,
            );
        }

        self.last = Some(OverlayFrame {
            rect,
            plate,
            color,
            label,
        });
        self.last.as_ref()
    }

    /// Erase everything drawn so far.
    pub fn clear(&mut self) {
        self.wipe();
        self.last = None;
    }

    /// Stop drawing and clear the surface.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.clear();
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    fn label_width(&self, label: &str) -> u32 {
        match &self.font {
            Some(font) => text_size(PxScale::from(LABEL_SCALE), font, label).0,
            None => label.chars().count() as u32 * FALLBACK_GLYPH_WIDTH,
        }
    }

    fn fit_surface(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if self.surface.dimensions() != (width, height) {
            self.surface = RgbaImage::new(width, height);
        }
    }

    fn wipe(&mut self) {
        for pixel in self.surface.pixels_mut() {
            *pixel = TRANSPARENT;
        }
    }

    /// Stroke `stroke_width` nested one-pixel outlines, working inward.
    fn stroke(&mut self, rect: PixelRect, color: Rgba<u8>) {
        for inset in 0..self.style.stroke_width {
            let shrink = inset * 2;
            if rect.width <= shrink || rect.height <= shrink {
                break;
            }
            let ring = PixelRect {
                x: rect.x + inset as i32,
                y: rect.y + inset as i32,
                width: rect.width - shrink,
                height: rect.height - shrink,
            };
            draw_hollow_rect_mut(&mut self.surface, ring.to_rect(), color);
        }
    }
}

/// Bounding box of all landmarks, padded, clamped to the unit square and
/// scaled to pixels.
pub fn padded_box(landmarks: &LandmarkSet, padding: f32, width: u32, height: u32) -> PixelRect {
    let (min_x, min_y, max_x, max_y) = landmarks.extent();
    let x0 = (min_x - padding).clamp(0.0, 1.0);
    let y0 = (min_y - padding).clamp(0.0, 1.0);
    let x1 = (max_x + padding).clamp(0.0, 1.0);
    let y1 = (max_y + padding).clamp(0.0, 1.0);

    let (w, h) = (width as f32, height as f32);
    PixelRect {
        x: (x0 * w).round() as i32,
        y: (y0 * h).round() as i32,
        width: (((x1 - x0) * w).round() as u32).max(1),
        height: (((y1 - y0) * h).round() as u32).max(1),
    }
}

fn load_label_font() -> Option<FontRef<'static>> {
    match FontRef::try_from_slice(LABEL_FONT) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!("overlay label font unusable, labels will not be drawn: {e}");
            None
        }
    }
}

/// Plate behind the label text, sitting just above the box.
fn label_plate(rect: PixelRect, text_width: u32) -> PixelRect {
    PixelRect {
        x: rect.x - 6,
        y: (rect.y - 30).max(0) - 3,
        width: text_width + 12,
        height: PLATE_HEIGHT,
    }
}
