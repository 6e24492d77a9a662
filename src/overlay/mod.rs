//! Detection overlay rendering.
//!
//! Every render fully clears the surface before drawing, so stale boxes from
//! a previous cycle never accumulate.

mod canvas;
mod surface;

pub use canvas::RgbaCanvas;
pub use surface::{fallback_text_width, Color, DrawOp, Rect, RecordingSurface, Surface};

use crate::detect::Detection;

pub const HIGH_BAND_MIN: f32 = 0.8;
pub const MEDIUM_BAND_MIN: f32 = 0.6;

/// hsl(142 76% 56%)
pub const HIGH_COLOR: Color = Color::rgb(58, 228, 120);
/// hsl(189 94% 55%)
pub const MEDIUM_COLOR: Color = Color::rgb(32, 216, 248);
/// hsl(280 85% 65%)
pub const LOW_COLOR: Color = Color::rgb(191, 90, 242);
/// hsl(222 47% 11%)
pub const LABEL_TEXT_COLOR: Color = Color::rgb(15, 23, 41);

const LABEL_HEIGHT: f32 = 24.0;
const LABEL_PADDING: f32 = 8.0;
const LABEL_BASELINE_INSET: f32 = 6.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn of(score: f32) -> Self {
        if score >= HIGH_BAND_MIN {
            ConfidenceBand::High
        } else if score >= MEDIUM_BAND_MIN {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }

    pub fn color(self) -> Color {
        match self {
            ConfidenceBand::High => HIGH_COLOR,
            ConfidenceBand::Medium => MEDIUM_COLOR,
            ConfidenceBand::Low => LOW_COLOR,
        }
    }
}

/// `"<label> <percent>%"`, percent rounded half away from zero.
pub fn label_text(detection: &Detection) -> String {
    format!(
        "{} {}%",
        detection.label,
        (detection.score * 100.0).round() as i32
    )
}

#[derive(Clone, Debug)]
pub struct OverlayRenderer {
    line_width: f32,
}

impl OverlayRenderer {
    pub fn new(line_width: f32) -> Self {
        Self {
            line_width: line_width.max(1.0),
        }
    }

    /// Resize the surface to the frame, clear it and draw every detection.
    pub fn render<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        frame_width: u32,
        frame_height: u32,
        detections: &[Detection],
    ) {
        surface.resize(frame_width, frame_height);
        surface.clear();
        for detection in detections {
            self.draw_detection(surface, detection);
        }
    }

    fn draw_detection<S: Surface + ?Sized>(&self, surface: &mut S, detection: &Detection) {
        let color = ConfidenceBand::of(detection.score).color();
        let b = detection.bbox;
        surface.stroke_rect(
            Rect::new(b.x, b.y, b.width, b.height),
            color,
            self.line_width,
        );

        let text = label_text(detection);
        let text_width = surface.measure_text(&text);
        surface.fill_rect(
            Rect::new(
                b.x,
                b.y - LABEL_HEIGHT,
                text_width + LABEL_PADDING,
                LABEL_HEIGHT,
            ),
            color,
        );
        surface.fill_text(
            &text,
            b.x + LABEL_PADDING / 2.0,
            b.y - LABEL_BASELINE_INSET,
            LABEL_TEXT_COLOR,
        );
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new(3.0)
    }
}
