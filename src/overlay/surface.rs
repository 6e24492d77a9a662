//! Drawing surface abstraction for overlays.
//!
//! The surface is transparent and sized to the source frame, so detection
//! boxes can be drawn in frame pixel coordinates without scaling.

/// Advance used when no font metrics are available (bold 16px sans).
pub const FALLBACK_GLYPH_ADVANCE: f32 = 9.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

pub trait Surface {
    /// Match the source frame's native size. Resizing also clears.
    fn resize(&mut self, width: u32, height: u32);

    fn size(&self) -> (u32, u32);

    /// Remove every previous drawing.
    fn clear(&mut self);

    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32);

    fn fill_rect(&mut self, rect: Rect, color: Color);

    /// Rendered width of `text` in pixels.
    fn measure_text(&self, text: &str) -> f32;

    /// Draw `text` with its baseline at `y`.
    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color);
}

pub fn fallback_text_width(text: &str) -> f32 {
    text.chars().count() as f32 * FALLBACK_GLYPH_ADVANCE
}

// ----------------------------------------------------------------------------
// RecordingSurface
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum DrawOp {
    Resize { width: u32, height: u32 },
    Clear,
    StrokeRect { rect: Rect, color: Color, line_width: f32 },
    FillRect { rect: Rect, color: Color },
    FillText { text: String, x: f32, y: f32, color: Color },
}

/// Surface that records draw calls instead of rasterising them. Used by
/// headless runs and tests.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    width: u32,
    height: u32,
    ops: Vec<DrawOp>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<DrawOp> {
        std::mem::take(&mut self.ops)
    }

    /// Boxes drawn since the last clear.
    pub fn visible_boxes(&self) -> Vec<(Rect, Color)> {
        let start = self
            .ops
            .iter()
            .rposition(|op| matches!(op, DrawOp::Clear))
            .map(|i| i + 1)
            .unwrap_or(0);
        self.ops[start..]
            .iter()
            .filter_map(|op| match op {
                DrawOp::StrokeRect { rect, color, .. } => Some((*rect, *color)),
                _ => None,
            })
            .collect()
    }
}

impl Surface for RecordingSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.ops.push(DrawOp::Resize { width, height });
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self) {
        self.ops.push(DrawOp::Clear);
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32) {
        self.ops.push(DrawOp::StrokeRect {
            rect,
            color,
            line_width,
        });
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.ops.push(DrawOp::FillRect { rect, color });
    }

    fn measure_text(&self, text: &str) -> f32 {
        fallback_text_width(text)
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color) {
        self.ops.push(DrawOp::FillText {
            text: text.to_string(),
            x,
            y,
            color,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_boxes_only_after_last_clear() {
        let mut surface = RecordingSurface::new();
        let red = Color::rgb(255, 0, 0);
        surface.stroke_rect(Rect::new(0.0, 0.0, 1.0, 1.0), red, 3.0);
        surface.clear();
        surface.stroke_rect(Rect::new(5.0, 5.0, 2.0, 2.0), red, 3.0);
        assert_eq!(
            surface.visible_boxes(),
            vec![(Rect::new(5.0, 5.0, 2.0, 2.0), red)]
        );
        assert_eq!(surface.take_ops().len(), 3);
        assert!(surface.ops().is_empty());
    }

    #[test]
    fn fallback_width_counts_chars() {
        assert_eq!(fallback_text_width("dog 90%"), 63.0);
    }
}
