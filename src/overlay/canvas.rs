use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use anyhow::{anyhow, Context, Result};
use image::{RgbImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect as PixelRect;

use super::surface::{fallback_text_width, Color, Rect, Surface, FALLBACK_GLYPH_ADVANCE};
use crate::frame::Frame;

const FONT_PX: f32 = 16.0;

/// Transparent RGBA raster surface.
///
/// With a TrueType font loaded, labels are rendered as text. Without one,
/// each glyph is drawn as a solid cell so label geometry stays visible.
pub struct RgbaCanvas {
    image: RgbaImage,
    font: Option<FontArc>,
}

impl RgbaCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
            font: None,
        }
    }

    pub fn with_font_file(mut self, path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read font file {}", path.display()))?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|err| anyhow!("invalid font {}: {}", path.display(), err))?;
        self.font = Some(font);
        Ok(self)
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Blend the overlay over a video frame of the same size.
    pub fn composite(&self, frame: &Frame) -> Result<RgbImage> {
        if frame.dimensions() != self.image.dimensions() {
            return Err(anyhow!(
                "overlay is {}x{}, frame is {}x{}",
                self.image.width(),
                self.image.height(),
                frame.width,
                frame.height
            ));
        }
        let mut out = RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer size mismatch"))?;
        for (dst, src) in out.pixels_mut().zip(self.image.pixels()) {
            let alpha = src.0[3] as u16;
            if alpha == 0 {
                continue;
            }
            for c in 0..3 {
                let blended = (src.0[c] as u16 * alpha + dst.0[c] as u16 * (255 - alpha)) / 255;
                dst.0[c] = blended as u8;
            }
        }
        Ok(out)
    }

    pub fn save_png(&self, frame: Option<&Frame>, path: &Path) -> Result<()> {
        match frame {
            Some(frame) => self.composite(frame)?.save(path),
            None => self.image.save(path),
        }
        .with_context(|| format!("write overlay snapshot {}", path.display()))
    }
}

fn rgba(color: Color) -> Rgba<u8> {
    Rgba([color.r, color.g, color.b, 255])
}

fn pixel_rect(x: f32, y: f32, width: f32, height: f32) -> PixelRect {
    PixelRect::at(x.round() as i32, y.round() as i32)
        .of_size(width.round().max(1.0) as u32, height.round().max(1.0) as u32)
}

impl Surface for RgbaCanvas {
    fn resize(&mut self, width: u32, height: u32) {
        if self.image.dimensions() != (width, height) {
            self.image = RgbaImage::new(width, height);
        } else {
            self.clear();
        }
    }

    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32) {
        let lines = line_width.round().max(1.0) as i32;
        for i in 0..lines {
            let offset = (i - lines / 2) as f32;
            let r = pixel_rect(
                rect.x - offset,
                rect.y - offset,
                rect.width + 2.0 * offset,
                rect.height + 2.0 * offset,
            );
            draw_hollow_rect_mut(&mut self.image, r, rgba(color));
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        let r = pixel_rect(rect.x, rect.y, rect.width, rect.height);
        draw_filled_rect_mut(&mut self.image, r, rgba(color));
    }

    fn measure_text(&self, text: &str) -> f32 {
        match &self.font {
            Some(font) => text_size(PxScale::from(FONT_PX), font, text).0 as f32,
            None => fallback_text_width(text),
        }
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color) {
        match &self.font {
            Some(font) => {
                let scale = PxScale::from(FONT_PX);
                let ascent = font.as_scaled(scale).ascent();
                draw_text_mut(
                    &mut self.image,
                    rgba(color),
                    x.round() as i32,
                    (y - ascent).round() as i32,
                    scale,
                    font,
                    text,
                );
            }
            None => {
                let cell_w = FALLBACK_GLYPH_ADVANCE - 2.0;
                let cell_h = FONT_PX * 0.7;
                for (i, ch) in text.chars().enumerate() {
                    if ch.is_whitespace() {
                        continue;
                    }
                    let cx = x + i as f32 * FALLBACK_GLYPH_ADVANCE;
                    let r = pixel_rect(cx, y - cell_h, cell_w, cell_h);
                    draw_filled_rect_mut(&mut self.image, r, rgba(color));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const GREEN: Color = Color::rgb(0, 255, 0);

    #[test]
    fn resize_tracks_frame_and_clears() {
        let mut canvas = RgbaCanvas::new(4, 4);
        canvas.fill_rect(Rect::new(0.0, 0.0, 4.0, 4.0), GREEN);
        canvas.resize(4, 4);
        assert!(canvas.image().pixels().all(|p| p.0[3] == 0));
        canvas.resize(8, 6);
        assert_eq!(canvas.size(), (8, 6));
    }

    #[test]
    fn stroke_leaves_interior_transparent() {
        let mut canvas = RgbaCanvas::new(40, 40);
        canvas.stroke_rect(Rect::new(10.0, 10.0, 20.0, 20.0), GREEN, 3.0);
        assert_eq!(canvas.image().get_pixel(10, 20).0, [0, 255, 0, 255]);
        assert_eq!(canvas.image().get_pixel(20, 20).0[3], 0);
    }

    #[test]
    fn drawing_outside_bounds_is_clipped() {
        let mut canvas = RgbaCanvas::new(10, 10);
        canvas.fill_rect(Rect::new(-5.0, -30.0, 8.0, 24.0), GREEN);
        canvas.fill_text("cat 50%", 2.0, -4.0, GREEN);
        assert_eq!(canvas.size(), (10, 10));
    }

    #[test]
    fn composite_blends_opaque_overlay() -> Result<()> {
        let frame = Frame::solid(4, 4, [10, 10, 10], 0)?;
        let mut canvas = RgbaCanvas::new(4, 4);
        canvas.fill_rect(Rect::new(0.0, 0.0, 2.0, 4.0), GREEN);
        let out = canvas.composite(&frame)?;
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 255, 0]));
        assert_eq!(out.get_pixel(3, 0), &Rgb([10, 10, 10]));
        Ok(())
    }

    #[test]
    fn composite_rejects_size_mismatch() -> Result<()> {
        let frame = Frame::solid(4, 4, [0, 0, 0], 0)?;
        let canvas = RgbaCanvas::new(2, 2);
        assert!(canvas.composite(&frame).is_err());
        Ok(())
    }

    #[test]
    fn fallback_text_draws_cells_above_baseline() {
        let mut canvas = RgbaCanvas::new(40, 30);
        canvas.fill_text("ab", 2.0, 20.0, GREEN);
        assert_eq!(canvas.image().get_pixel(4, 15).0[3], 255);
        assert_eq!(canvas.image().get_pixel(4, 25).0[3], 0);
        assert_eq!(canvas.measure_text("ab"), 18.0);
    }
}
