//! Text measurement, drawing and font autosizing.
//!
//! Sizes are em sizes in pixels. Multi-line text is laid out as a block:
//! the block is as wide as its widest line and lines are separated by
//! `LINE_SPACING` pixels.

use ab_glyph::{point, Font as _, FontVec, GlyphId, PxScale, PxScaleFont, ScaleFont};
use image::{Rgba, RgbaImage};

use super::fonts::Font;
use super::position::Alignment;

pub const LINE_SPACING: u32 = 4;
pub const MIN_FONT_SIZE: u32 = 1;
pub const MAX_FONT_SIZE: u32 = 512;

fn px_scale(face: &FontVec, size: u32) -> PxScale {
    let size = size as f32;
    match face.units_per_em() {
        Some(upem) if upem > 0.0 => PxScale::from(size * face.height_unscaled() / upem),
        _ => PxScale::from(size),
    }
}

fn line_width(scaled: &PxScaleFont<&FontVec>, line: &str) -> f32 {
    let mut width = 0.0f32;
    let mut prev: Option<GlyphId> = None;
    for c in line.chars() {
        let id = scaled.glyph_id(c);
        if let Some(prev) = prev {
            width += scaled.kern(prev, id);
        }
        width += scaled.h_advance(id);
        prev = Some(id);
    }
    width
}

struct Layout<'a> {
    lines: Vec<(&'a str, f32)>,
    line_height: f32,
    ascent: f32,
    width: u32,
    height: u32,
}

fn layout<'a>(scaled: &PxScaleFont<&FontVec>, text: &'a str) -> Layout<'a> {
    let lines: Vec<_> = text
        .split('\n')
        .map(|line| {
            let line = line.trim_end_matches('\r');
            (line, line_width(scaled, line))
        })
        .collect();
    let line_height = scaled.ascent() - scaled.descent();
    let widest = lines.iter().map(|(_, w)| *w).fold(0.0f32, f32::max);
    let count = lines.len() as u32;
    let height = line_height.ceil() as u32 * count + LINE_SPACING * count.saturating_sub(1);

    Layout {
        lines,
        line_height,
        ascent: scaled.ascent(),
        width: widest.ceil() as u32,
        height,
    }
}

/// Size of the text block in pixels at `size`.
pub fn measure_text(font: &Font, size: u32, text: &str) -> (u32, u32) {
    let face = font.face();
    let scaled = face.as_scaled(px_scale(face, size));
    let block = layout(&scaled, text);
    (block.width, block.height)
}

/// Draw `text` into `layer` with its block's top-left corner at `origin`.
///
/// Glyph coverage scales `colour`'s alpha; where glyphs overlap the stronger
/// coverage wins. Pixels outside `layer` are clipped.
pub fn draw_text(
    layer: &mut RgbaImage,
    font: &Font,
    size: u32,
    text: &str,
    origin: (i32, i32),
    align: Alignment,
    colour: Rgba<u8>,
) {
    let face = font.face();
    let scale = px_scale(face, size);
    let scaled = face.as_scaled(scale);
    let block = layout(&scaled, text);
    let (layer_w, layer_h) = (layer.width() as i32, layer.height() as i32);

    for (index, (line, width)) in block.lines.iter().enumerate() {
        let slack = block.width as f32 - width;
        let mut caret = origin.0 as f32
            + match align {
                Alignment::Left => 0.0,
                Alignment::Center => slack / 2.0,
                Alignment::Right => slack,
            };
        let baseline = origin.1 as f32
            + block.ascent
            + index as f32 * (block.line_height.ceil() + LINE_SPACING as f32);

        let mut prev: Option<GlyphId> = None;
        for c in line.chars() {
            let id = scaled.glyph_id(c);
            if let Some(prev) = prev {
                caret += scaled.kern(prev, id);
            }
            let glyph = id.with_scale_and_position(scale, point(caret, baseline));
            if let Some(outlined) = face.outline_glyph(glyph) {
                let bounds = outlined.px_bounds();
                outlined.draw(|gx, gy, coverage| {
                    let x = bounds.min.x as i32 + gx as i32;
                    let y = bounds.min.y as i32 + gy as i32;
                    if x < 0 || y < 0 || x >= layer_w || y >= layer_h {
                        return;
                    }
                    let alpha = (coverage.clamp(0.0, 1.0) * colour[3] as f32).round() as u8;
                    let pixel = layer.get_pixel_mut(x as u32, y as u32);
                    if alpha > pixel[3] {
                        *pixel = Rgba([colour[0], colour[1], colour[2], alpha]);
                    }
                });
            }
            caret += scaled.h_advance(id);
            prev = Some(id);
        }
    }
}

/// Largest font size whose text block is narrower than `percentage`% of
/// `image_width`, searched over `MIN_FONT_SIZE..=MAX_FONT_SIZE`.
///
/// Returns `MIN_FONT_SIZE` when even that is too wide.
pub fn autosize(font: &Font, text: &str, image_width: u32, percentage: u32) -> u32 {
    let target = image_width as f32 * percentage as f32 / 100.0;
    let fits = |size: u32| (measure_text(font, size, text).0 as f32) < target;

    if !fits(MIN_FONT_SIZE) {
        return MIN_FONT_SIZE;
    }
    let (mut lo, mut hi) = (MIN_FONT_SIZE, MAX_FONT_SIZE);
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if fits(mid) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo
}
