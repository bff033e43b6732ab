//! Font previews shown to admins when they pick a caption font.

use image::{Rgba, RgbaImage};

use super::compositor::encode_png;
use super::fonts::Font;
use super::position::Alignment;
use super::text::{draw_text, measure_text};
use super::WatermarkError;

pub const SAMPLE_FONT_SIZE: u32 = 50;
const PADDING: u32 = 10;

pub const PANGRAMS: [&str; 6] = [
    "Jived fox nymph grabs quick waltz.",
    "Glib jocks quiz nymph to vex dwarf.",
    "Sphinx of black quartz, judge my vow.",
    "How vexingly quick daft zebras jump!",
    "The five boxing wizards jump quickly.",
    "Pack my box with five dozen liquor jugs.",
];

pub fn pangram(seed: usize) -> &'static str {
    PANGRAMS[seed % PANGRAMS.len()]
}

/// PNG of `text` in black on white, padded on every side.
pub fn font_sample(font: &Font, text: &str) -> Result<Vec<u8>, WatermarkError> {
    if text.trim().is_empty() {
        return Err(WatermarkError::EmptyText);
    }
    let (width, height) = measure_text(font, SAMPLE_FONT_SIZE, text);
    let mut canvas = RgbaImage::from_pixel(
        width + 2 * PADDING,
        height + 2 * PADDING,
        Rgba([255, 255, 255, 255]),
    );
    let mut ink = RgbaImage::new(canvas.width(), canvas.height());
    draw_text(
        &mut ink,
        font,
        SAMPLE_FONT_SIZE,
        text,
        (PADDING as i32, PADDING as i32),
        Alignment::Left,
        Rgba([0, 0, 0, 255]),
    );
    image::imageops::overlay(&mut canvas, &ink, 0, 0);

    let mut out = Vec::new();
    encode_png(&canvas, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watermark::fonts::tests::test_registry;

    #[test]
    fn test_pangram_rotates() {
        assert_eq!(pangram(0), PANGRAMS[0]);
        assert_eq!(pangram(7), PANGRAMS[1]);
    }

    #[test]
    fn test_font_sample_is_padded_png() {
        let fonts = test_registry();
        let font = fonts.get(Some("serif"));
        let text = pangram(2);
        let png = font_sample(font, text).unwrap();

        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        let (w, h) = measure_text(font, SAMPLE_FONT_SIZE, text);
        assert_eq!(decoded.dimensions(), (w + 20, h + 20));
        assert_eq!(*decoded.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
        assert!(decoded.pixels().any(|p| p[0] < 64));
    }

    #[test]
    fn test_font_sample_rejects_empty_text() {
        let fonts = test_registry();
        assert!(font_sample(fonts.default_font(), "").is_err());
    }
}
