//! Caption colour selection from the background under the text.

use image::{Rgba, RgbaImage};

/// Backgrounds brighter than this get black text, the rest white.
pub const BRIGHTNESS_THRESHOLD: f64 = 120.0;

/// Perceived brightness of the mean colour of `region`, in `0.0..=255.0`.
///
/// Uses `sqrt(0.241·R² + 0.691·G² + 0.068·B²)`. An empty region is black.
pub fn image_brightness(region: &RgbaImage) -> f64 {
    let count = region.width() as f64 * region.height() as f64;
    if count == 0.0 {
        return 0.0;
    }

    let (mut r, mut g, mut b) = (0u64, 0u64, 0u64);
    for pixel in region.pixels() {
        r += pixel[0] as u64;
        g += pixel[1] as u64;
        b += pixel[2] as u64;
    }
    let (r, g, b) = (r as f64 / count, g as f64 / count, b as f64 / count);

    (0.241 * r * r + 0.691 * g * g + 0.068 * b * b).sqrt()
}

/// Black or white at `alpha`, whichever contrasts with `brightness`.
pub fn pick_contrast_colour(brightness: f64, alpha: u8) -> Rgba<u8> {
    if brightness > BRIGHTNESS_THRESHOLD {
        Rgba([0, 0, 0, alpha])
    } else {
        Rgba([255, 255, 255, alpha])
    }
}

/// Sample the part of `image` under a text box and pick a colour for it.
///
/// The box is clamped to the image; when nothing of it is visible the whole
/// image is sampled instead.
pub fn contrast_colour_for(
    image: &RgbaImage,
    origin: (i32, i32),
    size: (u32, u32),
    alpha: u8,
) -> (Rgba<u8>, f64) {
    let x0 = origin.0.clamp(0, image.width() as i32) as u32;
    let y0 = origin.1.clamp(0, image.height() as i32) as u32;
    let x1 = (origin.0 as i64 + size.0 as i64).clamp(0, image.width() as i64) as u32;
    let y1 = (origin.1 as i64 + size.1 as i64).clamp(0, image.height() as i64) as u32;

    let brightness = if x1 > x0 && y1 > y0 {
        let region = image::imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image();
        image_brightness(&region)
    } else {
        image_brightness(image)
    };

    (pick_contrast_colour(brightness, alpha), brightness)
}
