//! Caption compositing.
//!
//! The caption is drawn onto a transparent layer the size of the photo, and
//! the layer is blended over the photo with the Porter-Duff "over" operator.
//! The result is always written as PNG.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, DynamicImage, ImageEncoder, ImageFormat, Rgba, RgbaImage};
use tracing::debug;

use super::contrast::contrast_colour_for;
use super::fonts::{FontChoice, FontRegistry};
use super::position::{get_text_position, Alignment, Position};
use super::text::{autosize, draw_text, measure_text};
use super::WatermarkError;

pub const DEFAULT_FONT_SIZE_PERCENTAGE: u32 = 50;

/// Source photo.
#[derive(Debug, Clone, Copy)]
pub enum ImageInput<'a> {
    Path(&'a Path),
    Bytes(&'a [u8]),
}

/// Where the PNG goes. A writer needs an explicit file extension.
pub enum OutputSink<'a> {
    Path(&'a Path),
    Writer {
        writer: &'a mut dyn Write,
        file_extension: Option<&'a str>,
    },
}

/// Caption settings. Everything is optional.
///
/// `font_size_percentage` wins over `font_size`; with neither, the caption
/// is autosized to half the image width.
#[derive(Debug, Clone, Default)]
pub struct WatermarkOptions {
    pub position: Option<Position>,
    pub colour: Option<[u8; 3]>,
    pub font: Option<FontChoice>,
    pub font_size: Option<u32>,
    pub font_size_percentage: Option<u32>,
    pub alpha: Option<u8>,
}

/// Where and how a caption was drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub font_size: u32,
    pub colour: Rgba<u8>,
    pub alignment: Alignment,
}

/// Draw `text` over `photo` and return the composited image.
pub fn render_watermark(
    fonts: &FontRegistry,
    photo: &DynamicImage,
    text: &str,
    options: &WatermarkOptions,
) -> Result<(RgbaImage, Placement), WatermarkError> {
    if text.trim().is_empty() {
        return Err(WatermarkError::EmptyText);
    }
    let font = fonts.resolve(options.font.as_ref());
    let mut base = photo.to_rgba8();
    let (width, height) = base.dimensions();

    let font_size = match (options.font_size, options.font_size_percentage) {
        (Some(size), None) if size > 0 => size,
        (_, percentage) => {
            let percentage = percentage.unwrap_or(DEFAULT_FONT_SIZE_PERCENTAGE);
            if !(1..=100).contains(&percentage) {
                return Err(WatermarkError::FontSizePercentage(percentage));
            }
            autosize(&font, text, width, percentage)
        }
    };

    let text_size = measure_text(&font, font_size, text);
    let anchor = get_text_position(
        options.position.unwrap_or_default(),
        (width, height),
        text_size,
    );
    let alpha = options.alpha.unwrap_or(u8::MAX);
    let colour = match options.colour {
        Some([r, g, b]) => Rgba([r, g, b, alpha]),
        None => {
            let (colour, brightness) =
                contrast_colour_for(&base, (anchor.x, anchor.y), text_size, alpha);
            debug!(brightness, "caption colour picked from background");
            colour
        }
    };
    debug!(
        font_id = %font.id,
        font_size,
        x = anchor.x,
        y = anchor.y,
        text_w = text_size.0,
        text_h = text_size.1,
        "caption placed"
    );

    let mut layer = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 0]));
    draw_text(
        &mut layer,
        &font,
        font_size,
        text,
        (anchor.x, anchor.y),
        anchor.align,
        colour,
    );
    image::imageops::overlay(&mut base, &layer, 0, 0);

    Ok((
        base,
        Placement {
            x: anchor.x,
            y: anchor.y,
            width: text_size.0,
            height: text_size.1,
            font_size,
            colour,
            alignment: anchor.align,
        },
    ))
}

/// Caption the photo at `input` and write the result as PNG to `output`.
pub fn watermark_text(
    fonts: &FontRegistry,
    input: ImageInput<'_>,
    output: OutputSink<'_>,
    text: &str,
    options: &WatermarkOptions,
) -> Result<Placement, WatermarkError> {
    if let OutputSink::Writer { file_extension, .. } = &output {
        let extension = file_extension.ok_or(WatermarkError::MissingFileExtension)?;
        let extension = extension.trim_start_matches('.');
        if ImageFormat::from_extension(extension) != Some(ImageFormat::Png) {
            return Err(WatermarkError::UnsupportedFormat(extension.to_string()));
        }
    }

    let photo = match input {
        ImageInput::Path(path) => image::open(path),
        ImageInput::Bytes(bytes) => image::load_from_memory(bytes),
    }
    .map_err(WatermarkError::Decode)?;

    let (captioned, placement) = render_watermark(fonts, &photo, text, options)?;

    match output {
        OutputSink::Path(path) => {
            let mut file = BufWriter::new(File::create(path)?);
            encode_png(&captioned, &mut file)?;
            file.flush()?;
        }
        OutputSink::Writer { writer, .. } => encode_png(&captioned, writer)?,
    }
    Ok(placement)
}

pub(crate) fn encode_png<W: Write>(image: &RgbaImage, writer: W) -> Result<(), WatermarkError> {
    PngEncoder::new_with_quality(writer, CompressionType::Best, FilterType::Adaptive)
        .write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgba8)
        .map_err(WatermarkError::Encode)
}
