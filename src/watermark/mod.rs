//! Text watermarks ("image captions") for channel photos.
//!
//! A caption is placed on a 3×3 compass grid, autosized to a fraction of the
//! photo width unless a size is given, and drawn in black or white depending
//! on how bright the photo is under the text.
//!
//! # Example
//!
//! ```ignore
//! let fonts = FontRegistry::load("assets/fonts.json", std::env::consts::OS)?;
//! let options = WatermarkOptions {
//!     position: Some(Compass::SouthEast.into()),
//!     alpha: Some(191),
//!     ..Default::default()
//! };
//! let mut png = Vec::new();
//! watermark_text(
//!     &fonts,
//!     ImageInput::Bytes(&photo),
//!     OutputSink::Writer { writer: &mut png, file_extension: Some("png") },
//!     "@my_channel",
//!     &options,
//! )?;
//! ```
//!
//! The registry is immutable once loaded; share it behind an `Arc`.

pub mod compositor;
pub mod contrast;
pub mod error;
pub mod fonts;
pub mod position;
pub mod sample;
pub mod text;

pub use compositor::{watermark_text, ImageInput, OutputSink, WatermarkOptions};
pub use error::WatermarkError;
pub use fonts::{FontChoice, FontRegistry};
pub use position::Compass;
pub use sample::{font_sample, pangram};
