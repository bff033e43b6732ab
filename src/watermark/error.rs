//! Watermark error types.

use std::path::PathBuf;

/// Errors that can occur while loading fonts or captioning an image.
#[derive(Debug, thiserror::Error)]
pub enum WatermarkError {
    /// The font configuration file could not be read.
    #[error("cannot read font config {path}: {source}")]
    FontConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The font configuration file is not valid JSON of the expected shape.
    #[error("invalid font config {path}: {source}")]
    FontConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A declared font file could not be read or does not render.
    #[error("cannot load font {path}: {reason}")]
    FontLoad { path: PathBuf, reason: String },

    /// No usable default font for the platform. Fatal at startup.
    #[error("default font not defined or not available for platform '{platform}'")]
    DefaultFontUnavailable { platform: String },

    /// A byte sink was given without telling which format to write.
    #[error("output is a byte sink, a file extension must be set")]
    MissingFileExtension,

    #[error("unsupported output format '{0}', only png is written")]
    UnsupportedFormat(String),

    #[error("cannot render empty text")]
    EmptyText,

    #[error("font size percentage must be within 1..=100, got {0}")]
    FontSizePercentage(u32),

    #[error("failed to decode source image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode png: {0}")]
    Encode(#[source] image::ImageError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
