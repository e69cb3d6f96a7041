use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AsePackerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Metadata error: {0}")]
    Json(#[from] serde_json::Error),
    /// Bad magic number or a structurally invalid frame/chunk.
    #[error("Malformed sprite file at byte {offset}: {reason}")]
    Format { offset: usize, reason: String },
    /// A sprite source was found without its companion `mdat.json`.
    #[error("Missing metadata for sprite source {}", path.display())]
    MissingMetadata { path: PathBuf },
    /// The binary-tree packer ran out of room on the page.
    #[error(
        "Page '{page}' is out of space: sprite '{sprite}' layer {layer} frame {frame} ({width}x{height}) could not be placed"
    )]
    PackingOverflow {
        page: String,
        sprite: String,
        layer: usize,
        frame: usize,
        width: u32,
        height: u32,
    },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Encoding error: {0}")]
    Encode(String),
}

impl AsePackerError {
    pub(crate) fn format(offset: usize, reason: impl Into<String>) -> Self {
        Self::Format {
            offset,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AsePackerError>;
