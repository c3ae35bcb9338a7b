//! Error types for the glTF conversion pipeline.

use thiserror::Error;

/// Result type alias using PipelineError.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for glTF/GLB conversion operations.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The input does not start with the "glTF" magic string.
    #[error("file is not valid binary glTF")]
    InvalidMagic,

    /// The GLB container declares a version other than 1 or 2.
    #[error("binary glTF version is not 1 or 2 (got {0})")]
    UnsupportedVersion(u32),

    /// A version-1 GLB declares a non-JSON content format.
    #[error("binary glTF scene format is not JSON (content format {0})")]
    InvalidContentFormat(u32),

    /// The GLB container is truncated or a chunk overruns its bounds.
    #[error("binary glTF is truncated: {0}")]
    Truncated(String),

    /// The GLB container has no JSON chunk.
    #[error("binary glTF does not contain a JSON chunk")]
    MissingJsonChunk,

    /// The JSON chunk is not valid UTF-8.
    #[error("JSON chunk is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Failed to parse or serialize JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error from an external resource reader or writer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to decode or re-encode an image.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// A resource URI could not be resolved to raw bytes.
    #[error("failed to read resource: {0}")]
    ResourceRead(String),

    /// A data URI could not be decoded.
    #[error("invalid data URI: {0}")]
    DataUri(String),

    /// An image's signature is unrecognized or its target format cannot be
    /// encoded.
    #[error("unsupported image format: {0}")]
    UnsupportedImageFormat(String),
}
