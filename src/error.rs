//! Error types for the jewelry-cutout crate.

use std::path::PathBuf;

/// Errors that can occur while turning model outputs into cutouts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An input could not be decoded into an image.
    #[error("failed to load input #{index}: {source}")]
    Ingestion {
        /// Zero-based position of the input in the batch.
        index: usize,
        /// Underlying decode or read failure.
        source: image::ImageError,
    },

    /// The detector returned no candidate boxes for an image.
    #[error("no detection for image #{index}")]
    NoDetection {
        /// Zero-based position of the image in the batch.
        index: usize,
    },

    /// A model capability failed for the whole batch.
    #[error("{stage} inference failed: {message}")]
    Inference {
        /// Pipeline stage that ran the model (`detection` or `segmentation`).
        stage: &'static str,
        /// Message reported by the capability.
        message: String,
    },

    /// A model capability returned a different number of outputs than inputs.
    #[error("{stage} returned {actual} outputs for a batch of {expected}")]
    BatchMismatch {
        /// Pipeline stage that ran the model.
        stage: &'static str,
        /// Number of inputs in the batch.
        expected: usize,
        /// Number of outputs produced.
        actual: usize,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Writing a result file failed.
    #[error("failed to save {}: {source}", path.display())]
    Persistence {
        /// Destination that could not be written.
        path: PathBuf,
        /// Underlying encode or write failure.
        source: image::ImageError,
    },

    /// A replay sidecar file is malformed.
    #[error("invalid replay data: {0}")]
    Replay(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error occurred during image processing (load, save, encode).
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
