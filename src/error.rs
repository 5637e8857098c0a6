//! Error types for metadata-io

use std::io;

/// Result type for metadata-io operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while scanning, decoding or updating an image
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from the byte source or sink
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The container structure itself is inconsistent
    ///
    /// This is fatal: no partial segment list or output is produced.
    #[error("Malformed container at offset {offset}: {reason}")]
    MalformedContainer { offset: u64, reason: String },

    /// A metadata segment does not hold an encoding we understand
    ///
    /// Read operations treat this as "no metadata".
    #[error("Unsupported metadata format: {0}")]
    UnsupportedMetadataFormat(String),

    /// The requested update cannot be represented in the metadata format
    #[error("Unsupported update: {0}")]
    UnsupportedUpdate(String),

    /// Data size exceeds maximum allowed
    #[error("Data too large: {size} bytes (max: {max})")]
    DataTooLarge { size: usize, max: usize },
}

impl Error {
    pub(crate) fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        Self::MalformedContainer {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported_format(reason: impl Into<String>) -> Self {
        Self::UnsupportedMetadataFormat(reason.into())
    }

    /// Whether the caller may continue as if the image had no metadata
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnsupportedMetadataFormat(_))
    }
}
