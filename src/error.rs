//! Error types for Seriesfold.
//!
//! This module defines the unified error enum used throughout the crate. All fallible
//! operations return `Result<T, Error>`. Fatal corruption variants (`BoundaryViolation`,
//! `FooterTypeMismatch`, `UnsupportedVersion`, `Codec`) abort the current operation and
//! leave the medium cursor at an unspecified position; the engine instance must be
//! discarded afterward. Checksum verification is deliberately *not* an error: read
//! operations surface it as a `bool` so the caller can keep best-effort data.

use crate::types::FooterType;

/// Convenience alias used by every fallible operation in the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all Seriesfold operations.
///
/// Each variant represents a distinct failure mode:
///
/// - `Io` -- propagated verbatim from the underlying medium.
/// - `BoundaryViolation`, `FooterTypeMismatch`, `UnsupportedVersion`, `Codec` --
///   fatal stream corruption.
/// - `Usage` -- API misuse (e.g., finalizing a builder twice, a payload callback
///   reporting a byte count that does not match what it wrote).
/// - `EndOfStream` -- the iterator's dedicated terminal condition, distinct from
///   I/O errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error occurred on the underlying medium.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A byte expected to be a region boundary marker was not 0x00.
    #[error("boundary marker at offset {position} is {found:#04x}, expected 0x00")]
    BoundaryViolation {
        /// Absolute offset of the offending byte.
        position: u64,
        /// The byte actually found there.
        found: u8,
    },

    /// A shadow footer declared a footer type other than the one expected at
    /// this point of the walk (or an unknown type code altogether).
    #[error("footer type mismatch: expected {expected:?}, found type code {found}")]
    FooterTypeMismatch {
        /// The footer flavor the caller was positioned to read.
        expected: FooterType,
        /// The raw type code found in the shadow footer.
        found: u8,
    },

    /// A shadow footer declared a version this implementation does not know.
    #[error("unsupported {footer_type:?} footer version: {version}")]
    UnsupportedVersion {
        /// The footer flavor whose version was not recognized.
        footer_type: FooterType,
        /// The unrecognized version number.
        version: u16,
    },

    /// A footer body failed to encode or decode (truncated body, malformed
    /// field, oversized encoding).
    #[error("codec error: {0}")]
    Codec(String),

    /// The API was used outside its contract.
    #[error("usage error: {0}")]
    Usage(String),

    /// Iteration has visited every series (or the stream holds none).
    #[error("end of stream: no further series to iterate")]
    EndOfStream,
}

impl From<prost::DecodeError> for Error {
    fn from(err: prost::DecodeError) -> Error {
        Error::Codec(err.to_string())
    }
}
