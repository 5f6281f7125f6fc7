//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A fractional-seconds precision outside 0..=6 was requested.
    #[error("invalid fractional precision: {dec} (must be 0..=6)")]
    InvalidPrecision {
        /// The requested precision.
        dec: u8,
    },

    /// A field value does not fit its documented range or width.
    #[error("value out of range: {message}")]
    ValueOutOfRange {
        /// Description of the violated range.
        message: String,
    },

    /// The input buffer ended before the encoded value did.
    #[error("unexpected end of input")]
    Truncated,

    /// A key buffer does not match its segment descriptor list.
    #[error("invalid key segment: {message}")]
    InvalidSegment {
        /// Description of the mismatch.
        message: String,
    },
}

impl CodecError {
    /// Create a value out of range error.
    pub fn value_out_of_range(message: impl Into<String>) -> Self {
        Self::ValueOutOfRange {
            message: message.into(),
        }
    }

    /// Create an invalid segment error.
    pub fn invalid_segment(message: impl Into<String>) -> Self {
        Self::InvalidSegment {
            message: message.into(),
        }
    }
}
