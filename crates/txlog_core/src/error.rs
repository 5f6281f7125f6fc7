//! Error types for txlog core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in txlog core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] txlog_storage::StorageError),

    /// Binary codec error.
    #[error("codec error: {0}")]
    Codec(#[from] txlog_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The log stream violates a transaction boundary invariant.
    ///
    /// Malformed logs are recoverable: the scan stops at the last good
    /// position, and the file remains a truncation candidate.
    #[error("malformed log: {message}")]
    Malformed {
        /// Description of the violated invariant.
        message: String,
    },

    /// An unrecoverable recovery error.
    ///
    /// Fatal errors gate every destructive step: no file is deleted or
    /// truncated once one has been recorded.
    #[error("fatal recovery error: {message}")]
    Fatal {
        /// Description of the failure.
        message: String,
    },

    /// A log record is structurally corrupted.
    #[error("log corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// Invalid log file or index format.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// The log directory is locked by another process.
    #[error("log directory locked: another process has exclusive access")]
    LogDirLocked,

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a malformed log error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates a fatal recovery error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Creates a log corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
