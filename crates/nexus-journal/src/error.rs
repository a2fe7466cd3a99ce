//! Journal error types.
//!
//! This module defines all error types for the write-ahead journal.

use std::io;

use nexus_common::types::{JournalNumber, ScratchPos};
use thiserror::Error;

/// Result type for journal operations.
pub type JournalResult<T> = Result<T, JournalError>;

/// Errors that can occur during journal operations.
#[derive(Debug, Error)]
pub enum JournalError {
    /// I/O error from the journal writer.
    #[error("journal I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// The journal file was disposed and can no longer be used.
    #[error("journal file {number} is disposed")]
    Disposed { number: JournalNumber },

    /// The transaction handed to the journal is malformed.
    #[error("invalid transaction: {reason}")]
    InvalidTransaction { reason: String },

    /// The write does not fit in the pages allocated for the journal file.
    #[error("journal file {number} is full: {required} pages required, {available} available")]
    JournalFull {
        number: JournalNumber,
        required: u64,
        available: u64,
    },

    /// Compressing a transaction payload failed.
    #[error("failed to compress transaction: {reason}")]
    Compression { reason: String },

    /// Decompressing a transaction payload failed.
    #[error("failed to decompress transaction: {reason}")]
    Decompression { reason: String },

    /// Replayed journal contents are internally inconsistent.
    #[error("journal corrupted at page {position}: {reason}")]
    Corrupted { position: u64, reason: String },

    /// The scratch pool has no allocation at the given position.
    #[error("scratch page not found: {position}")]
    ScratchPageNotFound { position: ScratchPos },

    /// `release` was called on a journal file with no outstanding references.
    #[error("journal file {number} released more times than referenced")]
    ReleasedTooManyTimes { number: JournalNumber },

    /// Configuration error.
    #[error("journal configuration error: {reason}")]
    Config { reason: String },

    /// The journal writer was closed and can no longer be written or read.
    #[error("journal writer is closed")]
    WriterClosed,

    /// A blocking I/O task panicked or was cancelled.
    #[error("journal write task failed: {reason}")]
    WriteTaskFailed { reason: String },
}

impl JournalError {
    /// Creates an invalid transaction error.
    pub fn invalid_transaction(reason: impl Into<String>) -> Self {
        Self::InvalidTransaction {
            reason: reason.into(),
        }
    }

    /// Creates a compression error.
    pub fn compression(reason: impl Into<String>) -> Self {
        Self::Compression {
            reason: reason.into(),
        }
    }

    /// Creates a decompression error.
    pub fn decompression(reason: impl Into<String>) -> Self {
        Self::Decompression {
            reason: reason.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(position: u64, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            position,
            reason: reason.into(),
        }
    }

    /// Creates a config error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Returns true if the caller broke a precondition of the journal.
    ///
    /// These are programming errors and must not be retried.
    pub fn is_precondition_violation(&self) -> bool {
        matches!(
            self,
            Self::Disposed { .. }
                | Self::InvalidTransaction { .. }
                | Self::ReleasedTooManyTimes { .. }
                | Self::WriterClosed
        )
    }

    /// Returns true if this is a corruption error.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::Corrupted { .. } | Self::Decompression { .. }
        )
    }

    /// Returns true if the error came from the underlying storage.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::WriteTaskFailed { .. })
    }
}
