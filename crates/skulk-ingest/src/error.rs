//! Error and Result types for Skulk ingestion.

use crate::point::Location;
use std::io;
use thiserror::Error;

/// A convenience `Result` type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Broad classification of an [`IngestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input buffer is malformed. The whole batch must be rejected.
    CorruptInput,
    /// A driver or caller bug. Never retried, never recovered from.
    InternalInvariant,
    /// The storage backend failed or returned bytes it could not have written.
    Storage,
}

/// The error type for ingestion operations.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Buffer ends mid-header or mid-payload.
    #[error("Truncated record at offset {offset}: needed {needed} bytes, {available} available")]
    TruncatedRecord {
        /// Offset of the record header.
        offset: usize,
        /// Bytes the record requires from its header onwards.
        needed: u64,
        /// Bytes remaining in the buffer from the header onwards.
        available: usize,
    },

    /// Extended payload length exceeds the configured limit.
    #[error("Payload too large at offset {offset}: {len} bytes exceeds limit {limit}")]
    PayloadTooLarge {
        /// Offset of the record header.
        offset: usize,
        /// Declared payload length.
        len: u64,
        /// Configured maximum payload length.
        limit: u64,
    },

    /// Pointer resolution was handed an offset map that does not cover the chain.
    #[error("Internal invariant violation at extended location {location}: {reason}")]
    InternalInvariantViolation {
        /// Extended location that triggered the violation.
        location: Location,
        /// What went wrong.
        reason: String,
    },

    /// A stored bucket object could not be decoded.
    #[error("Corrupt store object: {0}")]
    CorruptStore(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl IngestError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TruncatedRecord { .. } | Self::PayloadTooLarge { .. } => ErrorKind::CorruptInput,
            Self::InternalInvariantViolation { .. } => ErrorKind::InternalInvariant,
            Self::CorruptStore(_) | Self::IoError(_) => ErrorKind::Storage,
        }
    }

    /// Returns true if the input batch itself is malformed.
    pub fn is_corrupt_input(&self) -> bool {
        self.kind() == ErrorKind::CorruptInput
    }

    /// Returns true if this error indicates a programming bug.
    pub fn is_invariant_violation(&self) -> bool {
        self.kind() == ErrorKind::InternalInvariant
    }
}
