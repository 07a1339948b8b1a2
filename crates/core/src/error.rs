//! Unified error types for the uptime pipeline.
//!
//! The taxonomy mirrors how each failure is handled:
//! - `Transient`: storage/network I/O, retried with backoff before a job
//!   degrades
//! - `Parse`: malformed record, skipped and counted, never fatal
//! - `Schema`: record shape does not match the expected columns
//! - `MergeConflict`: a keyed write or watermark commit lost serialization
//! - `Storage`: local store I/O

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Transient I/O error (object storage, network). Safe to retry.
    #[error("transient i/o error: {0}")]
    Transient(String),

    /// Malformed record. The record is skipped, never the batch.
    #[error("parse error: {0}")]
    Parse(String),

    /// Record shape does not match the expected column layout.
    #[error("schema mismatch: {0}")]
    Schema(String),

    /// Concurrent or regressive write detected on a keyed table or watermark.
    #[error("merge conflict: {0}")]
    MergeConflict(String),

    /// Local store I/O failure.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn merge_conflict(msg: impl Into<String>) -> Self {
        Self::MergeConflict(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the caller should retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether the error affects a single record rather than the run.
    pub fn is_record_level(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::Schema(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
