//! Error types for report persistence.

use thiserror::Error;

/// Failure while persisting a report.
///
/// Only the report writer produces this; the profiler logs it and carries on.
#[derive(Error, Debug)]
pub enum ReportError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using [`ReportError`].
pub type Result<T> = std::result::Result<T, ReportError>;
