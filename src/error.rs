//! Error types for the migration engine
//!
//! Separates unrecoverable history divergence from per-step failures so
//! callers can decide whether to terminate the process.

use thiserror::Error;

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Error types for migration operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MigrationError {
    /// Persisted migration history and registered migrations cannot be
    /// aligned. The operation was aborted before any side effect; this must
    /// be fixed by a human, not retried.
    #[error("broken migration history: {0}")]
    BrokenHistory(String),

    /// A single migration step failed. Its transaction was rolled back and
    /// no later version was attempted.
    #[error("migration {version} failed: {source}")]
    Step {
        /// Version of the migration whose transaction failed
        version: i64,
        /// Underlying store or procedure failure
        source: Box<MigrationError>,
    },

    /// Store failure outside any migration step (loading records, creating
    /// the version table, opening a transaction)
    #[error("store error: {0}")]
    Store(String),

    /// Commit or rollback failure
    #[error("transaction error: {0}")]
    Transaction(String),
}

impl MigrationError {
    /// Whether this error signals that migration history has drifted from
    /// code. Fatal errors must not be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MigrationError::BrokenHistory(_))
    }

    /// The version whose step failed, if this is a step failure
    pub fn failed_version(&self) -> Option<i64> {
        match self {
            MigrationError::Step { version, .. } => Some(*version),
            _ => None,
        }
    }

    pub(crate) fn step(version: i64, source: MigrationError) -> Self {
        MigrationError::Step {
            version,
            source: Box::new(source),
        }
    }
}

// Convert from sqlx errors
impl From<sqlx::Error> for MigrationError {
    fn from(err: sqlx::Error) -> Self {
        MigrationError::Store(err.to_string())
    }
}
