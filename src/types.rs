//! Shared error and result types for Lapidary

use thiserror::Error;

/// Convenience result alias used throughout the crate
pub type Result<T> = std::result::Result<T, LapidaryError>;

/// Service-wide error type
///
/// The first group maps one-to-one onto caller-visible failures of the
/// staking and production operations; the second group covers infrastructure
/// faults that surface as 500s.
#[derive(Debug, Error)]
pub enum LapidaryError {
    /// Malformed or out-of-range input, unknown gem template
    #[error("validation failed: {0}")]
    Validation(String),

    /// Missing record, slot, job, or occupant
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate stake, occupied slot, or sequential-unlock violation
    #[error("conflict: {0}")]
    Conflict(String),

    /// Ledger balance too low to fund the requested debit
    #[error("insufficient resource: {0}")]
    InsufficientResource(String),

    /// Completion requested before the job's finish time
    #[error("job still running: {0}")]
    StillRunning(String),

    /// No free production slot within the effective limit
    #[error("slots exhausted: {0}")]
    SlotsExhausted(String),

    /// Ownership oracle answered and the account does not own the assets
    #[error("ownership check failed: {0}")]
    Ownership(String),

    /// MongoDB failure
    #[error("database error: {0}")]
    Database(String),

    /// Outbound HTTP failure (ownership oracle)
    #[error("http error: {0}")]
    Http(String),

    /// NATS failure (payment intents)
    #[error("nats error: {0}")]
    Nats(String),

    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<mongodb::error::Error> for LapidaryError {
    fn from(e: mongodb::error::Error) -> Self {
        LapidaryError::Database(e.to_string())
    }
}

impl From<std::io::Error> for LapidaryError {
    fn from(e: std::io::Error) -> Self {
        LapidaryError::Internal(e.to_string())
    }
}
