//! Error types for Tally.

use crate::account::Credits;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Ledger outcomes, for callers that prefer `?` over inspecting receipts
    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: Credits, available: Credits },

    #[error("Daily credits already claimed today (balance {balance})")]
    AlreadyClaimedToday { balance: Credits },

    // Entitlement errors
    #[error("Plan not found: {0}")]
    PlanNotFound(String),

    // Storage errors
    #[error("Ledger store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Concurrent update conflict: {0}")]
    Conflict(String),

    #[error("Corrupt ledger record: {0}")]
    CorruptRecord(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable(_) | Error::Conflict(_) | Error::Database(_) | Error::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
