//! Error types for SimExpiry
//!
//! All errors use thiserror for structured error handling.
//! Recoverable failures (bad dates, missing permissions, store hiccups,
//! out-of-range settings) are reported, never escalated into a crash.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unrecognized date: {0:?}")]
    DateParse(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Record store unavailable: {0}")]
    StoreIo(String),

    #[error("Invalid setting: {0}")]
    InvalidConfig(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("SIM record not found: {0}")]
    RecordNotFound(i64),

    #[error("SIM card number already registered: {0}")]
    DuplicateSimNumber(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Whether the failure should degrade behavior rather than abort the caller
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::DateParse(_)
                | AppError::PermissionDenied(_)
                | AppError::StoreIo(_)
                | AppError::InvalidConfig(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
