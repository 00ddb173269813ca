//! Error types for phi-audit — Railway Programming
//!
//! All fallible operations return `Result<T, AuditError>`.
//! No panics, no unwraps in production code paths.

use thiserror::Error;

/// Unified error type for all audit operations
#[derive(Error, Debug)]
pub enum AuditError {
    // ─── Boundary Errors ───

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    // ─── Storage Errors ───

    #[error("Audit write failed: {0}")]
    AuditWriteFailed(String),

    #[error("Audit storage unavailable: {0}")]
    StorageUnavailable(String),

    // ─── Infrastructure Errors ───

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Actor unavailable: {0}")]
    ActorUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        AuditError::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AuditError {
    fn from(err: tokio::task::JoinError) -> Self {
        AuditError::Internal(format!("blocking task failed: {err}"))
    }
}

/// Result type alias for audit operations
pub type Result<T> = std::result::Result<T, AuditError>;
