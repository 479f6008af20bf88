//! Common error types for the core model

use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while building model values or talking to collaborators
#[derive(Debug, Error)]
pub enum CoreError {
    /// Code does not match `[PCBU][0-9A-F]{4}`
    #[error("Invalid DTC code: {0}")]
    InvalidDtcCode(String),

    /// CAN header is not exactly three hex digits
    #[error("Invalid CAN header: {0}")]
    InvalidCanHeader(String),

    /// Persistence collaborator failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Snapshot could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
