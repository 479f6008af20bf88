//! Scan engine errors

use thiserror::Error;

/// Result type for engine operations
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors that end a scan or reject engine setup
///
/// Per-command failures never surface here; the orchestrator absorbs them
/// into step and log state.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Adapter not connected; the scan cannot start
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Cancellation was observed between phases
    #[error("Scan cancelled")]
    Cancelled,

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Not one standard module gave a readable answer
    #[error("No response from any module: {0}")]
    NoResponse(String),
}
