//! Command transport trait

use std::time::Duration;

use async_trait::async_trait;

use super::TransportError;

/// Single-writer text channel to an ELM327-style adapter
///
/// Only one command may be outstanding at a time and responses are
/// correlated to the most recently sent command. Implementations own
/// connection setup, retries and reconnection; the engine only sends.
#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// Send a command and wait up to `timeout` for the raw response text
    ///
    /// The text may include the adapter prompt (`>`) and embedded CR/LF.
    async fn send_command(&self, command: &str, timeout: Duration)
        -> Result<String, TransportError>;

    /// Check if the adapter link is up
    async fn is_connected(&self) -> bool;

    /// Whether a telemetry poller is currently using the channel
    fn is_polling(&self) -> bool {
        false
    }

    /// Ask the telemetry poller to stop; resuming it is up to the caller
    async fn stop_polling(&self) {}
}
