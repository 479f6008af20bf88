//! Transport layer for adapter communication
//!
//! The engine talks to the vehicle through [`CommandTransport`], a
//! send-command/await-text contract. Physical transports (Bluetooth,
//! serial, Wi-Fi) live outside this crate; a scripted [`MockTransport`]
//! is provided for simulation and tests.
//!
//! # Example
//!
//! ```ignore
//! use elmdiag_engine::transport::{create_transport, CommandTransport};
//! use elmdiag_engine::config::TransportConfig;
//!
//! let transport = create_transport(&TransportConfig::default())?;
//! let text = transport.send_command("0100", Duration::from_secs(2)).await?;
//! ```

mod adapter;
pub mod error;
pub mod mock;

pub use adapter::CommandTransport;
pub use error::TransportError;
pub use mock::{MockReply, MockTransport, SentCommand};

use std::sync::Arc;

use crate::config::TransportConfig;

/// Create a transport from configuration
pub fn create_transport(
    config: &TransportConfig,
) -> Result<Arc<dyn CommandTransport>, TransportError> {
    match config {
        TransportConfig::Mock(cfg) => {
            let transport = MockTransport::from_config(cfg)?;
            Ok(Arc::new(transport))
        }
    }
}
