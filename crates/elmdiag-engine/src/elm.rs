//! ELM327 adapter command layer
//!
//! Wraps a [`CommandTransport`] with the AT command vocabulary the scanner
//! needs (addressing, timing, protocol selection) and mirrors every trace
//! line into the optional [`ScanLog`] collaborator.

use std::sync::Arc;
use std::time::Duration;

use elmdiag_core::{CanHeader, EcuModule, ScanLog};

use crate::codec::AdapterResponse;
use crate::config::ScanConfig;
use crate::transport::{CommandTransport, TransportError};

/// Fixed AT commands
pub mod at {
    /// Longest response timeout the adapter supports
    pub const TIMEOUT_MAX: &str = "AT ST FF";
    pub const ADAPTIVE_TIMING_OFF: &str = "AT AT0";
    pub const ADAPTIVE_TIMING_ON: &str = "AT AT1";
    pub const HEADERS_ON: &str = "AT H1";
    pub const HEADERS_OFF: &str = "AT H0";
    /// Allow messages longer than seven bytes
    pub const LONG_MESSAGES: &str = "AT AL";
    /// Hide the data length code
    pub const DLC_OFF: &str = "AT D0";
    /// Clear the receive address filter
    pub const RECEIVE_ANY: &str = "AT CRA";
    pub const DESCRIBE_PROTOCOL_NUMBER: &str = "AT DPN";
    /// ISO 15765-4 CAN, 11-bit ID, 500 kbaud
    pub const PROTOCOL_CAN_11_500: &str = "AT SP 6";
    pub const PROTOCOL_AUTO: &str = "AT SP 0";
    pub const READ_VOLTAGE: &str = "AT RV";
}

/// Protocol number for ISO 15765-4 CAN (11-bit ID, 500 kbaud)
pub const CAN_11BIT_500K: char = '6';

/// Adapter response timeouts are set in steps of 4 ms
const TIMEOUT_UNIT_MS: u128 = 4;

/// Adapter power-on response timeout, restored on reset
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(200);

/// Uppercase a command and drop all whitespace, the form used for matching
pub fn normalize_command(command: &str) -> String {
    command
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

pub fn set_header_command(header: CanHeader) -> String {
    format!("AT SH {}", header)
}

pub fn receive_filter_command(header: CanHeader) -> String {
    format!("AT CRA {}", header)
}

/// `AT ST` command for a response timeout, clamped to the adapter's range
pub fn response_timeout_command(timeout: Duration) -> String {
    let steps = (timeout.as_millis() / TIMEOUT_UNIT_MS).clamp(1, 0xFF);
    format!("AT ST {:02X}", steps)
}

/// Result of `AT DPN`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolInfo {
    /// Selected by automatic search (`A` prefix)
    pub automatic: bool,
    /// Protocol number `1`..`9`, `A`..`C`
    pub number: char,
}

impl ProtocolInfo {
    pub fn parse(text: &str) -> Option<Self> {
        let word = normalize_command(&text.replace('>', ""));
        let (automatic, rest) = match word.strip_prefix('A') {
            Some(rest) if !rest.is_empty() => (true, rest),
            _ => (false, word.as_str()),
        };
        let mut chars = rest.chars();
        match (chars.next(), chars.next()) {
            (Some(number), None) if number.is_ascii_hexdigit() => Some(Self { automatic, number }),
            _ => None,
        }
    }

    pub fn is_can_11bit_500k(&self) -> bool {
        self.number == CAN_11BIT_500K
    }
}

/// Command channel shared by every scan phase
#[derive(Clone)]
pub struct ElmAdapter {
    transport: Arc<dyn CommandTransport>,
    log: Option<Arc<dyn ScanLog>>,
}

impl ElmAdapter {
    pub fn new(transport: Arc<dyn CommandTransport>) -> Self {
        Self {
            transport,
            log: None,
        }
    }

    /// Mirror trace lines into an audit log
    pub fn with_log(mut self, log: Arc<dyn ScanLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn transport(&self) -> &Arc<dyn CommandTransport> {
        &self.transport
    }

    /// Human readable trace line, sent to both `tracing` and the scan log
    pub fn trace(&self, message: &str) {
        tracing::info!("{}", message);
        if let Some(log) = &self.log {
            log.add_log(message);
        }
    }

    /// Send a command and wait at most `timeout` for the reply text
    pub async fn send(&self, command: &str, timeout: Duration) -> Result<String, TransportError> {
        tracing::debug!(command, timeout_ms = timeout.as_millis() as u64, "-> adapter");
        let reply = tokio::time::timeout(timeout, self.transport.send_command(command, timeout))
            .await
            .map_err(|_| {
                TransportError::Timeout(format!(
                    "'{}' unanswered after {} ms",
                    command,
                    timeout.as_millis()
                ))
            })??;
        tracing::debug!(command, reply = %reply.trim_end_matches(['\r', '\n', '>']), "<- adapter");
        Ok(reply)
    }

    /// Send a configuration command; failures are logged and reported as `false`
    pub async fn best_effort(&self, command: &str, timeout: Duration) -> bool {
        match self.send(command, timeout).await {
            Ok(text) => match AdapterResponse::parse(&text) {
                AdapterResponse::Ok | AdapterResponse::Messages(_) => true,
                other => {
                    tracing::warn!(command, response = ?other, "Adapter command not acknowledged");
                    self.trace(&format!("{} not acknowledged", command));
                    false
                }
            },
            Err(e) => {
                tracing::warn!(command, error = %e, "Adapter command failed");
                self.trace(&format!("{} failed: {}", command, e));
                false
            }
        }
    }

    /// Apply scan settings: long timeout, fixed timing, headers, long messages
    ///
    /// Returns how many commands were not acknowledged.
    pub async fn configure(&self, config: &ScanConfig) -> usize {
        let commands = [
            at::TIMEOUT_MAX,
            at::ADAPTIVE_TIMING_OFF,
            at::HEADERS_ON,
            at::LONG_MESSAGES,
            at::DLC_OFF,
        ];
        let mut failures = 0;
        for command in commands {
            if !self.best_effort(command, config.config_timeout()).await {
                failures += 1;
            }
        }
        failures
    }

    /// Point requests at `module` and only accept its replies
    pub async fn select_module(&self, module: &EcuModule, timeout: Duration) -> bool {
        let header = self.best_effort(&set_header_command(module.tx_header), timeout).await;
        let filter = self
            .best_effort(&receive_filter_command(module.rx_filter), timeout)
            .await;
        header && filter
    }

    /// Functional broadcast addressing with no receive filter
    pub async fn select_broadcast(&self, timeout: Duration) -> bool {
        let header = self
            .best_effort(&set_header_command(CanHeader::BROADCAST), timeout)
            .await;
        let filter = self.best_effort(at::RECEIVE_ANY, timeout).await;
        header && filter
    }

    /// Restore default adapter state after a scan
    pub async fn reset(&self, config: &ScanConfig) -> usize {
        let timeout = config.config_timeout();
        let default_timeout = response_timeout_command(DEFAULT_RESPONSE_TIMEOUT);
        let mut failures = 0;
        if !self.best_effort(at::HEADERS_OFF, timeout).await {
            failures += 1;
        }
        if !self.select_broadcast(timeout).await {
            failures += 1;
        }
        for command in [default_timeout.as_str(), at::ADAPTIVE_TIMING_ON] {
            if !self.best_effort(command, timeout).await {
                failures += 1;
            }
        }
        failures
    }

    /// Current protocol as reported by `AT DPN`
    pub async fn protocol(&self, timeout: Duration) -> Option<ProtocolInfo> {
        match self.send(at::DESCRIBE_PROTOCOL_NUMBER, timeout).await {
            Ok(text) => ProtocolInfo::parse(&text),
            Err(e) => {
                tracing::warn!(error = %e, "Protocol query failed");
                None
            }
        }
    }

    /// Make sure the bus runs 11-bit/500k CAN
    ///
    /// Forces protocol 6 and probes it with `0100`; when that fails the
    /// adapter is put back on automatic search.
    pub async fn ensure_can_protocol(&self, config: &ScanConfig) -> Option<ProtocolInfo> {
        let timeout = config.config_timeout();
        if let Some(current) = self.protocol(timeout).await {
            if current.is_can_11bit_500k() {
                self.trace(&format!("Protocol {} (CAN 11-bit 500k)", current.number));
                return Some(current);
            }
            self.trace(&format!("Protocol {} detected, forcing CAN 11-bit 500k", current.number));
        }

        if self.best_effort(at::PROTOCOL_CAN_11_500, timeout).await {
            let probe = self.send("0100", config.mode03_timeout()).await;
            let answered = matches!(
                probe.as_deref().map(AdapterResponse::parse),
                Ok(AdapterResponse::Messages(_))
            );
            if answered {
                self.trace("Forced protocol 6");
                return Some(ProtocolInfo {
                    automatic: false,
                    number: CAN_11BIT_500K,
                });
            }
        }

        self.trace("CAN 11-bit 500k not available, falling back to automatic protocol");
        self.best_effort(at::PROTOCOL_AUTO, timeout).await;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use elmdiag_core::{EcuCategory, LogBuffer};

    fn adapter(mock: &Arc<MockTransport>) -> ElmAdapter {
        ElmAdapter::new(mock.clone())
    }

    #[test]
    fn test_normalize_command() {
        assert_eq!(normalize_command("at sh 7e0"), "ATSH7E0");
        assert_eq!(normalize_command(" 19 02 08 "), "190208");
    }

    #[test]
    fn test_response_timeout_command_clamps() {
        assert_eq!(response_timeout_command(Duration::from_millis(400)), "AT ST 64");
        assert_eq!(response_timeout_command(Duration::from_secs(10)), "AT ST FF");
        assert_eq!(response_timeout_command(Duration::ZERO), "AT ST 01");
    }

    #[test]
    fn test_protocol_info_parse() {
        assert_eq!(
            ProtocolInfo::parse("A6\r\r>"),
            Some(ProtocolInfo {
                automatic: true,
                number: '6'
            })
        );
        assert_eq!(ProtocolInfo::parse("3").map(|p| p.is_can_11bit_500k()), Some(false));
        // Protocol A (SAE J1939) reported without automatic search
        assert_eq!(
            ProtocolInfo::parse("A"),
            Some(ProtocolInfo {
                automatic: false,
                number: 'A'
            })
        );
        assert_eq!(ProtocolInfo::parse("?"), None);
    }

    #[tokio::test]
    async fn test_select_module_sets_header_and_filter() {
        let mock = Arc::new(MockTransport::new());
        let module = EcuModule::new("abs", "ABS", "ABS", EcuCategory::Chassis, 0x7E2, 0x7EA);

        assert!(adapter(&mock).select_module(&module, Duration::from_secs(1)).await);
        assert_eq!(mock.sent_commands(), vec!["ATSH7E2", "ATCRA7EA"]);
        assert_eq!(mock.current_header(), Some(CanHeader::new(0x7E2)));
    }

    #[tokio::test]
    async fn test_configure_is_best_effort() {
        let mock = Arc::new(MockTransport::new());
        mock.on("AT AL", "?");
        let log = Arc::new(LogBuffer::new());
        let elm = adapter(&mock).with_log(log.clone());

        let failures = elm.configure(&ScanConfig::default()).await;

        assert_eq!(failures, 1);
        assert_eq!(mock.sent_commands().len(), 5);
        assert!(log.contains("AT AL not acknowledged"));
    }

    #[tokio::test]
    async fn test_forces_can_protocol() {
        let mock = Arc::new(MockTransport::new());
        mock.on("AT DPN", "A3").on("0100", "41 00 BE 3F A8 13");

        let protocol = adapter(&mock)
            .ensure_can_protocol(&ScanConfig::default())
            .await;

        assert_eq!(protocol.map(|p| p.number), Some('6'));
        assert!(mock.sent_commands().contains(&"ATSP6".to_string()));
        assert!(!mock.sent_commands().contains(&"ATSP0".to_string()));
    }

    #[tokio::test]
    async fn test_falls_back_to_auto_protocol() {
        let mock = Arc::new(MockTransport::new());
        mock.on("AT DPN", "A3");

        let protocol = adapter(&mock)
            .ensure_can_protocol(&ScanConfig::default())
            .await;

        assert_eq!(protocol, None);
        assert_eq!(mock.sent_commands().last().map(String::as_str), Some("ATSP0"));
    }

    #[tokio::test]
    async fn test_send_maps_transport_timeout() {
        let mock = Arc::new(MockTransport::new());
        mock.send_command("AT SH 7E0", Duration::from_secs(1)).await.unwrap();
        mock.timeout_on(CanHeader::new(0x7E0), "03");

        let err = adapter(&mock)
            .send("03", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_reset_restores_defaults() {
        let mock = Arc::new(MockTransport::new());
        mock.on("AT AT1", "?");

        let failures = adapter(&mock).reset(&ScanConfig::default()).await;

        assert_eq!(failures, 1);
        assert_eq!(
            mock.sent_commands(),
            vec!["ATH0", "ATSH7DF", "ATCRA", "ATST32", "ATAT1"]
        );
    }
}
