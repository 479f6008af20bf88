//! Scripted mock transport for simulation and testing

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use elmdiag_core::{CanHeader, DtcCode};
use parking_lot::{Mutex, RwLock};

use super::{CommandTransport, TransportError};
use crate::codec::encode_mode03_response;
use crate::config::MockConfig;
use crate::elm::normalize_command;

/// What the mock answers with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Raw adapter text (the prompt is appended automatically)
    Text(String),
    /// No answer within the command's timeout
    Timeout,
}

impl MockReply {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    fn from_script(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("TIMEOUT") {
            Self::Timeout
        } else {
            Self::Text(s.to_string())
        }
    }
}

/// A command as seen by the mock, with the header selected at the time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCommand {
    pub header: Option<CanHeader>,
    pub command: String,
}

struct Rule {
    header: Option<CanHeader>,
    command: String,
    replies: VecDeque<MockReply>,
}

/// Header-aware scripted transport
///
/// Replies are looked up by (selected header, command), falling back to
/// rules registered for any header. A rule's replies are consumed in order
/// and the last one repeats. Unscripted AT commands answer `OK`, everything
/// else answers `NO DATA`.
pub struct MockTransport {
    connected: AtomicBool,
    polling: AtomicBool,
    latency: Duration,
    rules: RwLock<Vec<Rule>>,
    header: Mutex<Option<CanHeader>>,
    sent: Mutex<Vec<SentCommand>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            polling: AtomicBool::new(false),
            latency: Duration::ZERO,
            rules: RwLock::new(Vec::new()),
            header: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Build a mock from a TOML script
    pub fn from_config(config: &MockConfig) -> Result<Self, TransportError> {
        let mut mock = Self::new();
        mock.latency = Duration::from_millis(config.latency_ms);
        mock.set_connected(!config.disconnected);
        mock.set_polling(config.polling);

        for rule in &config.rules {
            let header = rule
                .header
                .as_deref()
                .map(CanHeader::parse)
                .transpose()
                .map_err(|e| TransportError::InvalidConfig(e.to_string()))?;
            if rule.replies.is_empty() {
                return Err(TransportError::InvalidConfig(format!(
                    "No replies scripted for command '{}'",
                    rule.command
                )));
            }
            let replies = rule.replies.iter().map(|r| MockReply::from_script(r)).collect();
            mock.script(header, &rule.command, replies);
        }

        Ok(mock)
    }

    /// Answer `command` with `reply` whatever header is selected
    pub fn on(&self, command: &str, reply: &str) -> &Self {
        self.script(None, command, vec![MockReply::text(reply)])
    }

    /// Answer `command` with `reply` while `header` is selected
    pub fn on_module(&self, header: CanHeader, command: &str, reply: &str) -> &Self {
        self.script(Some(header), command, vec![MockReply::text(reply)])
    }

    /// Never answer `command` while `header` is selected
    pub fn timeout_on(&self, header: CanHeader, command: &str) -> &Self {
        self.script(Some(header), command, vec![MockReply::Timeout])
    }

    /// Answer a Mode 03 request on `header` with the given codes
    pub fn with_mode03(&self, header: CanHeader, codes: &[DtcCode]) -> &Self {
        let text = encode_mode03_response(codes);
        self.script(Some(header), "03", vec![MockReply::Text(text)])
    }

    /// Register a reply sequence; later registrations for the same key win
    pub fn script(
        &self,
        header: Option<CanHeader>,
        command: &str,
        replies: Vec<MockReply>,
    ) -> &Self {
        let command = normalize_command(command);
        let mut rules = self.rules.write();
        rules.retain(|r| !(r.header == header && r.command == command));
        rules.push(Rule {
            header,
            command,
            replies: replies.into(),
        });
        self
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_polling(&self, polling: bool) {
        self.polling.store(polling, Ordering::SeqCst);
    }

    /// Every command sent so far
    pub fn sent(&self) -> Vec<SentCommand> {
        self.sent.lock().clone()
    }

    /// Normalized command texts sent so far
    pub fn sent_commands(&self) -> Vec<String> {
        self.sent.lock().iter().map(|s| s.command.clone()).collect()
    }

    /// How many times `command` was sent while `header` was selected
    pub fn count_sent(&self, header: Option<CanHeader>, command: &str) -> usize {
        let command = normalize_command(command);
        self.sent
            .lock()
            .iter()
            .filter(|s| s.header == header && s.command == command)
            .count()
    }

    /// Currently selected transmit header
    pub fn current_header(&self) -> Option<CanHeader> {
        *self.header.lock()
    }

    fn next_reply(&self, header: Option<CanHeader>, command: &str) -> MockReply {
        let mut rules = self.rules.write();
        let index = rules
            .iter()
            .position(|r| r.header.is_some() && r.header == header && r.command == command)
            .or_else(|| {
                rules
                    .iter()
                    .position(|r| r.header.is_none() && r.command == command)
            });

        if let Some(i) = index {
            let rule = &mut rules[i];
            if rule.replies.len() > 1 {
                if let Some(reply) = rule.replies.pop_front() {
                    return reply;
                }
            }
            if let Some(reply) = rule.replies.front() {
                return reply.clone();
            }
        }

        Self::default_reply(command)
    }

    fn default_reply(command: &str) -> MockReply {
        match command {
            "ATDPN" => MockReply::text("6"),
            "ATRV" => MockReply::text("12.6V"),
            c if c.starts_with("AT") => MockReply::text("OK"),
            _ => MockReply::text("NO DATA"),
        }
    }

    fn track_header(&self, command: &str) {
        if let Some(rest) = command.strip_prefix("ATSH") {
            match CanHeader::parse(rest) {
                Ok(header) => *self.header.lock() = Some(header),
                Err(_) => tracing::debug!(command, "Mock transport: ignoring non 11-bit header"),
            }
        }
    }
}

#[async_trait]
impl CommandTransport for MockTransport {
    async fn send_command(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }

        let command = normalize_command(command);
        let header = self.current_header();
        self.sent.lock().push(SentCommand {
            header,
            command: command.clone(),
        });

        let reply = self.next_reply(header, &command);
        self.track_header(&command);

        // Simulate latency
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        tracing::debug!(%command, ?reply, "Mock transport: reply");
        match reply {
            MockReply::Text(text) => Ok(format!("{}\r\r>", text)),
            MockReply::Timeout => Err(TransportError::Timeout(format!(
                "'{}' unanswered after {} ms",
                command,
                timeout.as_millis()
            ))),
        }
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_polling(&self) -> bool {
        self.polling.load(Ordering::SeqCst)
    }

    async fn stop_polling(&self) {
        self.polling.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockRuleConfig;

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[tokio::test]
    async fn test_defaults_answer_at_and_no_data() {
        let mock = MockTransport::new();
        assert_eq!(mock.send_command("AT H1", TIMEOUT).await.unwrap(), "OK\r\r>");
        assert_eq!(mock.send_command("03", TIMEOUT).await.unwrap(), "NO DATA\r\r>");
        assert_eq!(mock.sent_commands(), vec!["ATH1", "03"]);
    }

    #[tokio::test]
    async fn test_header_scoped_rules() {
        let ecm = CanHeader::new(0x7E0);
        let mock = MockTransport::new();
        mock.on_module(ecm, "03", "43 01 01 00").on("03", "43 00");

        assert_eq!(mock.send_command("03", TIMEOUT).await.unwrap(), "43 00\r\r>");
        mock.send_command("AT SH 7E0", TIMEOUT).await.unwrap();
        assert_eq!(mock.current_header(), Some(ecm));
        assert_eq!(mock.send_command("03", TIMEOUT).await.unwrap(), "43 01 01 00\r\r>");
        assert_eq!(mock.count_sent(Some(ecm), "03"), 1);
        assert_eq!(mock.count_sent(None, "03"), 1);
    }

    #[tokio::test]
    async fn test_sequence_repeats_last_reply() {
        let ecm = CanHeader::new(0x7E0);
        let mock = MockTransport::new();
        mock.send_command("ATSH7E0", TIMEOUT).await.unwrap();
        mock.script(
            Some(ecm),
            "190208",
            vec![MockReply::text("7F 19 78"), MockReply::text("59 02 FF")],
        );

        assert_eq!(mock.send_command("19 02 08", TIMEOUT).await.unwrap(), "7F 19 78\r\r>");
        assert_eq!(mock.send_command("190208", TIMEOUT).await.unwrap(), "59 02 FF\r\r>");
        assert_eq!(mock.send_command("190208", TIMEOUT).await.unwrap(), "59 02 FF\r\r>");
    }

    #[tokio::test]
    async fn test_timeout_and_disconnect() {
        let mock = MockTransport::new();
        mock.send_command("AT SH 7E2", TIMEOUT).await.unwrap();
        mock.timeout_on(CanHeader::new(0x7E2), "03");

        let err = mock.send_command("03", TIMEOUT).await.unwrap_err();
        assert!(err.is_timeout());

        mock.set_connected(false);
        assert!(!mock.is_connected().await);
        assert_eq!(
            mock.send_command("03", TIMEOUT).await.unwrap_err(),
            TransportError::NotConnected
        );
    }

    #[tokio::test]
    async fn test_from_config_rejects_bad_header() {
        let config = MockConfig {
            rules: vec![MockRuleConfig {
                header: Some("7E".to_string()),
                command: "03".to_string(),
                replies: vec!["43 00".to_string()],
            }],
            ..Default::default()
        };
        assert!(matches!(
            MockTransport::from_config(&config),
            Err(TransportError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_polling() {
        let mock = MockTransport::new();
        mock.set_polling(true);
        assert!(mock.is_polling());
        mock.stop_polling().await;
        assert!(!mock.is_polling());
    }
}
