//! Scan engine configuration
//!
//! Timeouts, thresholds and the UDS status-mask priority list, plus the
//! transport selection used by the command-line front end. Everything has a
//! default so an empty TOML document is a valid configuration.

use std::path::Path;
use std::time::Duration;

use elmdiag_core::status_bit;
use serde::{Deserialize, Serialize};

use crate::error::{ScanError, ScanResult};

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElmdiagConfig {
    /// Scan behavior
    #[serde(default)]
    pub scan: ScanConfig,
    /// Transport selection
    #[serde(default)]
    pub transport: TransportConfig,
}

impl ElmdiagConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> ScanResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScanError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            ScanError::Config(msg) => {
                ScanError::Config(format!("'{}': {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> ScanResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ScanError::Config(format!("Failed to parse config: {}", e)))?;
        config.scan.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Scan Configuration
// =============================================================================

/// One entry of the UDS status-mask priority list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMaskConfig {
    /// Status mask byte sent with 0x19 0x02
    pub mask: u8,
    /// What the mask selects
    #[serde(default)]
    pub description: String,
}

impl StatusMaskConfig {
    pub fn new(mask: u8, description: &str) -> Self {
        Self {
            mask,
            description: description.to_string(),
        }
    }
}

/// Scan behavior and per-command timeouts (milliseconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Adapter configuration and reset commands
    #[serde(default = "default_config_timeout")]
    pub config_timeout_ms: u64,
    /// Mode 01 PID 42 and `AT RV`
    #[serde(default = "default_voltage_timeout")]
    pub voltage_timeout_ms: u64,
    /// Mode 09 PID 02
    #[serde(default = "default_vin_timeout")]
    pub vin_timeout_ms: u64,
    /// Mode 03 per module; slow modules (ABS, airbag) need headroom
    #[serde(default = "default_mode03_timeout")]
    pub mode03_timeout_ms: u64,
    /// Diagnostic session control
    #[serde(default = "default_session_timeout")]
    pub session_timeout_ms: u64,
    /// UDS 0x19 queries against standard modules
    #[serde(default = "default_uds_timeout")]
    pub uds_timeout_ms: u64,
    /// UDS 0x19 queries against manufacturer addresses
    #[serde(default = "default_alternate_timeout")]
    pub alternate_timeout_ms: u64,
    /// Tester present between masks
    #[serde(default = "default_keepalive_timeout")]
    pub keepalive_timeout_ms: u64,
    /// Mode 03 re-query during double-check
    #[serde(default = "default_double_check_timeout")]
    pub double_check_timeout_ms: u64,
    /// Mode 04 / UDS 0x14
    #[serde(default = "default_clear_timeout")]
    pub clear_timeout_ms: u64,
    /// Wait before repeating a request answered with "response pending"
    #[serde(default = "default_response_pending_wait")]
    pub response_pending_wait_ms: u64,
    /// Wait between clearing codes and the verification read
    #[serde(default = "default_clear_settle")]
    pub clear_settle_ms: u64,
    /// Below this the results are flagged as potentially noisy
    #[serde(default = "default_low_voltage_threshold")]
    pub low_voltage_threshold: f32,
    /// Run the double-check pass when codes are found
    #[serde(default = "default_true")]
    pub double_check: bool,
    /// Query UDS 0x19 in addition to Mode 03
    #[serde(default = "default_true")]
    pub uds_enabled: bool,
    /// Probe manufacturer-specific addresses after the standard modules
    #[serde(default = "default_true")]
    pub alternate_addressing: bool,
    /// UDS status masks in priority order
    #[serde(default = "default_status_masks")]
    pub status_masks: Vec<StatusMaskConfig>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            config_timeout_ms: default_config_timeout(),
            voltage_timeout_ms: default_voltage_timeout(),
            vin_timeout_ms: default_vin_timeout(),
            mode03_timeout_ms: default_mode03_timeout(),
            session_timeout_ms: default_session_timeout(),
            uds_timeout_ms: default_uds_timeout(),
            alternate_timeout_ms: default_alternate_timeout(),
            keepalive_timeout_ms: default_keepalive_timeout(),
            double_check_timeout_ms: default_double_check_timeout(),
            clear_timeout_ms: default_clear_timeout(),
            response_pending_wait_ms: default_response_pending_wait(),
            clear_settle_ms: default_clear_settle(),
            low_voltage_threshold: default_low_voltage_threshold(),
            double_check: default_true(),
            uds_enabled: default_true(),
            alternate_addressing: default_true(),
            status_masks: default_status_masks(),
        }
    }
}

impl ScanConfig {
    /// Reject configurations the orchestrator cannot run with
    pub fn validate(&self) -> ScanResult<()> {
        if self.uds_enabled && self.status_masks.is_empty() {
            return Err(ScanError::Config(
                "status_masks must not be empty when UDS is enabled".to_string(),
            ));
        }
        if self.low_voltage_threshold.is_nan() || self.low_voltage_threshold <= 0.0 {
            return Err(ScanError::Config(format!(
                "low_voltage_threshold must be positive, got {}",
                self.low_voltage_threshold
            )));
        }
        Ok(())
    }

    pub fn config_timeout(&self) -> Duration {
        Duration::from_millis(self.config_timeout_ms)
    }

    pub fn voltage_timeout(&self) -> Duration {
        Duration::from_millis(self.voltage_timeout_ms)
    }

    pub fn vin_timeout(&self) -> Duration {
        Duration::from_millis(self.vin_timeout_ms)
    }

    pub fn mode03_timeout(&self) -> Duration {
        Duration::from_millis(self.mode03_timeout_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn uds_timeout(&self) -> Duration {
        Duration::from_millis(self.uds_timeout_ms)
    }

    pub fn alternate_timeout(&self) -> Duration {
        Duration::from_millis(self.alternate_timeout_ms)
    }

    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_millis(self.keepalive_timeout_ms)
    }

    pub fn double_check_timeout(&self) -> Duration {
        Duration::from_millis(self.double_check_timeout_ms)
    }

    pub fn clear_timeout(&self) -> Duration {
        Duration::from_millis(self.clear_timeout_ms)
    }

    pub fn response_pending_wait(&self) -> Duration {
        Duration::from_millis(self.response_pending_wait_ms)
    }

    pub fn clear_settle(&self) -> Duration {
        Duration::from_millis(self.clear_settle_ms)
    }
}

fn default_config_timeout() -> u64 {
    2000
}

fn default_voltage_timeout() -> u64 {
    3000
}

fn default_vin_timeout() -> u64 {
    5000
}

fn default_mode03_timeout() -> u64 {
    10000
}

fn default_session_timeout() -> u64 {
    3000
}

fn default_uds_timeout() -> u64 {
    15000
}

fn default_alternate_timeout() -> u64 {
    5000
}

fn default_keepalive_timeout() -> u64 {
    2000
}

fn default_double_check_timeout() -> u64 {
    10000
}

fn default_clear_timeout() -> u64 {
    5000
}

fn default_response_pending_wait() -> u64 {
    500
}

fn default_clear_settle() -> u64 {
    2000
}

fn default_low_voltage_threshold() -> f32 {
    12.0
}

fn default_true() -> bool {
    true
}

fn default_status_masks() -> Vec<StatusMaskConfig> {
    vec![
        StatusMaskConfig::new(status_bit::CONFIRMED_DTC, "confirmed"),
        StatusMaskConfig::new(status_bit::PENDING_DTC, "pending"),
        StatusMaskConfig::new(status_bit::ALL_MASK, "all status bits"),
        StatusMaskConfig::new(status_bit::ACTIVE_MASK, "active (test failed + confirmed)"),
    ]
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Scripted transport for simulation and testing
    Mock(MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Mock(MockConfig::default())
    }
}

/// Scripted transport configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
    /// Start out disconnected
    #[serde(default)]
    pub disconnected: bool,
    /// Pretend a telemetry poller is running
    #[serde(default)]
    pub polling: bool,
    /// Scripted replies
    #[serde(default)]
    pub rules: Vec<MockRuleConfig>,
}

/// Scripted replies for one command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockRuleConfig {
    /// Only match while this header is selected (e.g. "7E0"); any header if absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    /// Command text (spaces and case are ignored)
    pub command: String,
    /// Replies in order, the last one repeating; `TIMEOUT` simulates no answer
    pub replies: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ElmdiagConfig::from_toml("").unwrap();
        assert_eq!(config.scan.mode03_timeout(), Duration::from_secs(10));
        assert_eq!(config.scan.uds_timeout(), Duration::from_secs(15));
        let masks: Vec<u8> = config.scan.status_masks.iter().map(|m| m.mask).collect();
        assert_eq!(masks, vec![0x08, 0x04, 0xFF, 0x09]);
        assert!(config.scan.double_check);
        assert!(matches!(config.transport, TransportConfig::Mock(_)));
    }

    #[test]
    fn test_parse_mock_rules() {
        let config = ElmdiagConfig::from_toml(
            r#"
            [scan]
            double_check = false
            low_voltage_threshold = 11.8

            [transport]
            type = "mock"
            latency_ms = 5

            [[transport.rules]]
            header = "7E0"
            command = "03"
            replies = ["7E8 04 43 01 03 00"]

            [[transport.rules]]
            command = "0902"
            replies = ["TIMEOUT"]
            "#,
        )
        .unwrap();

        assert!(!config.scan.double_check);
        let TransportConfig::Mock(mock) = config.transport;
        assert_eq!(mock.latency_ms, 5);
        assert_eq!(mock.rules.len(), 2);
        assert_eq!(mock.rules[0].header.as_deref(), Some("7E0"));
        assert!(mock.rules[1].header.is_none());
    }

    #[test]
    fn test_empty_mask_list_rejected() {
        let err = ElmdiagConfig::from_toml("[scan]\nstatus_masks = []\n").unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }
}
