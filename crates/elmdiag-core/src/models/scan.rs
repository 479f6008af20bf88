//! Scan progress and result models

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dtc::{DtcCode, ParsedDtc};
use super::vehicle::VinInfo;

/// Orchestrator phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Bluetooth,
    Pause,
    Voltage,
    Vin,
    Config,
    Protocol,
    Modules,
    Alternative,
    Deduplicate,
    Verify,
    Reset,
    Process,
}

impl ScanPhase {
    pub const ALL: [ScanPhase; 12] = [
        Self::Bluetooth,
        Self::Pause,
        Self::Voltage,
        Self::Vin,
        Self::Config,
        Self::Protocol,
        Self::Modules,
        Self::Alternative,
        Self::Deduplicate,
        Self::Verify,
        Self::Reset,
        Self::Process,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Self::Bluetooth => "bluetooth",
            Self::Pause => "pause",
            Self::Voltage => "voltage",
            Self::Vin => "vin",
            Self::Config => "config",
            Self::Protocol => "protocol",
            Self::Modules => "modules",
            Self::Alternative => "alternative",
            Self::Deduplicate => "deduplicate",
            Self::Verify => "verify",
            Self::Reset => "reset",
            Self::Process => "process",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Bluetooth => "Checking adapter connection",
            Self::Pause => "Pausing live data",
            Self::Voltage => "Checking battery voltage",
            Self::Vin => "Reading VIN",
            Self::Config => "Configuring adapter",
            Self::Protocol => "Detecting bus protocol",
            Self::Modules => "Scanning modules",
            Self::Alternative => "Probing manufacturer addresses",
            Self::Deduplicate => "Removing duplicates",
            Self::Verify => "Double-checking codes",
            Self::Reset => "Resetting adapter",
            Self::Process => "Saving results",
        }
    }
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Done,
    Error,
}

/// Progress entry for one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStep {
    pub phase: ScanPhase,
    pub label: String,
    pub status: StepStatus,
}

impl ScanStep {
    pub fn pending(phase: ScanPhase) -> Self {
        Self {
            phase,
            label: phase.label().to_string(),
            status: StepStatus::Pending,
        }
    }

    /// Fresh step list covering every phase
    pub fn all_pending() -> Vec<ScanStep> {
        ScanPhase::ALL.iter().copied().map(Self::pending).collect()
    }
}

/// Immutable output of one scan
///
/// Corrections (double-check) build a new snapshot via [`ScanSnapshot::verified`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vin: Option<VinInfo>,
    dtcs: Vec<ParsedDtc>,
    /// Codes dropped by double-check, kept for audit
    #[serde(default)]
    discarded: Vec<ParsedDtc>,
    modules_scanned: u32,
    duration_ms: u64,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    low_voltage: bool,
}

impl ScanSnapshot {
    pub fn new(
        vin: Option<VinInfo>,
        dtcs: Vec<ParsedDtc>,
        modules_scanned: u32,
        duration: Duration,
    ) -> Self {
        Self {
            vin,
            dtcs,
            discarded: Vec::new(),
            modules_scanned,
            duration_ms: duration.as_millis() as u64,
            timestamp: Utc::now(),
            low_voltage: false,
        }
    }

    /// Mark results as taken below the voltage threshold
    pub fn with_low_voltage(mut self, low_voltage: bool) -> Self {
        self.low_voltage = low_voltage;
        self
    }

    /// New snapshot holding only the confirmed findings of `result`
    pub fn verified(&self, result: &VerificationResult) -> Self {
        let mut discarded = self.discarded.clone();
        discarded.extend(result.discarded.iter().cloned());
        Self {
            dtcs: result.confirmed.clone(),
            discarded,
            ..self.clone()
        }
    }

    pub fn vin(&self) -> Option<&VinInfo> {
        self.vin.as_ref()
    }

    pub fn dtcs(&self) -> &[ParsedDtc] {
        &self.dtcs
    }

    pub fn discarded(&self) -> &[ParsedDtc] {
        &self.discarded
    }

    pub fn modules_scanned(&self) -> u32 {
        self.modules_scanned
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn low_voltage(&self) -> bool {
        self.low_voltage
    }

    /// Distinct codes, ignoring module attribution
    pub fn codes(&self) -> BTreeSet<DtcCode> {
        self.dtcs.iter().map(|d| d.code.clone()).collect()
    }
}

/// Code-level comparison of two snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    /// In the current snapshot only
    pub new: BTreeSet<DtcCode>,
    /// In the previous snapshot only
    pub resolved: BTreeSet<DtcCode>,
    /// In both
    pub persistent: BTreeSet<DtcCode>,
}

impl SnapshotDiff {
    /// True when codes appeared or disappeared
    pub fn has_changes(&self) -> bool {
        !self.new.is_empty() || !self.resolved.is_empty()
    }
}

/// Outcome of the double-check pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub confirmed: Vec<ParsedDtc>,
    pub discarded: Vec<ParsedDtc>,
}

/// Outcome of a clear-codes request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearOutcome {
    /// Mode 04 acknowledged (or nothing to clear)
    pub obd_cleared: bool,
    /// UDS 0x14 acknowledged (or nothing to clear)
    pub uds_cleared: bool,
    /// Reason given by a UDS negative response, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uds_rejection: Option<String>,
    /// Codes still reported by the verification read
    pub persistent: Vec<ParsedDtc>,
}

impl ClearOutcome {
    pub fn success(&self) -> bool {
        self.obd_cleared || self.uds_cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DtcSource, ParsedDtc};

    fn dtc(code: &str) -> ParsedDtc {
        ParsedDtc::new(DtcCode::parse(code).unwrap(), &code[1..], DtcSource::Obd)
    }

    #[test]
    fn test_steps_follow_phase_order() {
        let steps = ScanStep::all_pending();
        assert_eq!(steps.len(), 12);
        assert_eq!(steps[0].phase, ScanPhase::Bluetooth);
        assert_eq!(steps[11].phase, ScanPhase::Process);
        assert!(steps.iter().all(|s| s.status == StepStatus::Pending));
    }

    #[test]
    fn test_verified_builds_new_snapshot() {
        let original = ScanSnapshot::new(
            None,
            vec![dtc("P0101"), dtc("P0300")],
            12,
            Duration::from_millis(4200),
        );
        let result = VerificationResult {
            confirmed: vec![dtc("P0300")],
            discarded: vec![dtc("P0101")],
        };

        let verified = original.verified(&result);

        assert_eq!(original.dtcs().len(), 2);
        assert_eq!(verified.dtcs().len(), 1);
        assert_eq!(verified.discarded()[0].code.as_str(), "P0101");
        assert_eq!(verified.modules_scanned(), 12);
        assert_eq!(verified.timestamp(), original.timestamp());
    }

    #[test]
    fn test_snapshot_json_roundtrip() {
        let snapshot = ScanSnapshot::new(None, vec![dtc("U0100")], 3, Duration::from_secs(1))
            .with_low_voltage(true);
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: ScanSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
