//! Per-session state and scan results

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use elmdiag_core::{ScanSnapshot, ScanStep, SnapshotDiff, StepStatus, VerificationResult, VinInfo};
use serde::Serialize;

/// Shared cancellation signal, observed between phases
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Re-arm after a cancelled scan
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// State kept across scans of the same vehicle connection
#[derive(Debug, Default)]
pub struct ScanSession {
    vin: Option<VinInfo>,
    cancel: CancelFlag,
    last_snapshot_id: Option<String>,
    scans_completed: u32,
}

impl ScanSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a known VIN; the VIN phase is then skipped
    pub fn with_vin(mut self, vin: VinInfo) -> Self {
        self.vin = Some(vin);
        self
    }

    pub fn vin(&self) -> Option<&VinInfo> {
        self.vin.as_ref()
    }

    pub(crate) fn remember_vin(&mut self, vin: VinInfo) {
        self.vin = Some(vin);
    }

    /// Handle that can cancel a running scan from another task
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Id of the most recent snapshot saved in this session
    pub fn last_snapshot_id(&self) -> Option<&str> {
        self.last_snapshot_id.as_deref()
    }

    pub fn scans_completed(&self) -> u32 {
        self.scans_completed
    }

    pub(crate) fn record_completed(&mut self, snapshot_id: Option<String>) {
        self.scans_completed += 1;
        if snapshot_id.is_some() {
            self.last_snapshot_id = snapshot_id;
        }
    }
}

/// Terminal state of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    /// Finished without confirmed codes
    Clear,
    /// Finished with at least one confirmed code
    Errors,
    /// Did not complete; nothing was persisted
    Failed,
}

/// Everything a scan produced
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub state: ScanState,
    /// Step list at the time the scan ended
    pub steps: Vec<ScanStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<ScanSnapshot>,
    /// Id assigned by the store, when saving succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationResult>,
    /// Comparison with the previous stored scan
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<SnapshotDiff>,
    /// Measured supply voltage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f32>,
    /// Voltage was below the threshold; results may be noisy
    pub low_voltage: bool,
    /// Why the scan failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanOutcome {
    pub fn is_failed(&self) -> bool {
        self.state == ScanState::Failed
    }

    /// Step that was running when the scan failed
    pub fn failed_step(&self) -> Option<&ScanStep> {
        self.steps.iter().find(|s| s.status == StepStatus::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared() {
        let session = ScanSession::new();
        let flag = session.cancel_flag();
        assert!(!session.is_cancelled());

        flag.cancel();
        assert!(session.is_cancelled());

        flag.reset();
        assert!(!session.is_cancelled());
    }

    #[test]
    fn test_record_completed_keeps_last_id() {
        let mut session = ScanSession::new();
        session.record_completed(Some("a".to_string()));
        session.record_completed(None);
        assert_eq!(session.last_snapshot_id(), Some("a"));
        assert_eq!(session.scans_completed(), 2);
    }
}
