//! Scan state machine
//!
//! Phases run strictly one after another; [`next_phase`] is the only place
//! that decides what runs next. Per-command failures are absorbed by the
//! phases. An unavailable transport, cancellation, or a vehicle where no
//! standard module answers ends a scan early, in which case nothing is
//! persisted and the adapter is left as is.

use std::sync::Arc;
use std::time::Instant;

use elmdiag_core::{
    DiffNotifier, EcuModule, NoopObserver, ParsedDtc, ScanLog, ScanObserver, ScanPhase, ScanSnapshot,
    ScanStep, ScanStore, SnapshotDiff, StepStatus, VerificationResult, VinInfo,
};
use tracing::{debug, info, warn};

use super::context::{CancelFlag, ScanOutcome, ScanSession, ScanState};
use super::probe::ModuleProbe;
use crate::codec::{
    decode_adapter_voltage, decode_module_voltage, decode_vin, service_id, PID_MODULE_VOLTAGE,
    PID_VIN,
};
use crate::config::ScanConfig;
use crate::diff::diff_snapshots;
use crate::elm::{at, ElmAdapter};
use crate::error::{ScanError, ScanResult};
use crate::registry::{alternate_addresses, identify_vehicle, standard_modules};
use crate::transport::CommandTransport;
use crate::uds::request;
use crate::verify::double_check;

/// Phase that follows `phase`, given what the scan has collected so far
///
/// Verification is skipped when nothing was found.
pub fn next_phase(phase: ScanPhase, has_findings: bool) -> Option<ScanPhase> {
    match phase {
        ScanPhase::Bluetooth => Some(ScanPhase::Pause),
        ScanPhase::Pause => Some(ScanPhase::Voltage),
        ScanPhase::Voltage => Some(ScanPhase::Vin),
        ScanPhase::Vin => Some(ScanPhase::Config),
        ScanPhase::Config => Some(ScanPhase::Protocol),
        ScanPhase::Protocol => Some(ScanPhase::Modules),
        ScanPhase::Modules => Some(ScanPhase::Alternative),
        ScanPhase::Alternative => Some(ScanPhase::Deduplicate),
        ScanPhase::Deduplicate if has_findings => Some(ScanPhase::Verify),
        ScanPhase::Deduplicate => Some(ScanPhase::Reset),
        ScanPhase::Verify => Some(ScanPhase::Reset),
        ScanPhase::Reset => Some(ScanPhase::Process),
        ScanPhase::Process => None,
    }
}

/// Runs diagnostic scans against one adapter
pub struct Scanner {
    elm: ElmAdapter,
    config: ScanConfig,
    store: Option<Arc<dyn ScanStore>>,
    observer: Arc<dyn ScanObserver>,
    notifier: Option<Arc<dyn DiffNotifier>>,
}

impl Scanner {
    pub fn new(transport: Arc<dyn CommandTransport>, config: ScanConfig) -> Self {
        Self {
            elm: ElmAdapter::new(transport),
            config,
            store: None,
            observer: Arc::new(NoopObserver),
            notifier: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ScanStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn DiffNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Mirror trace lines into an audit log
    pub fn with_log(mut self, log: Arc<dyn ScanLog>) -> Self {
        self.elm = self.elm.with_log(log);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Adapter command layer, for operations outside a scan (e.g. clearing)
    pub fn adapter(&self) -> &ElmAdapter {
        &self.elm
    }

    /// Run one complete scan
    pub async fn scan(&self, session: &mut ScanSession) -> ScanOutcome {
        let mut run = ScanRun::new(self, session.cancel_flag());
        let mut phase = Some(ScanPhase::Bluetooth);

        while let Some(current) = phase {
            if run.cancel.is_cancelled() {
                info!(phase = %current, "Scan cancelled");
                run.set_status(current, StepStatus::Error);
                return run.failed(ScanError::Cancelled);
            }

            run.set_status(current, StepStatus::Running);
            match run.execute(current, session).await {
                Ok(()) => {
                    run.set_status(current, StepStatus::Done);
                    phase = next_phase(current, !run.findings.is_empty());
                    if phase == Some(ScanPhase::Reset) && current == ScanPhase::Deduplicate {
                        self.elm.trace("No codes found, skipping double-check");
                        run.set_status(ScanPhase::Verify, StepStatus::Done);
                    }
                }
                Err(e) => {
                    warn!(phase = %current, error = %e, "Scan aborted");
                    run.set_status(current, StepStatus::Error);
                    return run.failed(e);
                }
            }
        }

        session.record_completed(run.snapshot_id.clone());
        run.finished()
    }
}

/// Working set of a single scan
struct ScanRun<'s> {
    scanner: &'s Scanner,
    cancel: CancelFlag,
    steps: Vec<ScanStep>,
    started: Instant,
    voltage: Option<f32>,
    low_voltage: bool,
    vin: Option<VinInfo>,
    findings: Vec<ParsedDtc>,
    modules_scanned: u32,
    modules_responded: u32,
    verification: Option<VerificationResult>,
    snapshot: Option<ScanSnapshot>,
    snapshot_id: Option<String>,
    diff: Option<SnapshotDiff>,
}

impl<'s> ScanRun<'s> {
    fn new(scanner: &'s Scanner, cancel: CancelFlag) -> Self {
        let steps = ScanStep::all_pending();
        for step in &steps {
            scanner.observer.on_step(step);
        }
        Self {
            scanner,
            cancel,
            steps,
            started: Instant::now(),
            voltage: None,
            low_voltage: false,
            vin: None,
            findings: Vec::new(),
            modules_scanned: 0,
            modules_responded: 0,
            verification: None,
            snapshot: None,
            snapshot_id: None,
            diff: None,
        }
    }

    fn elm(&self) -> &'s ElmAdapter {
        &self.scanner.elm
    }

    fn config(&self) -> &'s ScanConfig {
        &self.scanner.config
    }

    fn set_status(&mut self, phase: ScanPhase, status: StepStatus) {
        if let Some(step) = self.steps.iter_mut().find(|s| s.phase == phase) {
            step.status = status;
            self.scanner.observer.on_step(step);
        }
    }

    async fn execute(&mut self, phase: ScanPhase, session: &mut ScanSession) -> ScanResult<()> {
        debug!(%phase, "Entering phase");
        match phase {
            ScanPhase::Bluetooth => self.check_connection().await,
            ScanPhase::Pause => {
                self.pause_polling().await;
                Ok(())
            }
            ScanPhase::Voltage => {
                self.check_voltage().await;
                Ok(())
            }
            ScanPhase::Vin => {
                self.read_vin(session).await;
                Ok(())
            }
            ScanPhase::Config => {
                let failures = self.elm().configure(self.config()).await;
                if failures > 0 {
                    self.elm()
                        .trace(&format!("{} configuration command(s) failed", failures));
                }
                Ok(())
            }
            ScanPhase::Protocol => {
                self.elm().ensure_can_protocol(self.config()).await;
                Ok(())
            }
            ScanPhase::Modules => self.scan_modules().await,
            ScanPhase::Alternative => self.scan_alternate_addresses().await,
            ScanPhase::Deduplicate => {
                self.deduplicate();
                Ok(())
            }
            ScanPhase::Verify => {
                self.verify().await;
                Ok(())
            }
            ScanPhase::Reset => {
                let failures = self.elm().reset(self.config()).await;
                if failures > 0 {
                    self.elm()
                        .trace(&format!("Adapter reset incomplete ({} command(s) failed)", failures));
                }
                Ok(())
            }
            ScanPhase::Process => {
                self.process().await;
                Ok(())
            }
        }
    }

    async fn check_connection(&self) -> ScanResult<()> {
        if self.elm().transport().is_connected().await {
            Ok(())
        } else {
            Err(ScanError::TransportUnavailable(
                "adapter not connected".to_string(),
            ))
        }
    }

    /// Checked before each module so a long phase stops promptly
    async fn ensure_can_continue(&self, module: &EcuModule) -> ScanResult<()> {
        if self.cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        if !self.elm().transport().is_connected().await {
            return Err(ScanError::TransportUnavailable(format!(
                "adapter disconnected before {}",
                module.short_name
            )));
        }
        Ok(())
    }

    async fn pause_polling(&self) {
        let transport = self.elm().transport();
        if transport.is_polling() {
            transport.stop_polling().await;
            self.elm().trace("Live data polling paused");
        }
    }

    async fn check_voltage(&mut self) {
        let timeout = self.config().voltage_timeout();
        let pid = request(&[service_id::OBD_CURRENT_DATA, PID_MODULE_VOLTAGE]);
        let mut voltage = match self.elm().send(&pid, timeout).await {
            Ok(text) => decode_module_voltage(&text),
            Err(e) => {
                debug!(error = %e, "Module voltage read failed");
                None
            }
        };
        if voltage.is_none() {
            voltage = match self.elm().send(at::READ_VOLTAGE, timeout).await {
                Ok(text) => decode_adapter_voltage(&text),
                Err(_) => None,
            };
        }

        match voltage {
            Some(volts) => {
                self.voltage = Some(volts);
                if volts < self.config().low_voltage_threshold {
                    self.low_voltage = true;
                    self.elm().trace(&format!(
                        "Low voltage: {:.1} V (below {:.1} V), results may be unreliable",
                        volts,
                        self.config().low_voltage_threshold
                    ));
                } else {
                    self.elm().trace(&format!("Voltage {:.1} V", volts));
                }
            }
            None => self.elm().trace("Voltage unavailable"),
        }
    }

    async fn read_vin(&mut self, session: &mut ScanSession) {
        if let Some(known) = session.vin() {
            self.elm().trace(&format!("VIN {} (cached)", known.vin));
            self.vin = Some(known.clone());
            return;
        }

        let command = request(&[service_id::OBD_VEHICLE_INFO, PID_VIN]);
        let vin = match self.elm().send(&command, self.config().vin_timeout()).await {
            Ok(text) => decode_vin(&text),
            Err(e) => {
                debug!(error = %e, "VIN read failed");
                None
            }
        };

        match vin {
            Some(vin) => {
                let info = identify_vehicle(&vin);
                self.elm().trace(&format!(
                    "VIN {} ({}, group {})",
                    info.vin, info.manufacturer, info.group
                ));
                session.remember_vin(info.clone());
                self.vin = Some(info);
            }
            None => self
                .elm()
                .trace("VIN unavailable, using standard addresses only"),
        }
    }

    async fn scan_modules(&mut self) -> ScanResult<()> {
        let modules = standard_modules();
        let probe = ModuleProbe::new(self.elm(), self.config());

        for (index, module) in modules.iter().enumerate() {
            self.ensure_can_continue(module).await?;
            self.scanner.observer.on_module(module, index, modules.len());

            let report = probe.full(module).await;
            self.modules_scanned += 1;
            if report.responded {
                self.modules_responded += 1;
            }
            debug!(
                module = %module.id,
                responded = report.responded,
                findings = report.findings.len(),
                "Module probed"
            );
            for dtc in report.findings {
                self.scanner.observer.on_finding(&dtc);
                self.findings.push(dtc);
            }
        }

        self.elm().trace(&format!(
            "{} of {} module(s) answered",
            self.modules_responded,
            modules.len()
        ));
        if self.modules_responded == 0 {
            // An empty read here means no link to the vehicle, not a clean one
            return Err(ScanError::NoResponse(format!(
                "{} standard module(s) queried, none answered",
                modules.len()
            )));
        }
        Ok(())
    }

    async fn scan_alternate_addresses(&mut self) -> ScanResult<()> {
        if !self.config().alternate_addressing || !self.config().uds_enabled {
            return Ok(());
        }
        let group = self.vin.as_ref().map(|v| v.group).unwrap_or_default();
        let modules = alternate_addresses(group);
        if modules.is_empty() {
            return Ok(());
        }

        self.elm()
            .trace(&format!("Probing {} {} address(es)", modules.len(), group));
        let probe = ModuleProbe::new(self.elm(), self.config());
        for (index, module) in modules.iter().enumerate() {
            self.ensure_can_continue(module).await?;
            self.scanner.observer.on_module(module, index, modules.len());

            let report = probe.light(module).await;
            self.modules_scanned += 1;
            if report.responded {
                self.modules_responded += 1;
            }
            for dtc in report.findings {
                if self.findings.iter().any(|d| d.code == dtc.code) {
                    continue;
                }
                self.scanner.observer.on_finding(&dtc);
                self.findings.push(dtc);
            }
        }
        Ok(())
    }

    fn deduplicate(&mut self) {
        let before = self.findings.len();
        let mut unique: Vec<ParsedDtc> = Vec::with_capacity(before);
        for dtc in self.findings.drain(..) {
            if !unique.iter().any(|d| d.code == dtc.code) {
                unique.push(dtc);
            }
        }
        self.findings = unique;
        let removed = before - self.findings.len();
        if removed > 0 {
            self.elm()
                .trace(&format!("Removed {} duplicate code(s)", removed));
        }
    }

    async fn verify(&mut self) {
        let result = if self.config().double_check {
            double_check(self.elm(), self.config(), &self.findings).await
        } else {
            VerificationResult {
                confirmed: self.findings.clone(),
                discarded: Vec::new(),
            }
        };
        self.verification = Some(result);
    }

    async fn process(&mut self) {
        let first_pass = ScanSnapshot::new(
            self.vin.clone(),
            self.findings.clone(),
            self.modules_scanned,
            self.started.elapsed(),
        )
        .with_low_voltage(self.low_voltage);
        let snapshot = match &self.verification {
            Some(result) => first_pass.verified(result),
            None => first_pass,
        };

        if let Some(store) = &self.scanner.store {
            match store.recent_scans(1).await {
                Ok(previous) => {
                    self.diff = previous.first().map(|p| diff_snapshots(p, &snapshot));
                }
                Err(e) => warn!(error = %e, "Could not load previous scan"),
            }

            match store.save_scan(&snapshot).await {
                Ok(id) => {
                    debug!(%id, "Snapshot saved");
                    self.snapshot_id = Some(id);
                }
                Err(e) => {
                    warn!(error = %e, "Could not save scan");
                    self.elm().trace(&format!("Saving scan failed: {}", e));
                }
            }
        }

        if let (Some(diff), Some(notifier)) = (&self.diff, &self.scanner.notifier) {
            if diff.has_changes() {
                notifier.notify(diff);
            }
        }

        self.elm().trace(&format!(
            "Scan complete: {} code(s) across {} module(s) in {} ms",
            snapshot.dtcs().len(),
            snapshot.modules_scanned(),
            snapshot.duration_ms()
        ));
        self.snapshot = Some(snapshot);
    }

    fn failed(self, error: ScanError) -> ScanOutcome {
        self.elm().trace(&format!("Scan failed: {}", error));
        ScanOutcome {
            state: ScanState::Failed,
            steps: self.steps,
            snapshot: None,
            snapshot_id: None,
            verification: None,
            diff: None,
            voltage: self.voltage,
            low_voltage: self.low_voltage,
            error: Some(error.to_string()),
        }
    }

    fn finished(self) -> ScanOutcome {
        let state = match &self.snapshot {
            Some(snapshot) if snapshot.dtcs().is_empty() => ScanState::Clear,
            Some(_) => ScanState::Errors,
            None => ScanState::Failed,
        };
        info!(?state, "Scan finished");
        ScanOutcome {
            state,
            steps: self.steps,
            snapshot: self.snapshot,
            snapshot_id: self.snapshot_id,
            verification: self.verification,
            diff: self.diff,
            voltage: self.voltage,
            low_voltage: self.low_voltage,
            error: None,
        }
    }
}
