//! Scan command - full diagnostic scan

use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use elmdiag_core::{LogBuffer, ScanStore};
use elmdiag_engine::registry::identify_vehicle;
use elmdiag_engine::{CommandTransport, ScanConfig, ScanOutcome, ScanSession, ScanState, Scanner};

use super::diff::print_diff;
use crate::output::{DtcRow, OutputContext, OutputFormat};
use crate::progress::ProgressObserver;

/// What the user asked for besides the scan itself
pub struct ScanOptions<'a> {
    /// Skip the VIN read and use this one
    pub vin: Option<&'a str>,
    /// Print the adapter trace after the scan
    pub trace: bool,
}

/// Run one scan, store it and print the result
pub async fn scan(
    transport: Arc<dyn CommandTransport>,
    config: ScanConfig,
    store: Arc<dyn ScanStore>,
    options: ScanOptions<'_>,
    ctx: &OutputContext,
) -> Result<()> {
    let log = Arc::new(LogBuffer::new());
    let mut scanner = Scanner::new(transport, config)
        .with_store(store)
        .with_log(log.clone());

    let progress = ctx.interactive().then(|| Arc::new(ProgressObserver::new()));
    if let Some(progress) = &progress {
        scanner = scanner.with_observer(progress.clone());
    }

    let mut session = ScanSession::new();
    if let Some(vin) = options.vin {
        session = session.with_vin(identify_vehicle(vin));
    }

    let cancel = session.cancel_flag();
    ctrlc::set_handler(move || cancel.cancel())?;

    let outcome = scanner.scan(&mut session).await;
    if let Some(progress) = &progress {
        progress.finish();
    }

    if options.trace {
        for line in log.lines() {
            eprintln!("{}", line.dimmed());
        }
    }

    if ctx.format == OutputFormat::Json {
        ctx.print_json(&outcome);
    } else {
        print_outcome(&outcome, ctx);
    }

    match outcome.error {
        Some(error) => anyhow::bail!("Scan failed: {}", error),
        None => Ok(()),
    }
}

fn print_outcome(outcome: &ScanOutcome, ctx: &OutputContext) {
    if outcome.low_voltage {
        ctx.warn(&format!(
            "Battery voltage low ({}); results may include spurious codes",
            outcome
                .voltage
                .map(|v| format!("{:.1} V", v))
                .unwrap_or_else(|| "unknown".to_string())
        ));
    }

    let Some(snapshot) = &outcome.snapshot else {
        if let Some(step) = outcome.failed_step() {
            ctx.error(&format!("Stopped during: {}", step.label));
        }
        return;
    };

    if let Some(vin) = snapshot.vin() {
        ctx.info(&format!("{} ({})", vin.vin, vin.manufacturer));
    }
    ctx.info(&format!(
        "{} module(s) scanned in {:.1}s",
        snapshot.modules_scanned(),
        snapshot.duration_ms() as f64 / 1000.0
    ));

    match outcome.state {
        ScanState::Clear => ctx.success("No trouble codes"),
        ScanState::Errors => {
            let rows: Vec<DtcRow> = snapshot.dtcs().iter().map(DtcRow::from).collect();
            ctx.print(&rows);
        }
        ScanState::Failed => {}
    }

    if !snapshot.discarded().is_empty() {
        let codes: Vec<&str> = snapshot.discarded().iter().map(|d| d.code.as_str()).collect();
        ctx.info(&format!("Not confirmed on re-read: {}", codes.join(", ")));
    }

    if let Some(diff) = &outcome.diff {
        if diff.has_changes() {
            ctx.info("Changes since the previous scan:");
            print_diff(diff, ctx);
        }
    }
}
