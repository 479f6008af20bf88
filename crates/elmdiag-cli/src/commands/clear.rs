//! Clear command - erase stored codes and read back what survives

use std::sync::Arc;

use anyhow::Result;
use elmdiag_engine::{clear_codes, CommandTransport, ElmAdapter, ScanConfig};

use crate::output::{DtcRow, OutputContext, OutputFormat};

/// Clear codes over Mode 04 and UDS 0x14
pub async fn clear(
    transport: Arc<dyn CommandTransport>,
    config: &ScanConfig,
    ctx: &OutputContext,
) -> Result<()> {
    let elm = ElmAdapter::new(transport);
    ctx.info("Clearing stored codes...");
    let outcome = clear_codes(&elm, config).await?;

    if ctx.format == OutputFormat::Json {
        ctx.print_json(&outcome);
    } else {
        ctx.print_kv(&[
            ("OBD (Mode 04)", yes_no(outcome.obd_cleared)),
            ("UDS (0x14)", yes_no(outcome.uds_cleared)),
            (
                "UDS rejection",
                outcome.uds_rejection.clone().unwrap_or_else(|| "-".to_string()),
            ),
        ]);
        if !outcome.persistent.is_empty() {
            ctx.warn(&format!(
                "{} code(s) came back immediately; the fault is still present",
                outcome.persistent.len()
            ));
            let rows: Vec<DtcRow> = outcome.persistent.iter().map(DtcRow::from).collect();
            ctx.print(&rows);
        }
    }

    if outcome.success() {
        ctx.success("Codes cleared");
        Ok(())
    } else {
        anyhow::bail!("No clear request was acknowledged")
    }
}

fn yes_no(value: bool) -> String {
    if value { "Yes" } else { "No" }.to_string()
}
