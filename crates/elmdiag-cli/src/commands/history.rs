//! History command - list stored scans

use anyhow::Result;
use elmdiag_engine::JsonFileScanStore;

use crate::output::{HistoryRow, OutputContext};

/// Show the most recent scans, newest first
pub async fn history(store: &JsonFileScanStore, limit: usize, ctx: &OutputContext) -> Result<()> {
    let scans = store.load_all().await?;
    if scans.is_empty() {
        ctx.info(&format!("No scans in {}", store.path().display()));
        return Ok(());
    }

    let rows: Vec<HistoryRow> = scans
        .iter()
        .rev()
        .take(limit)
        .map(|s| HistoryRow::new(&s.id, &s.snapshot))
        .collect();
    ctx.print(&rows);
    Ok(())
}
