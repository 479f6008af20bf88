//! Diff command - compare two scans

use std::path::Path;

use anyhow::{Context, Result};
use elmdiag_core::{ScanSnapshot, ScanStore, SnapshotDiff};
use elmdiag_engine::{diff_snapshots, JsonFileScanStore};

use crate::output::{ChangeRow, OutputContext, OutputFormat};

/// Compare two snapshot files, or the two latest scans in the history
pub async fn diff(
    store: &JsonFileScanStore,
    files: Option<(&Path, &Path)>,
    ctx: &OutputContext,
) -> Result<()> {
    let (previous, current) = match files {
        Some((previous, current)) => (read_snapshot(previous)?, read_snapshot(current)?),
        None => {
            let mut recent = store.recent_scans(2).await?;
            if recent.len() < 2 {
                ctx.info("Need at least two stored scans to compare");
                return Ok(());
            }
            let current = recent.remove(0);
            (recent.remove(0), current)
        }
    };

    print_diff(&diff_snapshots(&previous, &current), ctx);
    Ok(())
}

fn read_snapshot(path: &Path) -> Result<ScanSnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse snapshot: {}", path.display()))
}

/// Rows in new, resolved, persistent order
pub fn change_rows(diff: &SnapshotDiff) -> Vec<ChangeRow> {
    let sections = [
        ("new", &diff.new),
        ("resolved", &diff.resolved),
        ("persistent", &diff.persistent),
    ];
    sections
        .into_iter()
        .flat_map(|(change, codes)| {
            codes.iter().map(move |code| ChangeRow {
                change: change.to_string(),
                code: code.to_string(),
            })
        })
        .collect()
}

pub fn print_diff(diff: &SnapshotDiff, ctx: &OutputContext) {
    if ctx.format == OutputFormat::Json {
        ctx.print_json(diff);
        return;
    }
    if !diff.has_changes() {
        ctx.info("No changes since the previous scan");
    }
    ctx.print(&change_rows(diff));
}

#[cfg(test)]
mod tests {
    use super::*;
    use elmdiag_core::{DtcCode, DtcSource, ParsedDtc};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::TempDir;

    fn snapshot(codes: &[&str]) -> ScanSnapshot {
        let dtcs = codes
            .iter()
            .map(|c| ParsedDtc::new(DtcCode::parse(c).unwrap(), &c[1..], DtcSource::Obd))
            .collect();
        ScanSnapshot::new(None, dtcs, 10, Duration::from_secs(20))
    }

    #[test]
    fn test_rows_are_grouped_by_change() {
        let diff = diff_snapshots(&snapshot(&["P0101", "P0300"]), &snapshot(&["P0300", "P0420"]));
        let rows: Vec<(String, String)> = change_rows(&diff)
            .into_iter()
            .map(|r| (r.change, r.code))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("new".to_string(), "P0420".to_string()),
                ("resolved".to_string(), "P0101".to_string()),
                ("persistent".to_string(), "P0300".to_string()),
            ]
        );
    }

    #[test]
    fn test_snapshot_files_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan.json");
        let original = snapshot(&["B1234"]);
        std::fs::write(&path, serde_json::to_string(&original).unwrap()).unwrap();

        assert_eq!(read_snapshot(&path).unwrap(), original);
        assert!(read_snapshot(&dir.path().join("missing.json")).is_err());
    }
}
