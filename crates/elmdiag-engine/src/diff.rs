//! Snapshot comparison

use elmdiag_core::{ScanSnapshot, SnapshotDiff};

/// Compare two snapshots by code alone
///
/// `previous` must be the older snapshot. Module attribution is ignored.
pub fn diff_snapshots(previous: &ScanSnapshot, current: &ScanSnapshot) -> SnapshotDiff {
    let before = previous.codes();
    let after = current.codes();
    SnapshotDiff {
        new: after.difference(&before).cloned().collect(),
        resolved: before.difference(&after).cloned().collect(),
        persistent: after.intersection(&before).cloned().collect(),
    }
}
