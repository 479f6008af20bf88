//! Persistence contract for scan snapshots

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::models::ScanSnapshot;

/// Storage for finished scans
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Persist a snapshot and return its identifier
    async fn save_scan(&self, snapshot: &ScanSnapshot) -> CoreResult<String>;

    /// Up to `count` most recent snapshots, newest first
    async fn recent_scans(&self, count: usize) -> CoreResult<Vec<ScanSnapshot>>;
}
