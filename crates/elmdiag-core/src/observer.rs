//! Progress, audit-log and notification collaborators

use parking_lot::Mutex;

use crate::models::{EcuModule, ParsedDtc, ScanStep, SnapshotDiff};

/// Receives progress while a scan runs
///
/// Every method has an empty default so observers implement only what they
/// render. The engine never depends on an observer being present.
pub trait ScanObserver: Send + Sync {
    /// A step changed status
    fn on_step(&self, _step: &ScanStep) {}

    /// Probing of `module` is about to start (`index` is zero-based)
    fn on_module(&self, _module: &EcuModule, _index: usize, _total: usize) {}

    /// A code was collected during the module loop
    fn on_finding(&self, _dtc: &ParsedDtc) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ScanObserver for NoopObserver {}

/// Append-only human readable trace
pub trait ScanLog: Send + Sync {
    fn add_log(&self, message: &str);
}

/// In-memory [`ScanLog`] used for audit capture and tests
#[derive(Debug, Default)]
pub struct LogBuffer {
    lines: Mutex<Vec<String>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every line logged so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|l| l.contains(needle))
    }
}

impl ScanLog for LogBuffer {
    fn add_log(&self, message: &str) {
        self.lines.lock().push(message.to_string());
    }
}

/// Told when a scan's codes differ from the previous scan
pub trait DiffNotifier: Send + Sync {
    fn notify(&self, diff: &SnapshotDiff);
}
