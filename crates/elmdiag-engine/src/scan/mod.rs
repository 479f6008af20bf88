//! Scan orchestration
//!
//! [`Scanner`] drives the phase state machine; [`ModuleProbe`] holds the
//! per-module read strategy it uses; [`ScanSession`] carries what survives
//! between scans of one connection.

mod context;
mod orchestrator;
mod probe;

pub use context::{CancelFlag, ScanOutcome, ScanSession, ScanState};
pub use orchestrator::{next_phase, Scanner};
pub use probe::{ModuleProbe, ProbeReport};
