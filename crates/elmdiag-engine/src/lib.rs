//! elmdiag-engine - Diagnostic scan engine for ELM327-style adapters
//!
//! Reads trouble codes from every reachable ECU over OBD-II Mode 03 and
//! UDS 0x19, confirms them with a second read, persists the result and
//! reports what changed since the previous scan. Clearing codes (Mode 04
//! plus UDS 0x14) is a separate operation on the same adapter layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Scanner                             │
//! │  Phase state machine, one scan at a time per session        │
//! │                                                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐ │
//! │  │ registry    │  │ ModuleProbe │  │ verify / diff      │ │
//! │  │ (addresses) │  │ (03 + 19)   │  │ (double-check)     │ │
//! │  └─────────────┘  └──────┬──────┘  └─────────────────────┘ │
//! │                          │                                  │
//! │                    ┌─────┴─────┐      ┌─────────────────┐   │
//! │                    │ UdsClient │      │ codec           │   │
//! │                    │ (0x10/19) │      │ (frames, DTCs)  │   │
//! │                    └─────┬─────┘      └─────────────────┘   │
//! │                          │                                  │
//! │                    ┌─────┴──────┐                           │
//! │                    │ ElmAdapter │                           │
//! │                    │ (AT layer) │                           │
//! │                    └─────┬──────┘                           │
//! │                          │                                  │
//! │                 ┌────────┴─────────┐                        │
//! │                 │ CommandTransport │                        │
//! │                 │ (BLE/serial/mock)│                        │
//! │                 └──────────────────┘                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod clear;
pub mod codec;
pub mod config;
pub mod diff;
pub mod elm;
pub mod error;
pub mod registry;
pub mod scan;
pub mod store;
pub mod transport;
pub mod uds;
pub mod verify;

pub use clear::clear_codes;
pub use config::{ElmdiagConfig, ScanConfig, StatusMaskConfig, TransportConfig};
pub use diff::diff_snapshots;
pub use elm::ElmAdapter;
pub use error::{ScanError, ScanResult};
pub use scan::{CancelFlag, ScanOutcome, ScanSession, ScanState, Scanner};
pub use store::{InMemoryScanStore, JsonFileScanStore, StoredScan};
pub use transport::{create_transport, CommandTransport, MockTransport, TransportError};
pub use verify::double_check;

// Re-export for convenience
pub use elmdiag_core::{
    ClearOutcome, DtcCode, EcuModule, ParsedDtc, ScanObserver, ScanSnapshot, ScanStore,
    SnapshotDiff, VerificationResult,
};
