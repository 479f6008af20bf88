//! Data model for scan results and the entities they refer to

mod dtc;
mod ecu;
mod scan;
mod vehicle;

pub use dtc::{status_bit, DtcCode, DtcSource, DtcStatus, ParsedDtc};
pub use ecu::{CanHeader, EcuCategory, EcuModule};
pub use scan::{
    ClearOutcome, ScanPhase, ScanSnapshot, ScanStep, SnapshotDiff, StepStatus,
    VerificationResult,
};
pub use vehicle::{ManufacturerGroup, VinInfo};
