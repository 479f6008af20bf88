//! Wire-format codec
//!
//! Everything that looks at adapter text lives here. Callers get typed
//! results ([`ServiceReply`], [`DtcRead`]) and never match on substrings.
//! Nothing in this module returns an error: unusable input maps to an
//! `Invalid`/`Unusable` variant and the caller decides what to do next.

mod dtc;
mod nrc;
mod response;
mod vehicle;

pub use dtc::{
    decode_dtc_bytes, decode_mode03, decode_uds_dtcs, encode_dtc,
    encode_mode03_response, DtcRead,
};
pub use nrc::{NegativeResponseCode, NrcAction};
pub use response::{
    parse_reply, AdapterResponse, Message, NegativeResponse, ServiceReply, NEGATIVE_RESPONSE,
    POSITIVE_RESPONSE_OFFSET,
};
pub use vehicle::{
    decode_adapter_voltage, decode_module_voltage, decode_vin, PID_MODULE_VOLTAGE, PID_VIN,
};

/// Service identifiers used by the scanner (OBD-II modes and UDS services)
pub mod service_id {
    /// OBD-II Mode 01: current powertrain data
    pub const OBD_CURRENT_DATA: u8 = 0x01;
    /// OBD-II Mode 03: stored trouble codes
    pub const OBD_STORED_DTCS: u8 = 0x03;
    /// OBD-II Mode 04: clear trouble codes
    pub const OBD_CLEAR_DTCS: u8 = 0x04;
    /// OBD-II Mode 09: vehicle information
    pub const OBD_VEHICLE_INFO: u8 = 0x09;
    /// UDS DiagnosticSessionControl
    pub const DIAGNOSTIC_SESSION_CONTROL: u8 = 0x10;
    /// UDS ClearDiagnosticInformation
    pub const CLEAR_DIAGNOSTIC_INFORMATION: u8 = 0x14;
    /// UDS ReadDTCInformation
    pub const READ_DTC_INFORMATION: u8 = 0x19;
    /// UDS TesterPresent
    pub const TESTER_PRESENT: u8 = 0x3E;
}

/// Sub-functions and parameters used with the UDS services above
pub mod sub_function {
    /// 0x10: default session
    pub const DEFAULT_SESSION: u8 = 0x01;
    /// 0x10: extended diagnostic session
    pub const EXTENDED_SESSION: u8 = 0x03;
    /// 0x19: report DTCs matching a status mask
    pub const REPORT_DTC_BY_STATUS_MASK: u8 = 0x02;
    /// 0x3E: tester present, response required
    pub const TESTER_PRESENT_ZERO: u8 = 0x00;
    /// 0x14: every DTC group
    pub const ALL_DTC_GROUPS: u32 = 0xFF_FFFF;
}
