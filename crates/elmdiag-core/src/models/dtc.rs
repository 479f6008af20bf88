//! Diagnostic trouble codes as produced by the codec

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ecu::{EcuCategory, EcuModule};
use crate::error::CoreError;

/// DTC status byte bit definitions per ISO 14229-1
pub mod status_bit {
    /// Bit 0: Test Failed - DTC test failed at the time of the request
    pub const TEST_FAILED: u8 = 0x01;
    /// Bit 1: Test Failed This Operation Cycle
    pub const TEST_FAILED_THIS_OPERATION_CYCLE: u8 = 0x02;
    /// Bit 2: Pending DTC - Test failed but not yet confirmed
    pub const PENDING_DTC: u8 = 0x04;
    /// Bit 3: Confirmed DTC - Malfunction confirmed and stored
    pub const CONFIRMED_DTC: u8 = 0x08;
    /// Bit 4: Test Not Completed Since Last Clear
    pub const TEST_NOT_COMPLETED_SINCE_LAST_CLEAR: u8 = 0x10;
    /// Bit 5: Test Failed Since Last Clear
    pub const TEST_FAILED_SINCE_LAST_CLEAR: u8 = 0x20;
    /// Bit 6: Test Not Completed This Operation Cycle
    pub const TEST_NOT_COMPLETED_THIS_OPERATION_CYCLE: u8 = 0x40;
    /// Bit 7: Warning Indicator Requested
    pub const WARNING_INDICATOR_REQUESTED: u8 = 0x80;

    /// Common mask for active faults (test failed + confirmed)
    pub const ACTIVE_MASK: u8 = TEST_FAILED | CONFIRMED_DTC;
    /// Every status bit
    pub const ALL_MASK: u8 = 0xFF;
}

/// A five-character trouble code: one family letter plus four hex digits
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DtcCode(String);

impl DtcCode {
    /// Validate and normalize a code such as `p0300`
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let upper = s.trim().to_ascii_uppercase();
        let mut chars = upper.chars();
        let valid = upper.len() == 5
            && matches!(chars.next(), Some('P' | 'C' | 'B' | 'U'))
            && chars.all(|c| c.is_ascii_hexdigit());
        if valid {
            Ok(Self(upper))
        } else {
            Err(CoreError::InvalidDtcCode(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Family letter (`P`, `C`, `B` or `U`)
    pub fn letter(&self) -> char {
        self.0.as_bytes()[0] as char
    }

    pub fn category(&self) -> EcuCategory {
        match self.letter() {
            'C' => EcuCategory::Chassis,
            'B' => EcuCategory::Body,
            'U' => EcuCategory::Network,
            _ => EcuCategory::Powertrain,
        }
    }

    /// SAE-defined (generic) code rather than manufacturer specific.
    ///
    /// Second character 0 is generic for every family; 2 is generic for
    /// powertrain only.
    pub fn is_generic(&self) -> bool {
        match (self.letter(), self.0.as_bytes()[1]) {
            (_, b'0') => true,
            ('P', b'2') => true,
            _ => false,
        }
    }
}

impl fmt::Display for DtcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DtcCode {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DtcCode> for String {
    fn from(code: DtcCode) -> Self {
        code.0
    }
}

/// Parsed UDS DTC status byte
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DtcStatus {
    /// Bit 0: Test failed at time of request
    pub test_failed: bool,
    /// Bit 1: Test failed during current operation cycle
    pub test_failed_this_operation_cycle: bool,
    /// Bit 2: DTC is pending (failed but not yet confirmed)
    pub pending_dtc: bool,
    /// Bit 3: DTC is confirmed (malfunction confirmed and stored)
    pub confirmed_dtc: bool,
    /// Bit 4: Test not completed since last clear
    pub test_not_completed_since_last_clear: bool,
    /// Bit 5: Test failed since last clear
    pub test_failed_since_last_clear: bool,
    /// Bit 6: Test not completed this operation cycle
    pub test_not_completed_this_operation_cycle: bool,
    /// Bit 7: Warning indicator (MIL) requested
    pub warning_indicator_requested: bool,
    /// Raw status byte value
    pub raw: u8,
}

impl DtcStatus {
    /// Parse a status byte into structured status
    pub fn from_byte(status: u8) -> Self {
        Self {
            test_failed: (status & status_bit::TEST_FAILED) != 0,
            test_failed_this_operation_cycle: (status
                & status_bit::TEST_FAILED_THIS_OPERATION_CYCLE)
                != 0,
            pending_dtc: (status & status_bit::PENDING_DTC) != 0,
            confirmed_dtc: (status & status_bit::CONFIRMED_DTC) != 0,
            test_not_completed_since_last_clear: (status
                & status_bit::TEST_NOT_COMPLETED_SINCE_LAST_CLEAR)
                != 0,
            test_failed_since_last_clear: (status & status_bit::TEST_FAILED_SINCE_LAST_CLEAR) != 0,
            test_not_completed_this_operation_cycle: (status
                & status_bit::TEST_NOT_COMPLETED_THIS_OPERATION_CYCLE)
                != 0,
            warning_indicator_requested: (status & status_bit::WARNING_INDICATOR_REQUESTED) != 0,
            raw: status,
        }
    }

    /// Check if this DTC is currently active (test failed + confirmed)
    pub fn is_active(&self) -> bool {
        self.raw & status_bit::ACTIVE_MASK == status_bit::ACTIVE_MASK
    }

    /// Short label for listings
    pub fn label(&self) -> &'static str {
        if self.is_active() {
            "active"
        } else if self.confirmed_dtc {
            "confirmed"
        } else if self.pending_dtc {
            "pending"
        } else if self.test_failed || self.test_failed_this_operation_cycle {
            "test failed"
        } else {
            "stored"
        }
    }
}

/// Which read produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DtcSource {
    /// OBD-II Mode 03
    Obd,
    /// UDS ReadDTCInformation (0x19 0x02)
    Uds,
}

/// A trouble code decoded from adapter text
///
/// Never mutated once built: a newer read of the same code replaces the
/// value in its containing set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDtc {
    pub code: DtcCode,
    /// Hex fragment the code was decoded from
    pub raw: String,
    /// Module that reported it; `None` for broadcast reads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<EcuModule>,
    /// UDS status byte, when read over UDS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_byte: Option<u8>,
    pub source: DtcSource,
}

impl ParsedDtc {
    pub fn new(code: DtcCode, raw: impl Into<String>, source: DtcSource) -> Self {
        Self {
            code,
            raw: raw.into(),
            module: None,
            status_byte: None,
            source,
        }
    }

    /// Same finding attributed to `module`
    pub fn with_module(mut self, module: &EcuModule) -> Self {
        self.module = Some(module.clone());
        self
    }

    pub fn with_status(mut self, status: u8) -> Self {
        self.status_byte = Some(status);
        self
    }

    pub fn module_id(&self) -> Option<&str> {
        self.module.as_ref().map(|m| m.id.as_ref())
    }

    pub fn status(&self) -> Option<DtcStatus> {
        self.status_byte.map(DtcStatus::from_byte)
    }
}

impl fmt::Display for ParsedDtc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "{} [{}]", self.code, module.short_name),
            None => write!(f, "{}", self.code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("P0300", true)]
    #[case("c0420", true)]
    #[case("B1234", true)]
    #[case("U0100", true)]
    #[case("UABCD", true)]
    #[case("X0100", false)]
    #[case("P030", false)]
    #[case("P03000", false)]
    #[case("P03G0", false)]
    fn test_dtc_code_validation(#[case] input: &str, #[case] valid: bool) {
        assert_eq!(DtcCode::parse(input).is_ok(), valid);
    }

    #[test]
    fn test_dtc_code_category_and_generic() {
        let code = DtcCode::parse("P0420").unwrap();
        assert_eq!(code.category(), EcuCategory::Powertrain);
        assert!(code.is_generic());

        let code = DtcCode::parse("B1234").unwrap();
        assert_eq!(code.category(), EcuCategory::Body);
        assert!(!code.is_generic());
    }

    #[test]
    fn test_dtc_status_parsing() {
        let status = DtcStatus::from_byte(0x09);
        assert!(status.test_failed);
        assert!(status.confirmed_dtc);
        assert!(!status.pending_dtc);
        assert!(status.is_active());
        assert_eq!(status.label(), "active");

        let status = DtcStatus::from_byte(0x04);
        assert!(status.pending_dtc);
        assert!(!status.is_active());
        assert_eq!(status.label(), "pending");
    }
}
