//! ECU module identities

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Functional area an ECU (or a trouble code) belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EcuCategory {
    /// Engine, transmission
    Powertrain,
    /// Airbags, climate, lighting
    Body,
    /// ABS, steering, suspension
    Chassis,
    /// Gateways and bus communication
    Network,
}

impl fmt::Display for EcuCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EcuCategory::Powertrain => "powertrain",
            EcuCategory::Body => "body",
            EcuCategory::Chassis => "chassis",
            EcuCategory::Network => "network",
        };
        f.write_str(s)
    }
}

/// 11-bit CAN arbitration ID, always rendered as exactly three hex digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanHeader(u16);

impl CanHeader {
    /// Functional broadcast request address
    pub const BROADCAST: CanHeader = CanHeader(0x7DF);

    /// Build a header from a raw ID.
    ///
    /// Panics when `id` does not fit in three hex digits; intended for the
    /// compile-time module tables.
    pub const fn new(id: u16) -> Self {
        assert!(id <= 0xFFF, "CAN header must fit in three hex digits");
        Self(id)
    }

    /// Parse a three-hex-digit header such as `7E0`
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let s = s.trim();
        if s.len() != 3 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidCanHeader(s.to_string()));
        }
        u16::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| CoreError::InvalidCanHeader(s.to_string()))
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for CanHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03X}", self.0)
    }
}

impl TryFrom<String> for CanHeader {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CanHeader> for String {
    fn from(header: CanHeader) -> Self {
        header.to_string()
    }
}

/// An addressable vehicle control unit
///
/// Modules are defined in static tables; `Cow` lets the same type be
/// deserialized back from stored snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcuModule {
    /// Stable identifier (e.g. `engine`)
    pub id: Cow<'static, str>,
    /// Display name
    pub name: Cow<'static, str>,
    /// Abbreviation used in compact listings (e.g. `ECM`)
    pub short_name: Cow<'static, str>,
    pub category: EcuCategory,
    /// Request address (tester -> ECU), set with `AT SH`
    pub tx_header: CanHeader,
    /// Response address (ECU -> tester), set with `AT CRA`
    pub rx_filter: CanHeader,
}

impl EcuModule {
    pub const fn new(
        id: &'static str,
        name: &'static str,
        short_name: &'static str,
        category: EcuCategory,
        tx_header: u16,
        rx_filter: u16,
    ) -> Self {
        Self {
            id: Cow::Borrowed(id),
            name: Cow::Borrowed(name),
            short_name: Cow::Borrowed(short_name),
            category,
            tx_header: CanHeader::new(tx_header),
            rx_filter: CanHeader::new(rx_filter),
        }
    }
}

impl fmt::Display for EcuModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) {}/{}", self.name, self.short_name, self.tx_header, self.rx_filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_header_formats_three_digits() {
        assert_eq!(CanHeader::new(0x7E0).to_string(), "7E0");
        assert_eq!(CanHeader::new(0x0A1).to_string(), "0A1");
    }

    #[test]
    fn test_can_header_parse_rejects_bad_input() {
        assert!(CanHeader::parse("7E").is_err());
        assert!(CanHeader::parse("7E00").is_err());
        assert!(CanHeader::parse("7G0").is_err());
        assert_eq!(CanHeader::parse("7e8").unwrap(), CanHeader::new(0x7E8));
    }

    #[test]
    fn test_module_serde_roundtrip_keeps_headers_as_hex() {
        let module = EcuModule::new("abs", "ABS / ESP", "ABS", EcuCategory::Chassis, 0x7E2, 0x7EA);
        let json = serde_json::to_value(&module).unwrap();
        assert_eq!(json["tx_header"], "7E2");
        assert_eq!(json["rx_filter"], "7EA");

        let back: EcuModule = serde_json::from_value(json).unwrap();
        assert_eq!(back, module);
    }
}
