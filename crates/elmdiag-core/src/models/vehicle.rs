//! Vehicle identity as decoded from the VIN

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Manufacturer family used to pick supplementary ECU addresses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManufacturerGroup {
    /// Volkswagen, Audi, Skoda, Seat, Porsche
    Vag,
    /// BMW, Mini
    Bmw,
    Mercedes,
    Ford,
    /// Chevrolet, GMC, Cadillac, Buick, Opel/Vauxhall
    Gm,
    /// Peugeot, Citroen, Fiat, Chrysler, Jeep, Dodge
    Stellantis,
    /// Toyota, Lexus
    Toyota,
    Honda,
    Nissan,
    /// Hyundai, Kia
    HyundaiKia,
    Renault,
    Volvo,
    #[default]
    Other,
}

impl ManufacturerGroup {
    pub const ALL: [ManufacturerGroup; 13] = [
        Self::Vag,
        Self::Bmw,
        Self::Mercedes,
        Self::Ford,
        Self::Gm,
        Self::Stellantis,
        Self::Toyota,
        Self::Honda,
        Self::Nissan,
        Self::HyundaiKia,
        Self::Renault,
        Self::Volvo,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vag => "vag",
            Self::Bmw => "bmw",
            Self::Mercedes => "mercedes",
            Self::Ford => "ford",
            Self::Gm => "gm",
            Self::Stellantis => "stellantis",
            Self::Toyota => "toyota",
            Self::Honda => "honda",
            Self::Nissan => "nissan",
            Self::HyundaiKia => "hyundai_kia",
            Self::Renault => "renault",
            Self::Volvo => "volvo",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ManufacturerGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManufacturerGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .iter()
            .copied()
            .find(|g| g.as_str() == wanted)
            .ok_or_else(|| format!("Unknown manufacturer group: {}", s))
    }
}

/// Decoded vehicle identification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VinInfo {
    /// 17-character VIN
    pub vin: String,
    /// World manufacturer identifier (first three characters)
    pub wmi: String,
    /// Manufacturer display name, `Unknown` when the WMI is not listed
    pub manufacturer: String,
    pub group: ManufacturerGroup,
    /// Model year from position 10, when it can be decoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_year: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_from_str_accepts_display_form() {
        for group in ManufacturerGroup::ALL {
            assert_eq!(group.to_string().parse::<ManufacturerGroup>().unwrap(), group);
        }
        assert_eq!(
            "Hyundai-Kia".parse::<ManufacturerGroup>().unwrap(),
            ManufacturerGroup::HyundaiKia
        );
        assert!("saab".parse::<ManufacturerGroup>().is_err());
    }
}
