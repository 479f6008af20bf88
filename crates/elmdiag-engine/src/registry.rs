//! ECU module registry and vehicle identification tables
//!
//! Pure lookups over static tables. Nothing here talks to the adapter.

use elmdiag_core::{EcuCategory, EcuModule, ManufacturerGroup, VinInfo};

use EcuCategory::{Body, Chassis, Network, Powertrain};

/// Standard OBD-II/UDS physical addresses, probed in this order
static STANDARD_MODULES: [EcuModule; 10] = [
    EcuModule::new("engine", "Engine Control Module", "ECM", Powertrain, 0x7E0, 0x7E8),
    EcuModule::new("transmission", "Transmission Control Module", "TCM", Powertrain, 0x7E1, 0x7E9),
    EcuModule::new("abs", "ABS / Stability Control", "ABS", Chassis, 0x7E2, 0x7EA),
    EcuModule::new("airbag", "Airbag / Restraints", "SRS", Body, 0x7E3, 0x7EB),
    EcuModule::new("body", "Body Control Module", "BCM", Body, 0x7E4, 0x7EC),
    EcuModule::new("hvac", "Climate Control", "HVAC", Body, 0x7E5, 0x7ED),
    EcuModule::new("instrument", "Instrument Cluster", "IPC", Body, 0x7E6, 0x7EE),
    EcuModule::new("gateway", "Gateway", "GW", Network, 0x7E7, 0x7EF),
    EcuModule::new("steering", "Electric Power Steering", "EPS", Chassis, 0x7D0, 0x7D8),
    EcuModule::new("parking", "Parking Assist", "PAM", Body, 0x7D1, 0x7D9),
];

static VAG_MODULES: [EcuModule; 4] = [
    EcuModule::new("vag_gateway", "Gateway J533", "GW", Network, 0x710, 0x77A),
    EcuModule::new("vag_cluster", "Instrument Cluster J285", "KOMBI", Body, 0x714, 0x77E),
    EcuModule::new("vag_airbag", "Airbag J234", "SRS", Body, 0x715, 0x77F),
    EcuModule::new("vag_steering", "Steering Assist J500", "EPS", Chassis, 0x712, 0x77C),
];

static BMW_MODULES: [EcuModule; 3] = [
    EcuModule::new("bmw_kombi", "Instrument Cluster", "KOMBI", Body, 0x6F1, 0x660),
    EcuModule::new("bmw_cas", "Car Access System", "CAS", Body, 0x6F1, 0x640),
    EcuModule::new("bmw_frm", "Footwell Module", "FRM", Body, 0x6F1, 0x672),
];

static MERCEDES_MODULES: [EcuModule; 2] = [
    EcuModule::new("mb_sam_front", "Front SAM", "SAM-F", Body, 0x7B2, 0x7BA),
    EcuModule::new("mb_cluster", "Instrument Cluster", "IC", Body, 0x7B4, 0x7BC),
];

static FORD_MODULES: [EcuModule; 4] = [
    EcuModule::new("ford_abs", "Anti-Lock Brakes", "ABS", Chassis, 0x760, 0x768),
    EcuModule::new("ford_rcm", "Restraints Control Module", "RCM", Body, 0x737, 0x73F),
    EcuModule::new("ford_bcm", "Body Control Module", "BCM", Body, 0x726, 0x72E),
    EcuModule::new("ford_ipc", "Instrument Panel Cluster", "IPC", Body, 0x720, 0x728),
];

static GM_MODULES: [EcuModule; 2] = [
    EcuModule::new("gm_ebcm", "Electronic Brake Control", "EBCM", Chassis, 0x243, 0x643),
    EcuModule::new("gm_bcm", "Body Control Module", "BCM", Body, 0x241, 0x641),
];

static STELLANTIS_MODULES: [EcuModule; 2] = [
    EcuModule::new("psa_bsi", "Built-in Systems Interface", "BSI", Body, 0x752, 0x652),
    EcuModule::new("psa_abs", "ABS / ESP", "ESP", Chassis, 0x6AD, 0x68D),
];

static TOYOTA_MODULES: [EcuModule; 2] = [
    EcuModule::new("toyota_abs", "Skid Control ECU", "ABS", Chassis, 0x7B0, 0x7B8),
    EcuModule::new("toyota_airbag", "Airbag ECU", "SRS", Body, 0x780, 0x788),
];

static NISSAN_MODULES: [EcuModule; 3] = [
    EcuModule::new("nissan_abs", "ABS Actuator", "ABS", Chassis, 0x740, 0x760),
    EcuModule::new("nissan_meter", "Combination Meter", "METER", Body, 0x743, 0x763),
    EcuModule::new("nissan_bcm", "Body Control Module", "BCM", Body, 0x745, 0x765),
];

static HYUNDAI_KIA_MODULES: [EcuModule; 2] = [
    EcuModule::new("hk_bcm", "Body Control Module", "BCM", Body, 0x7A0, 0x7A8),
    EcuModule::new("hk_cluster", "Instrument Cluster", "CLU", Body, 0x7C6, 0x7CE),
];

/// Standard modules in probe order
pub fn standard_modules() -> &'static [EcuModule] {
    &STANDARD_MODULES
}

/// Manufacturer-specific addresses probed after the standard list
///
/// Groups without a table get an empty list.
pub fn alternate_addresses(group: ManufacturerGroup) -> &'static [EcuModule] {
    let modules: &'static [EcuModule] = match group {
        ManufacturerGroup::Vag => &VAG_MODULES,
        ManufacturerGroup::Bmw => &BMW_MODULES,
        ManufacturerGroup::Mercedes => &MERCEDES_MODULES,
        ManufacturerGroup::Ford => &FORD_MODULES,
        ManufacturerGroup::Gm => &GM_MODULES,
        ManufacturerGroup::Stellantis => &STELLANTIS_MODULES,
        ManufacturerGroup::Toyota => &TOYOTA_MODULES,
        ManufacturerGroup::Nissan => &NISSAN_MODULES,
        ManufacturerGroup::HyundaiKia => &HYUNDAI_KIA_MODULES,
        ManufacturerGroup::Honda
        | ManufacturerGroup::Renault
        | ManufacturerGroup::Volvo
        | ManufacturerGroup::Other => &[],
    };
    if modules.is_empty() {
        tracing::info!(%group, "No manufacturer-specific addresses known");
    }
    modules
}

// =============================================================================
// VIN decoding
// =============================================================================

/// World manufacturer identifiers; three-character entries win over two
const WMI_TABLE: &[(&str, &str, ManufacturerGroup)] = &[
    ("WVW", "Volkswagen", ManufacturerGroup::Vag),
    ("WV1", "Volkswagen Commercial", ManufacturerGroup::Vag),
    ("WV2", "Volkswagen Commercial", ManufacturerGroup::Vag),
    ("1VW", "Volkswagen", ManufacturerGroup::Vag),
    ("3VW", "Volkswagen", ManufacturerGroup::Vag),
    ("WAU", "Audi", ManufacturerGroup::Vag),
    ("WA1", "Audi", ManufacturerGroup::Vag),
    ("TRU", "Audi", ManufacturerGroup::Vag),
    ("TMB", "Skoda", ManufacturerGroup::Vag),
    ("VSS", "SEAT", ManufacturerGroup::Vag),
    ("WP0", "Porsche", ManufacturerGroup::Vag),
    ("WP1", "Porsche", ManufacturerGroup::Vag),
    ("WBA", "BMW", ManufacturerGroup::Bmw),
    ("WBS", "BMW M", ManufacturerGroup::Bmw),
    ("WBY", "BMW i", ManufacturerGroup::Bmw),
    ("5UX", "BMW", ManufacturerGroup::Bmw),
    ("WMW", "MINI", ManufacturerGroup::Bmw),
    ("WDB", "Mercedes-Benz", ManufacturerGroup::Mercedes),
    ("WDC", "Mercedes-Benz", ManufacturerGroup::Mercedes),
    ("WDD", "Mercedes-Benz", ManufacturerGroup::Mercedes),
    ("W1K", "Mercedes-Benz", ManufacturerGroup::Mercedes),
    ("W1N", "Mercedes-Benz", ManufacturerGroup::Mercedes),
    ("4JG", "Mercedes-Benz", ManufacturerGroup::Mercedes),
    ("1FA", "Ford", ManufacturerGroup::Ford),
    ("1FM", "Ford", ManufacturerGroup::Ford),
    ("1FT", "Ford", ManufacturerGroup::Ford),
    ("2FM", "Ford", ManufacturerGroup::Ford),
    ("3FA", "Ford", ManufacturerGroup::Ford),
    ("WF0", "Ford", ManufacturerGroup::Ford),
    ("1G1", "Chevrolet", ManufacturerGroup::Gm),
    ("1GC", "Chevrolet", ManufacturerGroup::Gm),
    ("2G1", "Chevrolet", ManufacturerGroup::Gm),
    ("1GT", "GMC", ManufacturerGroup::Gm),
    ("1G4", "Buick", ManufacturerGroup::Gm),
    ("1G6", "Cadillac", ManufacturerGroup::Gm),
    ("W0L", "Opel", ManufacturerGroup::Gm),
    ("W0V", "Opel", ManufacturerGroup::Gm),
    ("VF3", "Peugeot", ManufacturerGroup::Stellantis),
    ("VF7", "Citroen", ManufacturerGroup::Stellantis),
    ("ZFA", "Fiat", ManufacturerGroup::Stellantis),
    ("1C3", "Chrysler", ManufacturerGroup::Stellantis),
    ("1C4", "Jeep", ManufacturerGroup::Stellantis),
    ("1J4", "Jeep", ManufacturerGroup::Stellantis),
    ("1D7", "Dodge", ManufacturerGroup::Stellantis),
    ("3C6", "Ram", ManufacturerGroup::Stellantis),
    ("JTH", "Lexus", ManufacturerGroup::Toyota),
    ("JT", "Toyota", ManufacturerGroup::Toyota),
    ("4T1", "Toyota", ManufacturerGroup::Toyota),
    ("5TD", "Toyota", ManufacturerGroup::Toyota),
    ("JH4", "Acura", ManufacturerGroup::Honda),
    ("JHM", "Honda", ManufacturerGroup::Honda),
    ("1HG", "Honda", ManufacturerGroup::Honda),
    ("2HG", "Honda", ManufacturerGroup::Honda),
    ("5FN", "Honda", ManufacturerGroup::Honda),
    ("JN", "Nissan", ManufacturerGroup::Nissan),
    ("1N4", "Nissan", ManufacturerGroup::Nissan),
    ("5N1", "Nissan", ManufacturerGroup::Nissan),
    ("KMH", "Hyundai", ManufacturerGroup::HyundaiKia),
    ("5NP", "Hyundai", ManufacturerGroup::HyundaiKia),
    ("KNA", "Kia", ManufacturerGroup::HyundaiKia),
    ("KND", "Kia", ManufacturerGroup::HyundaiKia),
    ("5XY", "Kia", ManufacturerGroup::HyundaiKia),
    ("VF1", "Renault", ManufacturerGroup::Renault),
    ("UU1", "Dacia", ManufacturerGroup::Renault),
    ("YV1", "Volvo", ManufacturerGroup::Volvo),
    ("YV4", "Volvo", ManufacturerGroup::Volvo),
];

/// Position-10 year codes for the 1980-2009 cycle
const YEAR_CODES: &str = "ABCDEFGHJKLMNPRSTVWXY123456789";

/// Model year from VIN position 10
///
/// The code repeats every 30 years; an alphabetic position 7 selects the
/// 2010-2039 cycle.
pub fn model_year(vin: &str) -> Option<u16> {
    let bytes = vin.as_bytes();
    if bytes.len() != 17 {
        return None;
    }
    let index = YEAR_CODES.find(bytes[9] as char)? as u16;
    let cycle = if bytes[6].is_ascii_alphabetic() { 2010 } else { 1980 };
    Some(cycle + index)
}

/// Manufacturer and group for a VIN; `Other` when the WMI is not listed
pub fn identify_vehicle(vin: &str) -> VinInfo {
    let vin = vin.trim().to_ascii_uppercase();
    let wmi: String = vin.chars().take(3).collect();
    let entry = WMI_TABLE
        .iter()
        .find(|(prefix, _, _)| prefix.len() == 3 && *prefix == wmi)
        .or_else(|| {
            WMI_TABLE
                .iter()
                .find(|(prefix, _, _)| prefix.len() == 2 && wmi.starts_with(prefix))
        });

    let (manufacturer, group) = match entry {
        Some((_, name, group)) => (name.to_string(), *group),
        None => ("Unknown".to_string(), ManufacturerGroup::Other),
    };

    VinInfo {
        model_year: model_year(&vin),
        vin,
        wmi,
        manufacturer,
        group,
    }
}
