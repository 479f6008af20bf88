//! VIN command - identify a vehicle without talking to it

use anyhow::Result;
use elmdiag_engine::registry::{alternate_addresses, identify_vehicle};

use crate::output::OutputContext;

pub fn vin(vin: &str, ctx: &OutputContext) -> Result<()> {
    if vin.trim().len() != 17 {
        anyhow::bail!("A VIN has 17 characters, got {}", vin.trim().len());
    }
    let info = identify_vehicle(vin);
    let extra = alternate_addresses(info.group).len();

    ctx.print_kv(&[
        ("VIN", info.vin.clone()),
        ("WMI", info.wmi.clone()),
        ("Manufacturer", info.manufacturer.clone()),
        ("Group", info.group.to_string()),
        (
            "Model year",
            info.model_year
                .map(|y| y.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ),
        ("Extra addresses", extra.to_string()),
    ]);
    Ok(())
}
