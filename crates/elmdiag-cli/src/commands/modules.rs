//! Modules command - show the address tables a scan walks

use anyhow::Result;
use elmdiag_core::ManufacturerGroup;
use elmdiag_engine::registry::{alternate_addresses, standard_modules};

use crate::output::{ModuleRow, OutputContext};

/// List standard modules, or one manufacturer's extra addresses
pub fn modules(manufacturer: Option<ManufacturerGroup>, ctx: &OutputContext) -> Result<()> {
    let table = match manufacturer {
        Some(group) => {
            let modules = alternate_addresses(group);
            if modules.is_empty() {
                ctx.info(&format!("No extra addresses known for {}", group));
                return Ok(());
            }
            modules
        }
        None => standard_modules(),
    };

    let rows: Vec<ModuleRow> = table.iter().map(ModuleRow::from).collect();
    ctx.print(&rows);
    Ok(())
}
