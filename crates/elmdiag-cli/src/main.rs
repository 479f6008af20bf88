//! elmdiag - Command-line front end for the elmdiag scan engine
//!
//! Scans a vehicle through an ELM327-style adapter, clears codes, and
//! inspects the stored scan history.

mod commands;
mod config;
mod output;
mod progress;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use elmdiag_core::ManufacturerGroup;
use elmdiag_engine::{create_transport, CommandTransport, JsonFileScanStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::commands::scan::ScanOptions;
use crate::config::Config;
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "elmdiag")]
#[command(author, version, about = "OBD-II / UDS trouble code scanner")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ELMDIAG_CONFIG")]
    config: Option<PathBuf>,

    /// Scan history file
    #[arg(long, env = "ELMDIAG_HISTORY")]
    history: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan every module for trouble codes
    Scan {
        /// Known VIN; skips reading it from the vehicle
        #[arg(long)]
        vin: Option<String>,

        /// Keep codes that do not show up on a second read
        #[arg(long)]
        no_double_check: bool,

        /// Only use OBD-II Mode 03
        #[arg(long)]
        no_uds: bool,

        /// Print the adapter trace after the scan
        #[arg(long)]
        trace: bool,
    },

    /// Clear stored codes in every module
    Clear,

    /// List stored scans
    History {
        /// How many scans to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Compare two scans (the latest two stored ones by default)
    Diff {
        /// Older snapshot file
        #[arg(requires = "current")]
        previous: Option<PathBuf>,

        /// Newer snapshot file
        current: Option<PathBuf>,
    },

    /// Show the ECU address tables
    Modules {
        /// Manufacturer group, e.g. vag, bmw, ford
        #[arg(long)]
        manufacturer: Option<ManufacturerGroup>,
    },

    /// Decode a raw Mode 03 or UDS 0x59 0x02 response
    Decode {
        /// Response bytes, e.g. 43 02 01 01 03 00
        #[arg(required = true)]
        response: Vec<String>,
    },

    /// Identify a vehicle from its VIN
    Vin {
        /// 17-character VIN
        vin: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("elmdiag=debug,elmdiag_engine=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_default(),
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(
        cli.output.map(|o| o.as_str()),
        cli.no_color,
        cli.history.as_deref(),
    )?;
    debug!(output = %merged.output, history = %merged.history.display(), "Configuration resolved");

    // Create output context
    let ctx = OutputContext::new(
        OutputFormat::from_name(&merged.output),
        merged.no_color,
        cli.quiet,
    );

    let result = run(&cli, config, &merged.history, &ctx).await;
    if let Err(e) = &result {
        ctx.error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: &Cli, config: Config, history: &std::path::Path, ctx: &OutputContext) -> Result<()> {
    let store = Arc::new(JsonFileScanStore::new(history));

    match &cli.command {
        Commands::Scan {
            vin,
            no_double_check,
            no_uds,
            trace,
        } => {
            let mut scan_config = config.engine.scan;
            scan_config.double_check &= !no_double_check;
            scan_config.uds_enabled &= !no_uds;
            let transport = open_transport(&config.engine.transport)?;
            let options = ScanOptions {
                vin: vin.as_deref(),
                trace: *trace,
            };
            commands::scan(transport, scan_config, store, options, ctx).await?;
        }

        Commands::Clear => {
            let transport = open_transport(&config.engine.transport)?;
            commands::clear(transport, &config.engine.scan, ctx).await?;
        }

        Commands::History { limit } => {
            commands::history(&store, *limit, ctx).await?;
        }

        Commands::Diff { previous, current } => {
            let files = previous.as_deref().zip(current.as_deref());
            commands::diff(&store, files, ctx).await?;
        }

        Commands::Modules { manufacturer } => {
            commands::modules(*manufacturer, ctx)?;
        }

        Commands::Decode { response } => {
            commands::decode(response, ctx)?;
        }

        Commands::Vin { vin } => {
            commands::vin(vin, ctx)?;
        }
    }

    Ok(())
}

/// Create the adapter transport named in the configuration
fn open_transport(config: &elmdiag_engine::TransportConfig) -> Result<Arc<dyn CommandTransport>> {
    create_transport(config).context("Failed to open adapter transport")
}
