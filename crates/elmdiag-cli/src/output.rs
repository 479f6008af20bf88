//! Output formatting for elmdiag (table, json, csv)

use clap::ValueEnum;
use colored::Colorize;
use elmdiag_core::{EcuModule, ParsedDtc, ScanSnapshot};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    /// Parse a config file value; unknown names fall back to a table
    pub fn from_name(name: &str) -> Self {
        <Self as ValueEnum>::from_str(name, true).unwrap_or_default()
    }
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Progress bars and banners only make sense for humans
    pub fn interactive(&self) -> bool {
        self.format == OutputFormat::Table && !self.quiet
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print data in the configured format
    pub fn print<T: Tabled + Serialize>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    if !self.quiet {
                        println!("No data");
                    }
                } else {
                    println!("{}", Table::new(data));
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string())
                );
            }
            OutputFormat::Csv => print_csv(data),
        }
    }

    /// Print any serializable value as JSON, whatever the format
    pub fn print_json<T: Serialize + ?Sized>(&self, data: &T) {
        println!(
            "{}",
            serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
        );
    }

    /// Print key-value pairs
    pub fn print_kv(&self, pairs: &[(&str, String)]) {
        match self.format {
            OutputFormat::Table => {
                for (key, value) in pairs {
                    println!("{}: {}", key.bold(), value);
                }
            }
            OutputFormat::Json => {
                let map: serde_json::Map<String, serde_json::Value> = pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
                    .collect();
                self.print_json(&map);
            }
            OutputFormat::Csv => {
                let keys: Vec<&str> = pairs.iter().map(|(k, _)| *k).collect();
                println!("{}", keys.join(","));
                let values: Vec<String> = pairs.iter().map(|(_, v)| escape_csv(v)).collect();
                println!("{}", values.join(","));
            }
        }
    }
}

/// Print data as CSV
fn print_csv<T: Serialize>(data: &[T]) {
    let Some(first) = data.first() else {
        return;
    };

    // Field order follows the first row
    let first = serde_json::to_value(first).unwrap_or_default();
    if let serde_json::Value::Object(map) = &first {
        let headers: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
        println!("{}", headers.join(","));

        for item in data {
            if let Ok(serde_json::Value::Object(row)) = serde_json::to_value(item) {
                let values: Vec<String> = headers
                    .iter()
                    .map(|h| {
                        row.get(*h)
                            .map(|v| match v {
                                serde_json::Value::String(s) => escape_csv(s),
                                other => escape_csv(&other.to_string()),
                            })
                            .unwrap_or_default()
                    })
                    .collect();
                println!("{}", values.join(","));
            }
        }
    }
}

/// Escape a value for CSV output
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// =============================================================================
// Display types for various commands
// =============================================================================

/// Trouble code display for scan, clear and decode
#[derive(Debug, Tabled, Serialize)]
pub struct DtcRow {
    #[tabled(rename = "Code")]
    pub code: String,
    #[tabled(rename = "System")]
    pub system: String,
    #[tabled(rename = "Type")]
    pub kind: String,
    #[tabled(rename = "Module")]
    pub module: String,
    #[tabled(rename = "Source")]
    pub source: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Raw")]
    pub raw: String,
}

impl From<&ParsedDtc> for DtcRow {
    fn from(dtc: &ParsedDtc) -> Self {
        Self {
            code: dtc.code.to_string(),
            system: dtc.code.category().to_string(),
            kind: if dtc.code.is_generic() {
                "generic"
            } else {
                "manufacturer"
            }
            .to_string(),
            module: dtc
                .module
                .as_ref()
                .map(|m| m.short_name.to_string())
                .unwrap_or_else(|| "-".to_string()),
            source: format!("{:?}", dtc.source),
            status: dtc
                .status()
                .map(|s| format!("{} (0x{:02X})", s.label(), s.raw))
                .unwrap_or_else(|| "-".to_string()),
            raw: dtc.raw.clone(),
        }
    }
}

/// Module display for the modules command
#[derive(Debug, Tabled, Serialize)]
pub struct ModuleRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Short")]
    pub short_name: String,
    #[tabled(rename = "Category")]
    pub category: String,
    #[tabled(rename = "TX")]
    pub tx: String,
    #[tabled(rename = "RX")]
    pub rx: String,
}

impl From<&EcuModule> for ModuleRow {
    fn from(module: &EcuModule) -> Self {
        Self {
            id: module.id.to_string(),
            name: module.name.to_string(),
            short_name: module.short_name.to_string(),
            category: module.category.to_string(),
            tx: module.tx_header.to_string(),
            rx: module.rx_filter.to_string(),
        }
    }
}

/// Stored scan display for the history command
#[derive(Debug, Tabled, Serialize)]
pub struct HistoryRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Time")]
    pub timestamp: String,
    #[tabled(rename = "VIN")]
    pub vin: String,
    #[tabled(rename = "Codes")]
    pub codes: String,
    #[tabled(rename = "Modules")]
    pub modules: u32,
    #[tabled(rename = "Duration")]
    pub duration: String,
}

impl HistoryRow {
    pub fn new(id: &str, snapshot: &ScanSnapshot) -> Self {
        let codes: Vec<&str> = snapshot.dtcs().iter().map(|d| d.code.as_str()).collect();
        Self {
            id: id.chars().take(8).collect(),
            timestamp: snapshot.timestamp().format("%Y-%m-%d %H:%M:%S").to_string(),
            vin: snapshot
                .vin()
                .map(|v| v.vin.clone())
                .unwrap_or_else(|| "-".to_string()),
            codes: if codes.is_empty() {
                "none".to_string()
            } else {
                codes.join(" ")
            },
            modules: snapshot.modules_scanned(),
            duration: format!("{:.1}s", snapshot.duration_ms() as f64 / 1000.0),
        }
    }
}

/// One line of a snapshot comparison
#[derive(Debug, Tabled, Serialize)]
pub struct ChangeRow {
    #[tabled(rename = "Change")]
    pub change: String,
    #[tabled(rename = "Code")]
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use elmdiag_core::{DtcCode, DtcSource, EcuCategory};

    #[test]
    fn test_dtc_row_uses_placeholders() {
        let dtc = ParsedDtc::new(DtcCode::parse("C0035").unwrap(), "4035", DtcSource::Obd);
        let row = DtcRow::from(&dtc);
        assert_eq!(row.code, "C0035");
        assert_eq!(row.module, "-");
        assert_eq!(row.status, "-");
        assert_eq!(row.system, EcuCategory::Chassis.to_string());
        assert_eq!(row.kind, "generic");
    }

    #[test]
    fn test_dtc_row_status_label() {
        let dtc = ParsedDtc::new(DtcCode::parse("P1234").unwrap(), "12340009", DtcSource::Uds)
            .with_status(0x09);
        let row = DtcRow::from(&dtc);
        assert_eq!(row.status, "active (0x09)");
        assert_eq!(row.kind, "manufacturer");
    }

    #[test]
    fn test_output_format_names() {
        assert_eq!(OutputFormat::from_name("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::from_name("xml"), OutputFormat::Table);
        assert_eq!(OutputFormat::Csv.as_str(), "csv");
    }

    #[test]
    fn test_csv_escaping() {
        assert_eq!(escape_csv("P0300"), "P0300");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
    }
}
