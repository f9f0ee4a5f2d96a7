//! Output formatting for the fitsync CLI
//!
//! Every command writes through an [`OutputFormatter`]. Human output goes
//! to stdout with status marks; errors and warnings go to stderr. JSON
//! output prints one pretty document per result and drops `info` lines.

use serde::Serialize;

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn from_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }

    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

/// Trait for formatting CLI output
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);

    /// One `label: value` row of a status listing
    fn field(&self, label: &str, value: &str) {
        self.info(&format!("{label}: {value}"));
    }
}

/// Human-readable output with status marks and indentation
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {message}");
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {message}");
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {message}");
    }
    fn info(&self, message: &str) {
        println!("  {message}");
    }
    fn print_json(&self, _value: &serde_json::Value) {}
    fn field(&self, label: &str, value: &str) {
        println!("  {:<20} {value}", format!("{label}:"));
    }
}

/// Machine-readable output
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!("{}", serde_json::json!({"success": true, "message": message}));
    }
    fn error(&self, message: &str) {
        eprintln!("{}", serde_json::json!({"success": false, "error": message}));
    }
    fn warn(&self, message: &str) {
        eprintln!("{}", serde_json::json!({"level": "warning", "message": message}));
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("{}", serde_json::json!({"success": false, "error": e.to_string()})),
        }
    }
    fn field(&self, _label: &str, _value: &str) {}
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter),
    }
}

/// Serializes a result type and prints it as JSON
pub fn print_serialized<T: Serialize>(
    formatter: &dyn OutputFormatter,
    value: &T,
) -> anyhow::Result<()> {
    formatter.print_json(&serde_json::to_value(value)?);
    Ok(())
}
