// Output formatting for CLI

use anyhow::Result;
use serde_json::Value;
use std::io::Write;

use crate::cli::config::OutputFormat;

/// Format and output records
pub struct OutputFormatter {
    format: OutputFormat,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, quiet: bool) -> Self {
        Self { format, quiet }
    }

    pub fn quiet(&self) -> bool {
        self.quiet
    }

    /// Output one serialized record
    pub fn output_value(&self, value: &Value, writer: &mut impl Write) -> Result<()> {
        match self.format {
            OutputFormat::Pretty => writeln!(writer, "{}", serde_json::to_string_pretty(value)?)?,
            OutputFormat::Json => writeln!(writer, "{}", serde_json::to_string(value)?)?,
            OutputFormat::KeyValue => self.output_key_value(value, writer)?,
            OutputFormat::Table => self.output_table(value, writer)?,
        }
        Ok(())
    }

    /// Output as flattened key-value pairs, sorted by key
    fn output_key_value(&self, value: &Value, writer: &mut impl Write) -> Result<()> {
        let mut items = Vec::new();
        flatten("", value, &mut items);
        items.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, value) in items {
            writeln!(writer, "{}: {}", key, value)?;
        }
        Ok(())
    }

    /// Output top-level fields as a table
    fn output_table(&self, value: &Value, writer: &mut impl Write) -> Result<()> {
        if let Some(obj) = value.as_object() {
            let max_key_len = obj.keys().map(|k| k.len()).max().unwrap_or(0);

            writeln!(writer, "{}", "=".repeat(max_key_len + 30))?;
            for (key, value) in obj {
                writeln!(writer, "{:<width$}: {}", format!("{}:", key), format_value(value), width = max_key_len + 2)?;
            }
            writeln!(writer, "{}", "=".repeat(max_key_len + 30))?;
        }
        Ok(())
    }

    /// Print success message
    pub fn print_success(&self, message: &str) {
        if !self.quiet {
            println!("✓ {}", message);
        }
    }

    /// Print error message
    pub fn print_error(&self, message: &str) {
        eprintln!("✗ {}", message);
    }

    /// Print info message
    pub fn print_info(&self, message: &str) {
        if !self.quiet {
            println!("  {}", message);
        }
    }
}

/// Dotted paths to every scalar, arrays indexed by position
fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", prefix, key)
        }
    };
    match value {
        Value::Object(obj) => {
            for (key, child) in obj {
                flatten(&join(key), child, out);
            }
        }
        Value::Array(arr) if !arr.is_empty() => {
            for (index, child) in arr.iter().enumerate() {
                flatten(&join(&index.to_string()), child, out);
            }
        }
        _ => out.push((prefix.to_string(), format_value(value))),
    }
}

/// Format a JSON value for display
fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "(null)".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(arr) => {
            if arr.is_empty() {
                "[]".to_string()
            } else {
                format!("[{} items]", arr.len())
            }
        }
        Value::Object(obj) => {
            if obj.is_empty() {
                "{}".to_string()
            } else {
                format!("{{{} items}}", obj.len())
            }
        }
    }
}

/// Progress indicator for batch operations
pub struct ProgressBar {
    total: usize,
    current: usize,
    show: bool,
}

impl ProgressBar {
    pub fn new(total: usize, show: bool) -> Self {
        Self { total, current: 0, show }
    }

    pub fn increment(&mut self) {
        self.current += 1;
        if self.show && self.total > 0 {
            let percent = (self.current * 100) / self.total;
            eprint!("\r[{}/{}] ({}%)", self.current, self.total, percent);
            if self.current == self.total {
                eprintln!();
            }
            std::io::stderr().flush().ok();
        }
    }
}
