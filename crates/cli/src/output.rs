//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print rows as a table, or the serialized value as JSON
pub fn print_rows<R: Tabled, J: Serialize + ?Sized>(
    rows: &[R],
    json: &J,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                print_warning("No items found");
                return Ok(());
            }
            let table = Table::new(rows).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(json)?);
        }
    }
    Ok(())
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: i64) -> String {
    const KI: f64 = 1024.0;
    const MI: f64 = KI * 1024.0;
    const GI: f64 = MI * 1024.0;

    let b = bytes as f64;
    if b >= GI {
        format!("{:.2}Gi", b / GI)
    } else if b >= MI {
        format!("{:.2}Mi", b / MI)
    } else if b >= KI {
        format!("{:.2}Ki", b / KI)
    } else {
        format!("{}B", bytes)
    }
}

/// Format millicores as human-readable string
pub fn format_cpu(millicores: i64) -> String {
    if millicores >= 1000 {
        format!("{:.1}", millicores as f64 / 1000.0)
    } else {
        format!("{}m", millicores)
    }
}

pub fn format_cost(amount: f64) -> String {
    format!("{:.2}", amount)
}

/// `class=value` pairs, or `-` when empty
pub fn format_by_class<V>(map: &BTreeMap<String, V>, fmt: impl Fn(&V) -> String) -> String {
    if map.is_empty() {
        return "-".to_string();
    }
    map.iter()
        .map(|(class, v)| format!("{}={}", class, fmt(v)))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(268435456), "256.00Mi");
        assert_eq!(format_bytes(10737418240), "10.00Gi");
    }

    #[test]
    fn test_format_cpu() {
        assert_eq!(format_cpu(250), "250m");
        assert_eq!(format_cpu(1750), "1.8");
    }

    #[test]
    fn test_format_by_class() {
        let empty: BTreeMap<String, f64> = BTreeMap::new();
        assert_eq!(format_by_class(&empty, |v| format_cost(*v)), "-");

        let map = BTreeMap::from([("fast".to_string(), 0.8), ("slow".to_string(), 0.1)]);
        assert_eq!(format_by_class(&map, |v| format_cost(*v)), "fast=0.80, slow=0.10");
    }
}
