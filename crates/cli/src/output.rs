//! Output formatting utilities

use chrono::{TimeZone, Utc};
use clap::ValueEnum;
use colored::Colorize;
use sentinel_lib::monitor::CheckStatus;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print table rows, or a warning when there are none
pub fn print_table<T: Tabled>(rows: Vec<T>, empty_message: &str) {
    if rows.is_empty() {
        print_warning(empty_message);
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a unix timestamp (seconds) for display
pub fn format_timestamp(timestamp: i64) -> String {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

pub fn format_optional_timestamp(timestamp: Option<i64>) -> String {
    timestamp.map(format_timestamp).unwrap_or_else(|| "-".to_string())
}

/// Format a profile distance
pub fn format_distance(distance: f64) -> String {
    if distance.is_finite() {
        format!("{:.4}", distance)
    } else {
        "inf".to_string()
    }
}

/// Describe and color a check status
pub fn color_status(status: &CheckStatus) -> String {
    match status {
        CheckStatus::WarmingUp { have, need } => {
            format!("warming up ({}/{})", have, need).blue().to_string()
        }
        CheckStatus::Throttled { retry_in_secs } => {
            format!("throttled ({}s)", retry_in_secs).dimmed().to_string()
        }
        CheckStatus::Skipped { reason } => format!("skipped: {}", reason).yellow().to_string(),
        CheckStatus::Clear => "clear".green().to_string(),
        CheckStatus::Alerted => "alerted".red().bold().to_string(),
        CheckStatus::Failed { reason } => format!("failed: {}", reason).red().to_string(),
    }
}

/// Color an alert severity label
pub fn color_severity(severity: &str) -> String {
    match severity {
        "critical" => severity.red().bold().to_string(),
        "warning" => severity.yellow().to_string(),
        _ => severity.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00");
        assert_eq!(format_optional_timestamp(None), "-");
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(1.23456), "1.2346");
        assert_eq!(format_distance(f64::INFINITY), "inf");
    }
}
