//! Output formatting utilities

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
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

/// Compact UTC timestamp for table cells
pub fn format_time(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Shorten free text to `max` characters
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut)
}

/// Color severity based on value
pub fn color_severity(severity: &str) -> String {
    match severity.to_lowercase().as_str() {
        "critical" => severity.red().bold().to_string(),
        "warning" => severity.yellow().to_string(),
        _ => severity.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer sentence", 10), "a much ...");
    }

    #[test]
    fn test_format_time() {
        let ts = DateTime::parse_from_rfc3339("2024-03-10T10:05:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_time(&ts), "2024-03-10 10:05:00");
    }
}
