//! Pattern Analyzer CLI
//!
//! A command-line tool for browsing detected CPU pattern reports and
//! starting on-demand analysis runs.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::AnalysisTarget;
use commands::{analyze, reports};

/// Pattern Analyzer CLI
#[derive(Parser)]
#[command(name = "pactl")]
#[command(author, version, about = "CLI for the CPU Pattern Analyzer", long_about = None)]
pub struct Cli {
    /// Analyzer API URL (can also be set via PACTL_API_URL env var)
    #[arg(long, env = "PACTL_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List detected pattern reports, newest first
    Reports {
        /// Filter by metric name (e.g. cpu_sustained_high)
        #[arg(long, short)]
        metric: Option<String>,

        /// Filter by severity (warning, critical)
        #[arg(long, short)]
        severity: Option<String>,

        /// Show at most this many reports
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Start an analysis run in the background
    Analyze {
        /// Analysis to run
        #[arg(value_enum)]
        kind: AnalysisTarget,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize client
    let client = client::ApiClient::new(&cli.api_url)?;

    // Execute command
    match cli.command {
        Commands::Reports {
            metric,
            severity,
            limit,
        } => {
            let filter = reports::ReportFilter {
                metric,
                severity,
                limit,
            };
            reports::list_reports(&client, filter, cli.format).await?;
        }
        Commands::Analyze { kind } => {
            analyze::trigger_analysis(&client, kind, cli.format).await?;
        }
    }

    Ok(())
}
