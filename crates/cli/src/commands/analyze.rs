//! On-demand analysis commands

use anyhow::Result;

use crate::client::{AnalysisTarget, ApiClient};
use crate::output::{format_time, print_info, print_success, OutputFormat};

/// Ask the analyzer to start a run; returns once the run is accepted
pub async fn trigger_analysis(client: &ApiClient, target: AnalysisTarget, format: OutputFormat) -> Result<()> {
    let ack = client.trigger(target).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&ack)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            print_success(&ack.message);
            print_info(&format!(
                "Accepted at {} UTC; check results with `pactl reports`",
                format_time(&ack.accepted_at)
            ));
        }
    }

    Ok(())
}
