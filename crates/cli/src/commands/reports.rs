//! Report history commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, Report};
use crate::output::{color_severity, format_time, print_warning, truncate, OutputFormat};

/// Row for reports table
#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Created")]
    created_at: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Pattern")]
    pattern: String,
    #[tabled(rename = "Instance")]
    instance: String,
    #[tabled(rename = "Window")]
    window: String,
    #[tabled(rename = "Details")]
    details: String,
}

/// Client-side filters over the report history
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub metric: Option<String>,
    pub severity: Option<String>,
    pub limit: Option<usize>,
}

impl ReportFilter {
    fn apply(&self, reports: Vec<Report>) -> Vec<Report> {
        reports
            .into_iter()
            .filter(|r| {
                self.metric
                    .as_ref()
                    .map(|m| r.metric_name == *m)
                    .unwrap_or(true)
            })
            .filter(|r| {
                self.severity
                    .as_ref()
                    .map(|s| r.severity.eq_ignore_ascii_case(s))
                    .unwrap_or(true)
            })
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// List stored reports, newest first
pub async fn list_reports(client: &ApiClient, filter: ReportFilter, format: OutputFormat) -> Result<()> {
    let reports = filter.apply(client.list_reports().await?);

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&reports)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if reports.is_empty() {
                print_warning("No reports found");
                return Ok(());
            }

            let rows: Vec<ReportRow> = reports
                .iter()
                .map(|r| ReportRow {
                    id: r.id,
                    created_at: format_time(&r.created_at),
                    severity: color_severity(&r.severity),
                    pattern: r.pattern_detected.clone(),
                    instance: r.instance.clone().unwrap_or_else(|| "-".to_string()),
                    window: format!("{} → {}", format_time(&r.start_time), format_time(&r.end_time)),
                    details: truncate(&r.details, 60),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} reports", reports.len());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn report(id: i64, metric: &str, severity: &str) -> Report {
        let now = Utc::now();
        Report {
            id,
            metric_name: metric.to_string(),
            pattern_detected: "pattern".to_string(),
            severity: severity.to_string(),
            instance: Some("host-1".to_string()),
            start_time: now,
            end_time: now,
            details: String::new(),
            created_at: now,
        }
    }

    #[test]
    fn test_filter_by_metric_severity_and_limit() {
        let reports = vec![
            report(4, "cpu_sustained_high", "critical"),
            report(3, "cpu_transient_spike", "warning"),
            report(2, "cpu_sustained_high", "critical"),
            report(1, "cpu_sustained_high", "critical"),
        ];

        let filter = ReportFilter {
            metric: Some("cpu_sustained_high".to_string()),
            severity: Some("CRITICAL".to_string()),
            limit: Some(2),
        };
        let ids: Vec<i64> = filter.apply(reports).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 2]);
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let reports = vec![report(1, "cpu_transient_spike", "warning")];
        assert_eq!(ReportFilter::default().apply(reports).len(), 1);
    }
}
