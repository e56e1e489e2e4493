//! SMTP mail sink

use anyhow::Result;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use tracing::{error, info};

use super::{format_window, NotifierSink};
use crate::models::Report;

fn default_smtp_port() -> u16 {
    587
}

/// SMTP settings for the mail sink
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Sender address; defaults to `username`
    #[serde(default)]
    pub from: Option<String>,
    /// Alert recipient
    pub to: String,
}

/// Sends an HTML alert mail per report
pub struct EmailSink {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    to: String,
}

impl EmailSink {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
                .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let from = config
            .from
            .clone()
            .or_else(|| config.username.clone())
            .ok_or_else(|| anyhow::anyhow!("email sink needs a sender address"))?;

        Ok(Self {
            transport: builder.build(),
            from,
            to: config.to.clone(),
        })
    }

    fn subject(report: &Report) -> String {
        format!(
            "[{}] Alert: {} Detected on {}",
            report.severity, report.pattern_detected, report.metric_name
        )
    }

    fn format_body(report: &Report) -> String {
        format!(
            "<h2>Analysis Report Alert</h2>\
             <p><strong>Metric:</strong> {}</p>\
             <p><strong>Pattern:</strong> {}</p>\
             <p><strong>Severity:</strong> {}</p>\
             <p><strong>Instance:</strong> {}</p>\
             <p><strong>Time Window:</strong> {}</p>\
             <p><strong>Details:</strong> {}</p>",
            html_escape(&report.metric_name),
            html_escape(&report.pattern_detected),
            report.severity,
            html_escape(&report.instance),
            html_escape(&format_window(report)),
            html_escape(&report.details)
        )
    }

    async fn send(&self, report: &Report) -> Result<()> {
        let email = Message::builder()
            .from(self.from.parse()?)
            .to(self.to.parse()?)
            .subject(Self::subject(report))
            .header(ContentType::TEXT_HTML)
            .body(Self::format_body(report))?;

        self.transport.send(email).await?;
        Ok(())
    }
}

/// Instance labels and details come from scraped data and must not inject markup
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[async_trait]
impl NotifierSink for EmailSink {
    fn name(&self) -> &str {
        "email"
    }

    async fn deliver(&self, report: &Report) {
        match self.send(report).await {
            Ok(()) => info!(report_id = report.id, to = %self.to, "Email alert sent"),
            Err(e) => error!(report_id = report.id, error = %e, "Failed to send email alert"),
        }
    }
}
