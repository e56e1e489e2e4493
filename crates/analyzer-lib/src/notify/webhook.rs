//! Chat webhook sink (Google Chat card format)

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info};

use super::{format_window, NotifierSink};
use crate::models::Report;

const ALERT_ICON_URL: &str = "https://cdn-icons-png.flaticon.com/512/8706/8706488.png";

/// Posts a card message to an incoming chat webhook
pub struct ChatWebhookSink {
    client: Client,
    url: String,
}

impl ChatWebhookSink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    fn render_card(report: &Report) -> Value {
        json!({
            "cardsV2": [{
                "cardId": "alertCard",
                "card": {
                    "header": {
                        "title": format!("Prometheus Analysis Alert: {}", report.pattern_detected),
                        "subtitle": format!("Metric: {} | Severity: {}", report.metric_name, report.severity),
                        "imageUrl": ALERT_ICON_URL,
                    },
                    "sections": [{
                        "widgets": [
                            {
                                "decoratedText": {
                                    "topLabel": "Details",
                                    "text": report.details,
                                }
                            },
                            {
                                "decoratedText": {
                                    "topLabel": "Time Window",
                                    "text": format_window(report),
                                }
                            }
                        ]
                    }]
                }
            }]
        })
    }

    async fn send(&self, report: &Report) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&Self::render_card(report))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("webhook returned {}: {}", status, body);
        }
        Ok(())
    }
}

#[async_trait]
impl NotifierSink for ChatWebhookSink {
    fn name(&self) -> &str {
        "chat_webhook"
    }

    async fn deliver(&self, report: &Report) {
        match self.send(report).await {
            Ok(()) => info!(report_id = report.id, "Chat webhook alert sent"),
            Err(e) => error!(report_id = report.id, error = %e, "Failed to send chat webhook alert"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use chrono::Utc;

    #[test]
    fn test_render_card() {
        let now = Utc::now();
        let report = Report {
            id: 3,
            metric_name: "cpu_sustained_high".to_string(),
            pattern_detected: "Sustained High CPU Load".to_string(),
            severity: Severity::Critical,
            instance: "host-1".to_string(),
            start_time: now,
            end_time: now,
            details: "Instance 'host-1' is busy".to_string(),
            created_at: now,
        };

        let card = ChatWebhookSink::render_card(&report);
        let header = &card["cardsV2"][0]["card"]["header"];
        assert_eq!(header["title"], "Prometheus Analysis Alert: Sustained High CPU Load");
        assert_eq!(header["subtitle"], "Metric: cpu_sustained_high | Severity: critical");

        let widgets = &card["cardsV2"][0]["card"]["sections"][0]["widgets"];
        assert_eq!(widgets[0]["decoratedText"]["text"], "Instance 'host-1' is busy");
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_swallowed() {
        let sink = ChatWebhookSink::new("http://127.0.0.1:9/hook").unwrap();
        let now = Utc::now();
        let report = Report {
            id: 1,
            metric_name: "m".to_string(),
            pattern_detected: "p".to_string(),
            severity: Severity::Warning,
            instance: "i".to_string(),
            start_time: now,
            end_time: now,
            details: String::new(),
            created_at: now,
        };

        // Must return normally even though delivery fails
        sink.deliver(&report).await;
    }
}
