//! NATS message producer for analytics reports

use crate::analytics::report::AnalyticsReport;
use anyhow::{Context, Result};
use async_nats::Client;
use tracing::debug;

/// Producer for publishing analytics reports to NATS
#[derive(Clone)]
pub struct ReportProducer {
    client: Client,
    subject: String,
}

impl ReportProducer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Publish a report
    pub async fn publish(&self, report: &AnalyticsReport) -> Result<()> {
        let payload = serde_json::to_vec(report).context("Failed to serialize report")?;
        let size = payload.len();

        self.client
            .publish(self.subject.clone(), payload.into())
            .await
            .context("Failed to publish report")?;

        debug!(
            fingerprint = report.fingerprint,
            records = report.aggregate.total,
            bytes = size,
            "Published analytics report"
        );

        Ok(())
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}
