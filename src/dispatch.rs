//! Batch notification dispatch with per-recipient auditing.
//!
//! One recipient's delivery failure never aborts the batch and never
//! raises past this boundary; every attempt leaves exactly one audit
//! record.

use crate::core::{
    AuditStore, DeliverySink, NotificationRecord, NotificationStatus, Subscriber,
};
use crate::compose::personalize;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors a delivery sink can surface for a single recipient.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery endpoint rejected message: status {status}")]
    Rejected { status: u16 },
    #[error("delivery endpoint unreachable: {0}")]
    Unreachable(String),
}

/// Aggregate result of one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    pub total: usize,
}

/// Sends each (recipient, payload) pair through the delivery sink and
/// records the outcome in the audit store.
pub struct Dispatcher {
    sink: Arc<dyn DeliverySink>,
    audit: Arc<dyn AuditStore>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn DeliverySink>, audit: Arc<dyn AuditStore>) -> Self {
        Self { sink, audit }
    }

    /// Dispatches `body` to every eligible subscriber, personalized per
    /// recipient.
    ///
    /// Recipients without an email, inactive ones, or ones without email
    /// consent are skipped up front; the consent re-check is deliberate
    /// even though upstream already filters. Delivery is sequential, and a
    /// failure for one recipient records a failed audit entry and moves on.
    pub async fn dispatch_batch(
        &self,
        subscribers: &[Subscriber],
        subject: &str,
        body: &str,
        notification_type: &str,
        symbol: Option<&str>,
    ) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        for subscriber in subscribers {
            if subscriber.email.is_empty() {
                warn!("skipping subscriber with empty email");
                continue;
            }
            if !subscriber.active || !subscriber.email_consent {
                warn!(
                    email = %subscriber.email,
                    active = subscriber.active,
                    consent = subscriber.email_consent,
                    "skipping non-eligible subscriber at dispatch boundary"
                );
                continue;
            }

            summary.total += 1;
            let personalized = personalize(body, &subscriber.name);

            let (status, error_message) = match self
                .sink
                .deliver(&subscriber.email, subject, &personalized)
                .await
            {
                Ok(()) => {
                    summary.sent += 1;
                    metrics::counter!("notifications_sent_total").increment(1);
                    (NotificationStatus::Sent, None)
                }
                Err(e) => {
                    error!(email = %subscriber.email, error = %e, "delivery failed");
                    metrics::counter!("notifications_failed_total").increment(1);
                    (NotificationStatus::Failed, Some(e.to_string()))
                }
            };

            let record = NotificationRecord {
                user_email: subscriber.email.clone(),
                symbol: symbol.map(|s| s.to_string()),
                notification_type: notification_type.to_string(),
                status,
                sent_at: Utc::now(),
                error_message,
            };
            if let Err(e) = self.audit.append(record).await {
                // Losing an audit row must not stop the batch either.
                error!(email = %subscriber.email, error = %e, "failed to append audit record");
            }
        }

        info!(
            sent = summary.sent,
            total = summary.total,
            notification_type,
            "dispatch batch finished"
        );
        summary
    }
}

/// Delivery sink backed by the external notification gateway's HTTP API.
pub struct HttpEmailSink {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpEmailSink {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            timeout,
        }
    }
}

#[async_trait]
impl DeliverySink for HttpEmailSink {
    fn name(&self) -> &str {
        "email-gateway"
    }

    async fn deliver(&self, to_email: &str, subject: &str, body: &str) -> Result<()> {
        let url = format!(
            "{}/api/notifications/email",
            self.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .query(&[("to_email", to_email), ("subject", subject), ("body", body)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| DeliveryError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Rejected {
                status: status.as_u16(),
            }
            .into())
        }
    }
}
