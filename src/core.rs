//! Core domain types and service traits for pulsewatch
//!
//! This module defines the fundamental data structures and trait contracts
//! that govern component interactions throughout the application.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The classified outcome of a single reachability probe.
///
/// Returned by value and pattern-matched exhaustively; failure kinds are
/// never raised as errors past the transport boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// The service answered with a 2xx response.
    Online,
    /// Connection refused or otherwise unreachable.
    Offline,
    /// The call exceeded its deadline.
    Timeout,
    /// The service answered, but with a non-2xx status.
    ErrorStatus,
    /// The circuit breaker short-circuited the call; no network I/O happened.
    CircuitOpen,
}

/// The full result of one health probe against a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthVerdict {
    pub status: HealthStatus,
    /// HTTP status code, when a response was received.
    pub status_code: Option<u16>,
    /// Decoded JSON body, when the response carried one.
    pub payload: Option<serde_json::Value>,
    /// Human-readable failure detail.
    pub error: Option<String>,
    /// Wall-clock time spent on the call.
    pub latency: Duration,
}

impl HealthVerdict {
    pub fn online(status_code: u16, payload: Option<serde_json::Value>, latency: Duration) -> Self {
        Self {
            status: HealthStatus::Online,
            status_code: Some(status_code),
            payload,
            error: None,
            latency,
        }
    }

    pub fn offline(error: impl Into<String>, latency: Duration) -> Self {
        Self {
            status: HealthStatus::Offline,
            status_code: None,
            payload: None,
            error: Some(error.into()),
            latency,
        }
    }

    pub fn timeout(latency: Duration) -> Self {
        Self {
            status: HealthStatus::Timeout,
            status_code: None,
            payload: None,
            error: Some("deadline exceeded".to_string()),
            latency,
        }
    }

    pub fn error_status(status_code: u16, error: impl Into<String>, latency: Duration) -> Self {
        Self {
            status: HealthStatus::ErrorStatus,
            status_code: Some(status_code),
            payload: None,
            error: Some(error.into()),
            latency,
        }
    }

    pub fn circuit_open(remaining: Duration) -> Self {
        Self {
            status: HealthStatus::CircuitOpen,
            status_code: None,
            payload: None,
            error: Some(format!(
                "circuit open for another {:.1}s",
                remaining.as_secs_f64()
            )),
            latency: Duration::ZERO,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == HealthStatus::Online
    }

    /// One-line reason string for operator-facing output.
    pub fn reason(&self) -> String {
        match self.status {
            HealthStatus::Online => format!("ok in {}ms", self.latency.as_millis()),
            HealthStatus::Offline => format!(
                "offline: {}",
                self.error.as_deref().unwrap_or("unreachable")
            ),
            HealthStatus::Timeout => format!("timeout after {}ms", self.latency.as_millis()),
            HealthStatus::ErrorStatus => format!(
                "bad status {}",
                self.status_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "unknown".to_string())
            ),
            HealthStatus::CircuitOpen => self
                .error
                .clone()
                .unwrap_or_else(|| "circuit open".to_string()),
        }
    }
}

/// A recipient sourced from the external subscriber registry. Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub email: String,
    pub name: String,
    pub email_consent: bool,
    pub sms_consent: bool,
    pub active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl Subscriber {
    /// Convenience constructor for an active, email-consenting subscriber.
    pub fn consenting(email: &str, name: &str) -> Self {
        Self {
            email: email.to_string(),
            name: name.to_string(),
            email_consent: true,
            sms_consent: false,
            active: true,
            created_at: None,
        }
    }
}

/// A per-symbol analysis result sourced from the external analytics service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub symbol: String,
    pub current_price: f64,
    pub change_percent: f64,
    pub trend: String,
    pub signal: String,
    pub anomalies: Vec<Anomaly>,
}

/// One anomaly embedded in an analysis snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: String,
    pub severity: String,
    pub message: String,
    pub current_value: f64,
    pub threshold: f64,
}

/// Outcome of a single dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Sent,
    Failed,
    Pending,
}

/// Append-only audit record, one per dispatch attempt. Never updated in
/// place; a retry produces a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub user_email: String,
    /// None means a portfolio-wide notification.
    pub symbol: Option<String>,
    pub notification_type: String,
    pub status: NotificationStatus,
    pub sent_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

/// Counts and raw records returned by an audit window query.
#[derive(Debug, Clone, Default)]
pub struct AuditSummary {
    pub sent: usize,
    pub failed: usize,
    pub pending: usize,
    /// Newest first.
    pub records: Vec<NotificationRecord>,
}

// =============================================================================
// Service Traits
// =============================================================================

/// Delivers one composed notification to one recipient. Transport details
/// (SMTP relay, webhook, queue) live behind this seam.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// A unique, descriptive name for the sink (e.g., "email-gateway").
    /// Used for logging and metrics.
    fn name(&self) -> &str;

    /// Sends one message. `Err` means this recipient's delivery failed;
    /// it must never abort the surrounding batch.
    async fn deliver(&self, to_email: &str, subject: &str, body: &str) -> Result<()>;
}

/// Append-only store of dispatch outcomes with a windowed read side.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Appends a record. Records are immutable once written.
    async fn append(&self, record: NotificationRecord) -> Result<()>;

    /// Returns records newer than `since_hours` ago, newest first, plus
    /// counts grouped by status.
    async fn query_since(&self, since_hours: i64) -> Result<AuditSummary>;
}
