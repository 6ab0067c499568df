//! Append-only audit log backed by a JSON-lines file.
//!
//! Each dispatch attempt appends exactly one line; records are never
//! rewritten. The read side filters by a time window and groups counts by
//! status for external reporting.

use crate::core::{AuditStore, AuditSummary, NotificationRecord, NotificationStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// File-backed [`AuditStore`] implementation.
///
/// Appends are serialized with an internal lock so concurrent dispatchers
/// cannot interleave partial lines.
pub struct JsonlAuditStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAuditStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AuditStore for JsonlAuditStore {
    async fn append(&self, record: NotificationRecord) -> Result<()> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening audit log {:?}", self.path))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn query_since(&self, since_hours: i64) -> Result<AuditSummary> {
        let cutoff = Utc::now() - ChronoDuration::hours(since_hours);

        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            // No file yet means no records yet.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(AuditSummary::default())
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading audit log {:?}", self.path))
            }
        };

        let mut records: Vec<NotificationRecord> = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<NotificationRecord>(line) {
                Ok(record) => {
                    if record.sent_at >= cutoff {
                        records.push(record);
                    }
                }
                Err(e) => {
                    warn!(lineno = lineno + 1, error = %e, "skipping malformed audit line");
                }
            }
        }

        records.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));

        let mut summary = AuditSummary {
            records,
            ..Default::default()
        };
        for record in &summary.records {
            match record.status {
                NotificationStatus::Sent => summary.sent += 1,
                NotificationStatus::Failed => summary.failed += 1,
                NotificationStatus::Pending => summary.pending += 1,
            }
        }
        Ok(summary)
    }
}
