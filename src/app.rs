//! The orchestration entry points invoked by the external trigger.
//!
//! One invocation of either pipeline fans out to the upstream services,
//! composes the notification body, dispatches it per recipient, and
//! leaves audit records. Neither pipeline raises past this boundary for
//! upstream failures; the worst case is zero notifications sent and a
//! warning logged.

use crate::aggregator::DataAggregator;
use crate::audit::JsonlAuditStore;
use crate::breaker::CircuitRegistry;
use crate::compose::{compose_alert_digest, compose_daily_digest};
use crate::config::Config;
use crate::core::{AuditStore, DeliverySink};
use crate::dispatch::{DispatchSummary, Dispatcher, HttpEmailSink};
use crate::registry::ServiceRegistry;
use crate::transport::TransportClient;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Wires the pipeline components together and guards against overlapping
/// trigger invocations.
pub struct App {
    aggregator: DataAggregator,
    dispatcher: Dispatcher,
    /// Held for the duration of one pipeline run. A trigger that fires
    /// while the previous run still holds it is skipped, not queued.
    run_guard: Mutex<()>,
}

impl App {
    /// Builds the app from configuration with the real HTTP sink and the
    /// file-backed audit store.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate_for_dispatch()?;
        let circuits = Arc::new(CircuitRegistry::new(config.breaker.clone()));
        let transport = TransportClient::new();

        let aggregator = DataAggregator::new(
            transport,
            circuits,
            config.sources.subscriber_base_url.clone(),
            config.sources.analytics_base_url.clone(),
            config.transport_timeout(),
        );
        let sink: Arc<dyn DeliverySink> = Arc::new(HttpEmailSink::new(
            config.delivery.notification_base_url.clone(),
            config.transport_timeout(),
        ));
        let audit: Arc<dyn AuditStore> = Arc::new(JsonlAuditStore::new(config.audit.path.clone()));

        Ok(Self::new(aggregator, Dispatcher::new(sink, audit)))
    }

    /// Assembles the app from pre-built components. Used by tests to
    /// substitute fakes behind the trait seams.
    pub fn new(aggregator: DataAggregator, dispatcher: Dispatcher) -> Self {
        Self {
            aggregator,
            dispatcher,
            run_guard: Mutex::new(()),
        }
    }

    /// Runs the daily digest pipeline once.
    ///
    /// Empty subscriber or analysis lists mean "nothing to do" and return
    /// a zero summary without error.
    pub async fn run_daily_digest(&self) -> Result<DispatchSummary> {
        let Ok(_guard) = self.run_guard.try_lock() else {
            warn!("previous pipeline run still in progress, skipping this trigger");
            return Ok(DispatchSummary::default());
        };

        info!("daily digest run starting");
        let (subscribers, analysis) = self.aggregator.collect_dispatch_inputs().await;
        if subscribers.is_empty() {
            warn!("no eligible subscribers, nothing to send");
            return Ok(DispatchSummary::default());
        }
        if analysis.is_empty() {
            warn!("no analysis data, nothing to send");
            return Ok(DispatchSummary::default());
        }

        let today = Utc::now().date_naive();
        let body = compose_daily_digest(&analysis, today);
        let subject = format!("Daily Market Digest for {}", today);

        let summary = self
            .dispatcher
            .dispatch_batch(&subscribers, &subject, &body, "daily_digest", None)
            .await;
        info!(sent = summary.sent, total = summary.total, "daily digest run finished");
        Ok(summary)
    }

    /// Runs the anomaly alert pipeline once.
    ///
    /// Returns `None` when no snapshot exhibits anomalies, meaning no
    /// alert was composed or sent.
    pub async fn run_alert_check(&self) -> Result<Option<DispatchSummary>> {
        let Ok(_guard) = self.run_guard.try_lock() else {
            warn!("previous pipeline run still in progress, skipping this trigger");
            return Ok(None);
        };

        info!("anomaly alert run starting");
        let (subscribers, analysis) = self.aggregator.collect_dispatch_inputs().await;
        if subscribers.is_empty() {
            warn!("no eligible subscribers, nothing to send");
            return Ok(None);
        }

        let Some(body) = compose_alert_digest(&analysis) else {
            info!("no anomalies detected, no alert sent");
            return Ok(None);
        };

        let summary = self
            .dispatcher
            .dispatch_batch(&subscribers, "Market Anomaly Alert", &body, "anomaly_alert", None)
            .await;
        info!(sent = summary.sent, total = summary.total, "anomaly alert run finished");
        Ok(Some(summary))
    }
}

/// Builds the operational health checker from configuration.
pub fn service_registry_from_config(config: &Config) -> ServiceRegistry {
    ServiceRegistry::new(
        config.services.clone(),
        TransportClient::new(),
        Arc::new(CircuitRegistry::new(config.breaker.clone())),
        config.transport_timeout(),
    )
}
