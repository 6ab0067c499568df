//! HTTP transport client for health probes and upstream data fetches.
//!
//! Performs a single outbound call with a bounded deadline and classifies
//! the outcome into a [`HealthVerdict`]. No retries happen here; that is
//! the circuit breaker's job.

use crate::core::HealthVerdict;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Floor applied when a caller passes a non-positive timeout.
const MIN_TIMEOUT: Duration = Duration::from_millis(100);

/// HTTP method for a probe. Only the two verbs the upstream surfaces use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Stateless single-shot HTTP caller.
///
/// The underlying `reqwest::Client` holds the connection pool; per-call
/// deadlines are applied on each request rather than on the client so a
/// shared instance can serve callers with different budgets.
#[derive(Clone)]
pub struct TransportClient {
    client: reqwest::Client,
}

impl Default for TransportClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Performs one call against `url` and classifies the outcome.
    ///
    /// Always returns within `timeout` plus a small constant overhead.
    /// Connection-level failures map to `Offline`, an exceeded deadline to
    /// `Timeout`, a non-2xx response to `ErrorStatus` (carrying the code),
    /// and success to `Online` with the decoded JSON body when present.
    pub async fn call(
        &self,
        url: &str,
        method: Method,
        timeout: Duration,
        params: Option<&[(&str, String)]>,
    ) -> HealthVerdict {
        let timeout = if timeout.is_zero() {
            warn!(url, "non-positive timeout requested, clamping to {:?}", MIN_TIMEOUT);
            MIN_TIMEOUT
        } else {
            timeout
        };

        let mut request = match method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };
        if let Some(params) = params {
            request = request.query(params);
        }

        let start = Instant::now();
        let result = request.timeout(timeout).send().await;
        let latency = start.elapsed();
        metrics::histogram!("transport_call_duration_seconds").record(latency.as_secs_f64());

        match result {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    // Bodies are optional JSON; a decode failure is not a
                    // health failure.
                    let payload = response.json::<serde_json::Value>().await.ok();
                    debug!(url, status = %status, latency_ms = latency.as_millis() as u64, "probe ok");
                    HealthVerdict::online(status.as_u16(), payload, latency)
                } else {
                    let text = response.text().await.unwrap_or_default();
                    debug!(url, status = %status, "probe returned error status");
                    HealthVerdict::error_status(status.as_u16(), text, latency)
                }
            }
            Err(e) if e.is_timeout() => {
                debug!(url, "probe timed out");
                HealthVerdict::timeout(latency)
            }
            Err(e) => {
                debug!(url, error = %e, "probe failed to connect");
                HealthVerdict::offline(e.to_string(), latency)
            }
        }
    }
}
