//! Aggregates dispatch inputs from the upstream services.
//!
//! Fetches the consenting-subscriber list and the current analysis
//! snapshots concurrently, decoding both defensively. A failed or
//! malformed upstream degrades to an empty collection; callers treat an
//! empty side as "nothing to do".

use crate::breaker::CircuitRegistry;
use crate::core::{AnalysisSnapshot, Anomaly, Subscriber};
use crate::transport::{Method, TransportClient};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Circuit-breaker keys for the two upstream data sources.
const SUBSCRIBER_KEY: &str = "subscriber-registry";
const ANALYTICS_KEY: &str = "analytics";

// Upstream payloads are decoded through per-endpoint DTOs with explicit
// defaults, never assumed well-formed.

#[derive(Debug, Default, Deserialize)]
struct ConsentEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: ConsentData,
}

#[derive(Debug, Default, Deserialize)]
struct ConsentData {
    #[serde(default)]
    subscriptions: Vec<SubscriptionDto>,
}

#[derive(Debug, Default, Deserialize)]
struct SubscriptionDto {
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
    #[serde(default, rename = "createdAt")]
    created_at: Option<DateTime<Utc>>,
    // The consent endpoint only returns subscribers who granted email
    // consent; absent flags default accordingly.
    #[serde(default = "default_true", rename = "emailConsent")]
    email_consent: bool,
    #[serde(default, rename = "smsConsent")]
    sms_consent: bool,
    #[serde(default = "default_true")]
    active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
struct AnalysisDto {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    current_price: f64,
    #[serde(default)]
    change_percent: f64,
    #[serde(default)]
    trend: String,
    #[serde(default)]
    signals: SignalsDto,
    #[serde(default)]
    anomalies: Vec<AnomalyDto>,
}

#[derive(Debug, Default, Deserialize)]
struct SignalsDto {
    #[serde(default)]
    signal: String,
}

#[derive(Debug, Default, Deserialize)]
struct AnomalyDto {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    current_value: f64,
    #[serde(default)]
    threshold: f64,
}

/// Fetches and reduces the two upstream collections the dispatch pipeline
/// consumes.
pub struct DataAggregator {
    transport: TransportClient,
    circuits: Arc<CircuitRegistry>,
    subscriber_base_url: String,
    analytics_base_url: String,
    timeout: Duration,
}

impl DataAggregator {
    pub fn new(
        transport: TransportClient,
        circuits: Arc<CircuitRegistry>,
        subscriber_base_url: String,
        analytics_base_url: String,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            circuits,
            subscriber_base_url,
            analytics_base_url,
            timeout,
        }
    }

    /// Fetches subscribers and analysis snapshots concurrently.
    ///
    /// Either side failing yields an empty list for that side; the other
    /// side is still returned.
    pub async fn collect_dispatch_inputs(&self) -> (Vec<Subscriber>, Vec<AnalysisSnapshot>) {
        let (subscribers, analysis) =
            tokio::join!(self.fetch_subscribers(), self.fetch_analysis());
        debug!(
            subscribers = subscribers.len(),
            snapshots = analysis.len(),
            "collected dispatch inputs"
        );
        (subscribers, analysis)
    }

    /// Fetches the consenting-subscriber list, deduplicated by email.
    pub async fn fetch_subscribers(&self) -> Vec<Subscriber> {
        let url = format!(
            "{}/api/email-subscriptions/email-consent",
            self.subscriber_base_url.trim_end_matches('/')
        );
        let verdict = self
            .circuits
            .guarded_call(SUBSCRIBER_KEY, || {
                self.transport.call(&url, Method::Get, self.timeout, None)
            })
            .await;

        if !verdict.is_online() {
            warn!(reason = %verdict.reason(), "subscriber registry unavailable, proceeding with zero recipients");
            return Vec::new();
        }

        let envelope: ConsentEnvelope = match verdict.payload {
            Some(payload) => match serde_json::from_value(payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(error = %e, "malformed subscriber payload, proceeding with zero recipients");
                    return Vec::new();
                }
            },
            None => {
                warn!("subscriber registry returned no payload");
                return Vec::new();
            }
        };

        if !envelope.success {
            warn!("subscriber registry reported success=false");
            return Vec::new();
        }

        let subscribers = envelope
            .data
            .subscriptions
            .into_iter()
            .map(|dto| Subscriber {
                email: dto.email,
                name: dto.name,
                email_consent: dto.email_consent,
                sms_consent: dto.sms_consent,
                active: dto.active,
                created_at: dto.created_at,
            })
            .collect();
        dedupe_by_email(subscribers)
    }

    /// Fetches the current per-symbol analysis snapshots.
    pub async fn fetch_analysis(&self) -> Vec<AnalysisSnapshot> {
        let url = format!(
            "{}/api/analysis/all",
            self.analytics_base_url.trim_end_matches('/')
        );
        let verdict = self
            .circuits
            .guarded_call(ANALYTICS_KEY, || {
                self.transport.call(&url, Method::Get, self.timeout, None)
            })
            .await;

        if !verdict.is_online() {
            warn!(reason = %verdict.reason(), "analytics service unavailable, proceeding with zero snapshots");
            return Vec::new();
        }

        let dtos: Vec<AnalysisDto> = match verdict.payload {
            Some(payload) => match serde_json::from_value(payload) {
                Ok(dtos) => dtos,
                Err(e) => {
                    warn!(error = %e, "malformed analytics payload, proceeding with zero snapshots");
                    return Vec::new();
                }
            },
            None => {
                warn!("analytics service returned no payload");
                return Vec::new();
            }
        };

        dtos.into_iter()
            .map(|dto| AnalysisSnapshot {
                symbol: dto.symbol,
                current_price: dto.current_price,
                change_percent: dto.change_percent,
                trend: dto.trend,
                signal: dto.signals.signal,
                anomalies: dto
                    .anomalies
                    .into_iter()
                    .map(|a| Anomaly {
                        kind: a.kind,
                        severity: a.severity,
                        message: a.message,
                        current_value: a.current_value,
                        threshold: a.threshold,
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Deduplicates by email, last-seen wins, keeping first-seen order.
/// Upstream is authoritative, so the later entry is assumed fresher.
fn dedupe_by_email(subscribers: Vec<Subscriber>) -> Vec<Subscriber> {
    let mut index_by_email: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Subscriber> = Vec::with_capacity(subscribers.len());
    for subscriber in subscribers {
        if subscriber.email.is_empty() {
            continue;
        }
        match index_by_email.get(&subscriber.email) {
            Some(&i) => out[i] = subscriber,
            None => {
                index_by_email.insert(subscriber.email.clone(), out.len());
                out.push(subscriber);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn aggregator(subscriber_base: &str, analytics_base: &str) -> DataAggregator {
        DataAggregator::new(
            TransportClient::new(),
            Arc::new(CircuitRegistry::new(BreakerConfig {
                max_attempts: 1,
                ..Default::default()
            })),
            subscriber_base.to_string(),
            analytics_base.to_string(),
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn test_collects_both_sides() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/email-subscriptions/email-consent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "subscriptions": [
                        {"email": "a@x.com", "name": "Ada", "createdAt": "2026-08-01T09:00:00Z"},
                        {"email": "b@x.com", "name": "Bo"}
                    ]
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/analysis/all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "symbol": "AAPL",
                    "current_price": 189.44,
                    "change_percent": 1.2,
                    "trend": "bullish",
                    "signals": {"signal": "buy"},
                    "anomalies": [
                        {"type": "price_spike", "severity": "high",
                         "message": "price 8% above average",
                         "current_value": 189.44, "threshold": 175.0}
                    ]
                }
            ])))
            .mount(&server)
            .await;

        let aggregator = aggregator(&server.uri(), &server.uri());
        let (subscribers, analysis) = aggregator.collect_dispatch_inputs().await;

        assert_eq!(subscribers.len(), 2);
        assert_eq!(subscribers[0].email, "a@x.com");
        assert!(subscribers[0].email_consent);
        assert!(subscribers[0].active);

        assert_eq!(analysis.len(), 1);
        assert_eq!(analysis[0].symbol, "AAPL");
        assert_eq!(analysis[0].signal, "buy");
        assert_eq!(analysis[0].anomalies[0].message, "price 8% above average");
    }

    #[tokio::test]
    async fn test_one_side_down_degrades_to_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/analysis/all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"symbol": "MSFT", "current_price": 412.0, "change_percent": -0.4,
                 "trend": "bearish", "signals": {"signal": "hold"}, "anomalies": []}
            ])))
            .mount(&server)
            .await;

        // Subscriber registry points at a dead port.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let dead = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());
        drop(listener);

        let aggregator = aggregator(&dead, &server.uri());
        let (subscribers, analysis) = aggregator.collect_dispatch_inputs().await;

        assert!(subscribers.is_empty());
        assert_eq!(analysis.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_degrades_to_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/analysis/all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"not": "a list"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/email-subscriptions/email-consent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
            .mount(&server)
            .await;

        let aggregator = aggregator(&server.uri(), &server.uri());
        let (subscribers, analysis) = aggregator.collect_dispatch_inputs().await;

        assert!(subscribers.is_empty());
        assert!(analysis.is_empty());
    }

    #[test]
    fn test_dedupe_last_seen_wins_keeps_order() {
        let subscribers = vec![
            Subscriber::consenting("a@x.com", "Ada"),
            Subscriber::consenting("b@x.com", "Bo"),
            Subscriber::consenting("a@x.com", "Ada Newer"),
            Subscriber::consenting("", "Nameless"),
        ];

        let deduped = dedupe_by_email(subscribers);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].email, "a@x.com");
        assert_eq!(deduped[0].name, "Ada Newer");
        assert_eq!(deduped[1].email, "b@x.com");
    }
}
