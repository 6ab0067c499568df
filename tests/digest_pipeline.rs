//! End-to-end tests for the digest and alert pipelines: upstream fetch,
//! composition, dispatch, and audit, with the external services mocked.

use pulsewatch::aggregator::DataAggregator;
use pulsewatch::audit::JsonlAuditStore;
use pulsewatch::breaker::{BreakerConfig, CircuitRegistry};
use pulsewatch::core::{AuditStore, DeliverySink, NotificationStatus};
use pulsewatch::dispatch::{Dispatcher, HttpEmailSink};
use pulsewatch::transport::TransportClient;
use pulsewatch::app::App;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn subscriber_body() -> serde_json::Value {
    json!({
        "success": true,
        "data": {
            "subscriptions": [
                {"email": "ada@x.com", "name": "Ada"},
                {"email": "bo@x.com", "name": "Bo"},
                {"email": "cy@x.com", "name": "Cy"}
            ]
        }
    })
}

fn analysis_body(with_anomaly: bool) -> serde_json::Value {
    let anomalies = if with_anomaly {
        json!([{"type": "price_spike", "severity": "high",
                "message": "price 8% above the 20-day average",
                "current_value": 412.0, "threshold": 380.0}])
    } else {
        json!([])
    };
    json!([
        {"symbol": "AAPL", "current_price": 189.44, "change_percent": 1.2,
         "trend": "bullish", "signals": {"signal": "buy"}, "anomalies": []},
        {"symbol": "MSFT", "current_price": 412.0, "change_percent": -0.4,
         "trend": "bearish", "signals": {"signal": "hold"}, "anomalies": anomalies}
    ])
}

async fn mount_upstreams(server: &MockServer, with_anomaly: bool) {
    Mock::given(method("GET"))
        .and(path("/api/email-subscriptions/email-consent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(subscriber_body()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/analysis/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(analysis_body(with_anomaly)))
        .mount(server)
        .await;
}

fn build_app(server_uri: &str, audit_path: std::path::PathBuf) -> App {
    let circuits = Arc::new(CircuitRegistry::new(BreakerConfig {
        max_attempts: 1,
        ..Default::default()
    }));
    let aggregator = DataAggregator::new(
        TransportClient::new(),
        circuits,
        server_uri.to_string(),
        server_uri.to_string(),
        Duration::from_secs(2),
    );
    let sink: Arc<dyn DeliverySink> = Arc::new(HttpEmailSink::new(
        server_uri.to_string(),
        Duration::from_secs(2),
    ));
    let audit: Arc<dyn AuditStore> = Arc::new(JsonlAuditStore::new(audit_path));
    App::new(aggregator, Dispatcher::new(sink, audit))
}

#[tokio::test]
async fn daily_digest_dispatches_and_audits_every_recipient() {
    let server = MockServer::start().await;
    mount_upstreams(&server, false).await;

    // The gateway rejects one recipient; the batch must press on.
    Mock::given(method("POST"))
        .and(path("/api/notifications/email"))
        .and(query_param("to_email", "bo@x.com"))
        .respond_with(ResponseTemplate::new(502))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/notifications/email"))
        .respond_with(ResponseTemplate::new(200))
        .with_priority(5)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let app = build_app(&server.uri(), audit_path.clone());

    let summary = app.run_daily_digest().await.unwrap();
    assert_eq!(summary.sent, 2);
    assert_eq!(summary.total, 3);

    // A record written by the dispatcher is retrievable through the reader
    // with its status preserved.
    let store = JsonlAuditStore::new(audit_path);
    let audit = store.query_since(1).await.unwrap();
    assert_eq!(audit.records.len(), 3);
    assert_eq!(audit.sent, 2);
    assert_eq!(audit.failed, 1);
    let failed = audit
        .records
        .iter()
        .find(|r| r.status == NotificationStatus::Failed)
        .unwrap();
    assert_eq!(failed.user_email, "bo@x.com");
    assert_eq!(failed.notification_type, "daily_digest");
    assert!(failed.error_message.as_ref().unwrap().contains("502"));
}

#[tokio::test]
async fn daily_digest_with_dead_upstreams_sends_nothing_and_does_not_fail() {
    // Nothing is listening at this address.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());
    drop(listener);

    let dir = TempDir::new().unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let app = build_app(&dead, audit_path.clone());

    let summary = app.run_daily_digest().await.unwrap();
    assert_eq!(summary.sent, 0);
    assert_eq!(summary.total, 0);

    let audit = JsonlAuditStore::new(audit_path).query_since(1).await.unwrap();
    assert!(audit.records.is_empty());
}

#[tokio::test]
async fn alert_pipeline_skips_when_no_anomalies() {
    let server = MockServer::start().await;
    mount_upstreams(&server, false).await;

    let dir = TempDir::new().unwrap();
    let app = build_app(&server.uri(), dir.path().join("audit.jsonl"));

    let result = app.run_alert_check().await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn alert_pipeline_sends_when_anomalies_present() {
    let server = MockServer::start().await;
    mount_upstreams(&server, true).await;
    Mock::given(method("POST"))
        .and(path("/api/notifications/email"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let app = build_app(&server.uri(), audit_path.clone());

    let summary = app.run_alert_check().await.unwrap().unwrap();
    assert_eq!(summary.sent, 3);
    assert_eq!(summary.total, 3);

    let audit = JsonlAuditStore::new(audit_path).query_since(1).await.unwrap();
    assert_eq!(audit.records.len(), 3);
    assert!(audit
        .records
        .iter()
        .all(|r| r.notification_type == "anomaly_alert"));
}
