//! Static service table and health checker.
//!
//! Knows every backend service by key and probes each through the guarded
//! transport, optionally under alternate hostnames for operational
//! diagnosis of network-namespace issues.

use crate::breaker::CircuitRegistry;
use crate::core::HealthVerdict;
use crate::transport::{Method, TransportClient};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// One known backend service. Defined at startup from configuration and
/// never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Stable key used for circuit-breaker state and lookups.
    pub key: String,
    /// Human-readable name for operator output.
    pub name: String,
    /// URL template with `{host}` and `{port}` placeholders.
    pub url_template: String,
    /// Path probed for health, e.g. "/health".
    pub health_path: String,
    pub port: u16,
}

impl ServiceEndpoint {
    /// Substitutes `host` into the template and appends the health path.
    pub fn health_url(&self, host: &str) -> String {
        let base = self
            .url_template
            .replace("{host}", host)
            .replace("{port}", &self.port.to_string());
        format!("{}{}", base.trim_end_matches('/'), self.health_path)
    }
}

/// Health checker over the static service table.
pub struct ServiceRegistry {
    services: Vec<ServiceEndpoint>,
    transport: TransportClient,
    circuits: Arc<CircuitRegistry>,
    timeout: Duration,
}

impl ServiceRegistry {
    pub fn new(
        services: Vec<ServiceEndpoint>,
        transport: TransportClient,
        circuits: Arc<CircuitRegistry>,
        timeout: Duration,
    ) -> Self {
        Self {
            services,
            transport,
            circuits,
            timeout,
        }
    }

    pub fn services(&self) -> &[ServiceEndpoint] {
        &self.services
    }

    /// Probes one service under the given host through the guarded call.
    ///
    /// An unknown key yields a descriptive `ErrorStatus` verdict rather
    /// than failing the caller's aggregate.
    pub async fn check_service(&self, key: &str, host: &str) -> (bool, HealthVerdict) {
        let Some(endpoint) = self.services.iter().find(|s| s.key == key) else {
            return (
                false,
                HealthVerdict::error_status(0, format!("unknown service key: {}", key), Duration::ZERO),
            );
        };

        let url = endpoint.health_url(host);
        let verdict = self
            .circuits
            .guarded_call(&endpoint.key, || {
                self.transport.call(&url, Method::Get, self.timeout, None)
            })
            .await;
        (verdict.is_online(), verdict)
    }

    /// Probes every registered service under `host`, concurrently.
    ///
    /// Total latency is bounded by the slowest single check, not the sum.
    pub async fn check_all_services(&self, host: &str) -> HashMap<String, (bool, HealthVerdict)> {
        let checks = self.services.iter().map(|endpoint| async {
            let result = self.check_service(&endpoint.key, host).await;
            (endpoint.key.clone(), result)
        });
        join_all(checks).await.into_iter().collect()
    }

    /// Probes every (host, service) pair, fully in parallel.
    ///
    /// Used to distinguish "service down" from "wrong hostname for this
    /// network namespace".
    pub async fn check_across_hosts(
        &self,
        hosts: &[String],
    ) -> HashMap<String, HashMap<String, (bool, HealthVerdict)>> {
        let per_host = hosts.iter().map(|host| async {
            (host.clone(), self.check_all_services(host).await)
        });
        join_all(per_host).await.into_iter().collect()
    }
}
