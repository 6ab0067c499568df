//! Configuration management for pulsewatch
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to load configuration from a `pulsewatch.toml` file and merge it
//! with environment variables and command-line arguments.

use crate::breaker::BreakerConfig;
use crate::registry::ServiceEndpoint;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment, Provider,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration problems surfaced to the operator at startup or check
/// time. Fatal for the affected command only.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no services are configured; the checker has nothing to probe")]
    NoServices,
    #[error("delivery.notification_base_url is not set; cannot dispatch notifications")]
    MissingDeliveryEndpoint,
    #[error("sources.{0} is not set; cannot aggregate dispatch inputs")]
    MissingSourceEndpoint(&'static str),
}

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// Probe and fetch deadlines.
    pub transport: TransportConfig,
    /// Retry and circuit-breaker tunables.
    pub breaker: BreakerConfig,
    /// The static table of known backend services.
    pub services: Vec<ServiceEndpoint>,
    /// Candidate hostnames to probe when the network namespace is unknown.
    pub hosts: Vec<String>,
    /// Upstream data source endpoints.
    pub sources: SourcesConfig,
    /// Delivery gateway settings.
    pub delivery: DeliveryConfig,
    /// Audit log settings.
    pub audit: AuditConfig,
    /// Trigger schedule, for the external scheduler's reference.
    pub schedule: ScheduleConfig,
}

/// Probe and fetch deadlines.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TransportConfig {
    /// Per-call deadline in seconds.
    pub timeout_seconds: u64,
}

/// Upstream data source endpoints.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourcesConfig {
    /// Base URL of the subscriber registry service.
    pub subscriber_base_url: String,
    /// Base URL of the analytics service.
    pub analytics_base_url: String,
}

/// Delivery gateway settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeliveryConfig {
    /// Base URL of the notification gateway.
    pub notification_base_url: String,
}

/// Audit log settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuditConfig {
    /// Path of the append-only JSONL audit log.
    pub path: PathBuf,
}

/// Trigger cadence. The core does not schedule itself; these strings are
/// configuration handed to the external scheduler.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScheduleConfig {
    /// Cron line for the daily digest (weekdays 09:00 by default).
    pub daily_digest_cron: String,
}

impl Config {
    /// Loads the application configuration by layering sources: defaults,
    /// TOML file, environment, and CLI arguments.
    pub fn load(config_path: &str, cli: impl Provider) -> Result<Self> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            // Allow overriding with environment variables, e.g.
            // PULSEWATCH_LOG_LEVEL=debug
            .merge(Env::prefixed("PULSEWATCH_").split("__"))
            .merge(cli)
            .extract()?;
        Ok(config)
    }

    /// Checks everything the health checker needs.
    pub fn validate_for_checks(&self) -> Result<(), ConfigError> {
        if self.services.is_empty() {
            return Err(ConfigError::NoServices);
        }
        Ok(())
    }

    /// Checks everything the digest/alert pipelines need.
    pub fn validate_for_dispatch(&self) -> Result<(), ConfigError> {
        if self.delivery.notification_base_url.is_empty() {
            return Err(ConfigError::MissingDeliveryEndpoint);
        }
        if self.sources.subscriber_base_url.is_empty() {
            return Err(ConfigError::MissingSourceEndpoint("subscriber_base_url"));
        }
        if self.sources.analytics_base_url.is_empty() {
            return Err(ConfigError::MissingSourceEndpoint("analytics_base_url"));
        }
        Ok(())
    }

    pub fn transport_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.transport.timeout_seconds)
    }
}

// Defaults describe the conventional three-service deployment and make
// tests and first runs work without a config file.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            transport: TransportConfig { timeout_seconds: 5 },
            breaker: BreakerConfig::default(),
            services: vec![
                ServiceEndpoint {
                    key: "backend".to_string(),
                    name: "Application Backend".to_string(),
                    url_template: "http://{host}:{port}".to_string(),
                    health_path: "/".to_string(),
                    port: 8000,
                },
                ServiceEndpoint {
                    key: "data-api".to_string(),
                    name: "Data API".to_string(),
                    url_template: "http://{host}:{port}".to_string(),
                    health_path: "/health".to_string(),
                    port: 8001,
                },
                ServiceEndpoint {
                    key: "scheduler".to_string(),
                    name: "Job Scheduler".to_string(),
                    url_template: "http://{host}:{port}".to_string(),
                    health_path: "/health".to_string(),
                    port: 8080,
                },
            ],
            hosts: vec!["localhost".to_string(), "host.docker.internal".to_string()],
            sources: SourcesConfig {
                subscriber_base_url: "http://localhost:8000".to_string(),
                analytics_base_url: "http://localhost:8001".to_string(),
            },
            delivery: DeliveryConfig {
                notification_base_url: "http://localhost:8000".to_string(),
            },
            audit: AuditConfig {
                path: PathBuf::from("notifications.jsonl"),
            },
            schedule: ScheduleConfig {
                daily_digest_cron: "0 9 * * 1-5".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_three_services() {
        let config = Config::default();
        let keys: Vec<_> = config.services.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["backend", "data-api", "scheduler"]);
        assert!(config.validate_for_checks().is_ok());
        assert!(config.validate_for_dispatch().is_ok());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let toml = r#"
            log_level = "debug"

            [breaker]
            max_attempts = 5
            backoff_base_ms = 250
            failure_threshold = 2
            cooldown_seconds = 60
        "#;
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(toml))
            .extract()
            .expect("load");

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.breaker.max_attempts, 5);
        assert_eq!(config.breaker.failure_threshold, 2);
        // Untouched sections keep their defaults.
        assert_eq!(config.transport.timeout_seconds, 5);
    }

    #[test]
    fn test_missing_delivery_endpoint_is_config_error() {
        let mut config = Config::default();
        config.delivery.notification_base_url.clear();
        let err = config.validate_for_dispatch().unwrap_err();
        assert!(matches!(err, ConfigError::MissingDeliveryEndpoint));
    }
}
