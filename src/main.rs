//! pulsewatch - service health checks and notification dispatch
//!
//! Operational binary invoked by operators and by the external scheduler:
//! `check` probes the known services, `digest` and `alert` run the two
//! notification pipelines once, and `audit` summarizes recent outcomes.

use anyhow::Result;
use clap::Parser;
use pulsewatch::{
    app::{service_registry_from_config, App},
    audit::JsonlAuditStore,
    cli::{Cli, Command},
    config::Config,
    core::AuditStore,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| "pulsewatch.toml".into());
    let config = match Config::load(&config_path.to_string_lossy(), cli.clone()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    info!("pulsewatch starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Probe Timeout: {}s", config.transport.timeout_seconds);
    info!(
        "Breaker: {} attempts, {}ms base backoff, threshold {}, cooldown {}s",
        config.breaker.max_attempts,
        config.breaker.backoff_base_ms,
        config.breaker.failure_threshold,
        config.breaker.cooldown_seconds
    );
    info!("Services: {}", config.services.len());
    info!("Subscriber Registry: {}", config.sources.subscriber_base_url);
    info!("Analytics Service: {}", config.sources.analytics_base_url);
    info!("Delivery Gateway: {}", config.delivery.notification_base_url);
    info!("Audit Log: {}", config.audit.path.display());
    info!("Digest Schedule: {}", config.schedule.daily_digest_cron);
    info!("-------------------------------------------------------");

    match &cli.command {
        Command::Check { host } => {
            config.validate_for_checks()?;
            let registry = service_registry_from_config(&config);
            let hosts = if host.is_empty() {
                config.hosts.clone()
            } else {
                host.clone()
            };

            let results = registry.check_across_hosts(&hosts).await;
            let mut any_online_per_service: std::collections::HashMap<&str, bool> =
                config.services.iter().map(|s| (s.key.as_str(), false)).collect();

            for host in &hosts {
                println!("host {}:", host);
                let Some(by_service) = results.get(host) else {
                    continue;
                };
                for service in &config.services {
                    let Some((online, verdict)) = by_service.get(&service.key) else {
                        continue;
                    };
                    let mark = if *online { "PASS" } else { "FAIL" };
                    println!("  [{}] {} ({})", mark, service.name, verdict.reason());
                    if *online {
                        any_online_per_service.insert(service.key.as_str(), true);
                    }
                }
            }

            let unreachable: Vec<&str> = any_online_per_service
                .iter()
                .filter(|&(_, &online)| !online)
                .map(|(key, _)| *key)
                .collect();
            if !unreachable.is_empty() {
                error!(services = ?unreachable, "some services are unreachable under every candidate host");
                std::process::exit(1);
            }
        }
        Command::Digest => {
            let app = App::from_config(&config)?;
            let summary = app.run_daily_digest().await?;
            println!("daily digest: sent {}/{}", summary.sent, summary.total);
        }
        Command::Alert => {
            let app = App::from_config(&config)?;
            match app.run_alert_check().await? {
                Some(summary) => {
                    println!("anomaly alert: sent {}/{}", summary.sent, summary.total)
                }
                None => println!("anomaly alert: nothing to send"),
            }
        }
        Command::Audit { since_hours } => {
            let store = JsonlAuditStore::new(config.audit.path.clone());
            let summary = store.query_since(*since_hours).await?;
            println!(
                "last {}h: {} sent, {} failed, {} pending",
                since_hours, summary.sent, summary.failed, summary.pending
            );
            for record in &summary.records {
                println!(
                    "  {} {} -> {} [{}]{}",
                    record.sent_at.format("%Y-%m-%d %H:%M:%S"),
                    record.notification_type,
                    record.user_email,
                    match record.status {
                        pulsewatch::core::NotificationStatus::Sent => "sent",
                        pulsewatch::core::NotificationStatus::Failed => "failed",
                        pulsewatch::core::NotificationStatus::Pending => "pending",
                    },
                    record
                        .error_message
                        .as_deref()
                        .map(|e| format!(" error: {}", e))
                        .unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}
