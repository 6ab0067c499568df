//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using
//! the `clap` crate. These arguments are parsed at startup and then merged
//! with the configuration from the `pulsewatch.toml` file and environment
//! variables.

use clap::{Parser, Subcommand};
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Health aggregation and notification dispatch for the analysis stack.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Per-call probe timeout in seconds.
    #[arg(long, value_name = "SECONDS")]
    pub timeout_seconds: Option<u64>,

    /// Path of the append-only audit log.
    #[arg(long, value_name = "FILE")]
    pub audit_path: Option<PathBuf>,

    /// Logging level override (e.g. debug, info).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Probe every known service and print a pass/fail line per service.
    Check {
        /// Hostnames to probe under; defaults to the configured candidates.
        #[arg(long, value_name = "HOST")]
        host: Vec<String>,
    },
    /// Run the daily digest pipeline once.
    Digest,
    /// Run the anomaly alert pipeline once.
    Alert,
    /// Summarize recent audit records.
    Audit {
        /// Window size in hours.
        #[arg(long, default_value_t = 24)]
        since_hours: i64,
    },
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(timeout) = self.timeout_seconds {
            dict.insert("transport.timeout_seconds".into(), Value::from(timeout));
        }
        if let Some(path) = &self.audit_path {
            dict.insert(
                "audit.path".into(),
                Value::from(path.to_string_lossy().to_string()),
            );
        }
        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
