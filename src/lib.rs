//! pulsewatch - health aggregation and notification dispatch
//!
//! This library polls a fixed set of backend services, classifies each as
//! online/offline/degraded behind a retry and circuit-breaker policy,
//! aggregates subscriber and analysis data from those services, and
//! dispatches personalized digests while recording every outcome in an
//! append-only audit log.

pub mod aggregator;
pub mod app;
pub mod audit;
pub mod breaker;
pub mod cli;
pub mod compose;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod registry;
pub mod transport;

// Re-export core types for convenience
pub use crate::core::*;
