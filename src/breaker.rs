//! Retry and circuit-breaker policy wrapping the transport client.
//!
//! Transient failures (Offline, Timeout) are retried with exponential
//! backoff. Once an endpoint key accumulates enough consecutive failed
//! calls, its circuit opens and further calls short-circuit to
//! `CircuitOpen` for a cooldown period, protecting a degraded downstream
//! from retry storms.

use crate::core::{HealthStatus, HealthVerdict};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Tunables for retries and the circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Attempts per guarded call, including the first.
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds; doubles per retry.
    pub backoff_base_ms: u64,
    /// Consecutive failed calls before the circuit opens.
    pub failure_threshold: u32,
    /// How long an open circuit stays open, in seconds.
    pub cooldown_seconds: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 500,
            failure_threshold: 3,
            cooldown_seconds: 30,
        }
    }
}

/// Per-key failure history. Success resets it; only a whole failed guarded
/// call (not each attempt) counts against the threshold.
#[derive(Debug, Default)]
struct CircuitState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Owns the per-endpoint circuit states.
///
/// Held behind an `Arc` and shared by all callers; tests get isolation by
/// constructing a fresh registry. The map lock is never held across an
/// await point.
pub struct CircuitRegistry {
    states: Mutex<HashMap<String, CircuitState>>,
    config: BreakerConfig,
}

impl CircuitRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Runs `thunk` under the retry and circuit-breaker policy for `key`.
    ///
    /// If the circuit is open, returns `CircuitOpen` without invoking the
    /// thunk. `ErrorStatus` outcomes are deterministic application errors
    /// and are returned immediately without retrying; Offline and Timeout
    /// are retried with exponential backoff. The verdict returned on the
    /// final failure is the real failure reason, even when that failure is
    /// the one that opens the circuit for subsequent calls.
    pub async fn guarded_call<F, Fut>(&self, key: &str, thunk: F) -> HealthVerdict
    where
        F: Fn() -> Fut,
        Fut: Future<Output = HealthVerdict>,
    {
        if let Some(remaining) = self.open_remaining(key) {
            debug!(key, "short-circuiting call, circuit is open");
            metrics::counter!("breaker_short_circuits_total", "key" => key.to_string())
                .increment(1);
            return HealthVerdict::circuit_open(remaining);
        }

        let mut attempt = 1u32;
        loop {
            let verdict = thunk().await;
            match verdict.status {
                HealthStatus::Online => {
                    self.record_success(key);
                    return verdict;
                }
                // A well-formed error response is not transient; retrying
                // would just repeat the same application error.
                HealthStatus::ErrorStatus => {
                    self.record_failure(key);
                    return verdict;
                }
                HealthStatus::Offline | HealthStatus::Timeout => {
                    if attempt >= self.config.max_attempts {
                        self.record_failure(key);
                        return verdict;
                    }
                    let backoff = Duration::from_millis(
                        self.config.backoff_base_ms * 2u64.pow(attempt - 1),
                    );
                    debug!(
                        key,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "transient failure, backing off before retry"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                // Thunks built on the transport client never produce this,
                // but pass it through rather than looping on it.
                HealthStatus::CircuitOpen => return verdict,
            }
        }
    }

    /// Remaining open time for `key`, or None if the circuit is closed.
    fn open_remaining(&self, key: &str) -> Option<Duration> {
        let states = self.states.lock().unwrap();
        let open_until = states.get(key)?.open_until?;
        let now = Instant::now();
        if now < open_until {
            Some(open_until - now)
        } else {
            None
        }
    }

    fn record_success(&self, key: &str) {
        let mut states = self.states.lock().unwrap();
        let state = states.entry(key.to_string()).or_default();
        state.consecutive_failures = 0;
        state.open_until = None;
    }

    fn record_failure(&self, key: &str) {
        let mut states = self.states.lock().unwrap();
        let state = states.entry(key.to_string()).or_default();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.config.failure_threshold {
            state.open_until =
                Some(Instant::now() + Duration::from_secs(self.config.cooldown_seconds));
            warn!(
                key,
                failures = state.consecutive_failures,
                cooldown_s = self.config.cooldown_seconds,
                "circuit breaker OPEN"
            );
            metrics::counter!("breaker_opened_total", "key" => key.to_string()).increment(1);
        }
    }
}
