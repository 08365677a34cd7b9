//! # Circuit Breaker Implementation
//!
//! Three-state breaker guarding one target (a system):
//!
//! - **Closed**: every call goes through; consecutive failures are counted.
//! - **Open**: calls are rejected with [`CollectorError::CircuitOpen`] without running.
//! - **Half-open**: once the retry timeout has elapsed since the last failure, exactly one
//!   probe call is admitted. Its success closes the breaker, its failure reopens it.
//!
//! Rejections never count as failures: they never reached the backend.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{CollectorError, Result};
use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - a single probe call is allowed
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    consecutive_failures: u64,
    last_failure_at: Option<Instant>,
    probe_in_flight: bool,
    metrics: CircuitBreakerMetrics,
}

/// How a call was let through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

/// Releases a half-open probe slot if the call is dropped before it settles
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.inner.lock().probe_in_flight = false;
            debug!(component = %self.breaker.name, "Half-open probe abandoned, slot released");
        }
    }
}

/// Circuit breaker with lock-free state reads
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    /// Mirror of the current state; written only while `inner` is locked
    state: AtomicU8,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        debug!(
            component = %name,
            failure_threshold = config.failure_threshold,
            retry_timeout_seconds = config.retry_timeout.as_secs(),
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            inner: Mutex::new(BreakerInner {
                consecutive_failures: 0,
                last_failure_at: None,
                probe_in_flight: false,
                metrics: CircuitBreakerMetrics::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: CircuitState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let admission = self.admit()?;
        let mut guard = ProbeGuard {
            breaker: self,
            armed: admission == Admission::Probe,
        };

        let started = Instant::now();
        let result = operation().await;
        let duration = started.elapsed();
        guard.armed = false;

        match &result {
            Ok(_) => self.record_success(duration),
            // Capacity rejections from further down never reached the target either
            Err(e) if e.is_rejection() => self.release_probe(admission),
            Err(e) => self.record_failure(duration, e),
        }

        result
    }

    fn admit(&self) -> Result<Admission> {
        let mut inner = self.inner.lock();
        match self.state() {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_at
                    .map(|at| at.elapsed() >= self.config.retry_timeout)
                    .unwrap_or(true);
                if elapsed {
                    self.set_state(CircuitState::HalfOpen);
                    inner.probe_in_flight = true;
                    info!(component = %self.name, "🟡 Circuit breaker half-open (probing target)");
                    Ok(Admission::Probe)
                } else {
                    inner.metrics.rejected_count += 1;
                    Err(self.rejection())
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    inner.metrics.rejected_count += 1;
                    Err(self.rejection())
                } else {
                    inner.probe_in_flight = true;
                    Ok(Admission::Probe)
                }
            }
        }
    }

    fn rejection(&self) -> CollectorError {
        debug!(component = %self.name, "Circuit breaker rejected call");
        CollectorError::CircuitOpen {
            target: self.name.clone(),
        }
    }

    fn release_probe(&self, admission: Admission) {
        if admission == Admission::Probe {
            self.inner.lock().probe_in_flight = false;
        }
    }

    fn record_success(&self, duration: Duration) {
        let mut inner = self.inner.lock();
        inner.metrics.total_calls += 1;
        inner.metrics.success_count += 1;
        inner.metrics.total_duration += duration;
        inner.consecutive_failures = 0;

        if self.state() != CircuitState::Closed {
            inner.probe_in_flight = false;
            inner.last_failure_at = None;
            self.set_state(CircuitState::Closed);
            info!(
                component = %self.name,
                total_calls = inner.metrics.total_calls,
                "🟢 Circuit breaker closed (recovered)"
            );
        }
    }

    fn record_failure(&self, duration: Duration, err: &CollectorError) {
        let mut inner = self.inner.lock();
        inner.metrics.total_calls += 1;
        inner.metrics.failure_count += 1;
        inner.metrics.total_duration += duration;
        inner.consecutive_failures += 1;
        inner.last_failure_at = Some(Instant::now());

        match self.state() {
            CircuitState::Closed => {
                if inner.consecutive_failures >= u64::from(self.config.failure_threshold) {
                    self.set_state(CircuitState::Open);
                    error!(
                        component = %self.name,
                        consecutive_failures = inner.consecutive_failures,
                        failure_threshold = self.config.failure_threshold,
                        retry_timeout_seconds = self.config.retry_timeout.as_secs(),
                        error = %err,
                        "🔴 Circuit breaker opened (failing fast)"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.probe_in_flight = false;
                self.set_state(CircuitState::Open);
                warn!(component = %self.name, error = %err, "🔴 Half-open probe failed, circuit reopened");
            }
            CircuitState::Open => {}
        }
    }

    /// Force circuit to open state; the retry timeout starts now
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure_at = Some(Instant::now());
        inner.probe_in_flight = false;
        self.set_state(CircuitState::Open);
        warn!(component = %self.name, "🚨 Circuit breaker forced open");
    }

    /// Return to closed with all counters cleared
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.last_failure_at = None;
        inner.probe_in_flight = false;
        inner.metrics = CircuitBreakerMetrics::new();
        self.set_state(CircuitState::Closed);
        info!(component = %self.name, "🔄 Circuit breaker reset");
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        let mut snapshot = inner.metrics.clone();
        snapshot.current_state = self.state();
        snapshot.consecutive_failures = inner.consecutive_failures;
        if snapshot.total_calls > 0 {
            snapshot.failure_rate = snapshot.failure_count as f64 / snapshot.total_calls as f64;
        }
        snapshot
    }
}
