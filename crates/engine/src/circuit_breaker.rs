use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, all calls pass through.
    Closed,
    /// Breaker tripped, calls are skipped.
    Open,
    /// Cooldown elapsed, one trial call allowed.
    HalfOpen,
}

/// Opens after consecutive failures reach a threshold; closes again after a
/// successful trial call in half-open state.
pub struct CircuitBreaker {
    name: &'static str,
    failure_count: AtomicU32,
    failure_threshold: u32,
    cooldown: Duration,
    /// Never held across await points.
    inner: Mutex<CircuitInner>,
}

struct CircuitInner {
    state: CircuitState,
    last_failure: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, failure_threshold: u32, cooldown_seconds: u64) -> Self {
        Self {
            name,
            failure_count: AtomicU32::new(0),
            failure_threshold,
            cooldown: Duration::from_secs(cooldown_seconds),
            inner: Mutex::new(CircuitInner {
                state: CircuitState::Closed,
                last_failure: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Check whether a call should be allowed.
    pub fn allow(&self) -> bool {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => match inner.last_failure {
                Some(last) if last.elapsed() >= self.cooldown => {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!(circuit = self.name, "Circuit breaker transitioning to half-open");
                    true
                }
                Some(_) => {
                    metrics::counter!("circuit_breaker.rejections", "circuit" => self.name)
                        .increment(1);
                    false
                }
                None => {
                    inner.state = CircuitState::Closed;
                    true
                }
            },
        }
    }

    /// Record a successful call: reset failure count, close circuit.
    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        let mut inner = self.lock();

        if inner.state != CircuitState::Closed {
            tracing::info!(
                circuit = self.name,
                previous_state = ?inner.state,
                "Circuit breaker closing after success"
            );
            inner.state = CircuitState::Closed;
            metrics::counter!("circuit_breaker.recoveries", "circuit" => self.name).increment(1);
        }
    }

    /// Record a failed call. A failed half-open trial call reopens immediately.
    pub fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        let mut inner = self.lock();

        inner.last_failure = Some(Instant::now());

        let trip = inner.state == CircuitState::HalfOpen
            || (count >= self.failure_threshold && inner.state == CircuitState::Closed);
        if trip {
            tracing::warn!(
                circuit = self.name,
                failures = count,
                threshold = self.failure_threshold,
                "Circuit breaker OPEN"
            );
            inner.state = CircuitState::Open;
            metrics::counter!("circuit_breaker.trips", "circuit" => self.name).increment(1);
        }
    }

    pub fn current_state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn name(&self) -> &str {
        self.name
    }
}

/// Circuit breakers for the non-LLM external dependencies of a pipeline.
pub struct CircuitBreakerRegistry {
    pub search: CircuitBreaker,
    pub registry: CircuitBreaker,
}

impl CircuitBreakerRegistry {
    /// Create registry with default thresholds.
    pub fn new() -> Self {
        Self {
            search: CircuitBreaker::new("search", 5, 60),
            registry: CircuitBreaker::new("fact_check_registry", 3, 120),
        }
    }

    /// Emit gauge metrics for all circuit breaker states.
    pub fn report_metrics(&self) {
        for cb in [&self.search, &self.registry] {
            let state_value = match cb.current_state() {
                CircuitState::Closed => 0.0,
                CircuitState::HalfOpen => 0.5,
                CircuitState::Open => 1.0,
            };
            metrics::gauge!("circuit_breaker.state", "circuit" => cb.name).set(state_value);
        }
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
