//! Circuit breaker guarding calls to a downstream dependency.
//!
//! ```text
//!            failures >= failure_threshold
//!   Closed ─────────────────────────────────> Open
//!     ^                                        │
//!     │ success_threshold                      │ reset_timeout elapsed,
//!     │ consecutive successes                  │ next call probes
//!     │                                        v
//!     └──────────────────────────────────── HalfOpen
//!                                              │
//!                         any probe failure    │
//!                         ─────────────────────┘──> Open
//! ```
//!
//! One breaker exists per dependency for the life of the process. State
//! sits behind a mutex that is never held across an await, so the breaker
//! can be shared freely between tasks.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open a closed circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close the circuit
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// How long the circuit stays open before a probe is allowed (ms)
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
    /// Upper bound on a single guarded call (ms); exceeding it is a failure
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    2
}

fn default_reset_timeout_ms() -> u64 {
    30_000
}

fn default_call_timeout_ms() -> u64 {
    60_000
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl BreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// State of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Error returned by a guarded call.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is open; the wrapped call was not made.
    #[error("circuit '{name}' is open, next attempt in {retry_in:?}")]
    Open { name: String, retry_in: Duration },

    /// The wrapped call did not finish within the call timeout.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The wrapped call failed.
    #[error("{0}")]
    Inner(E),
}

/// Point-in-time view of a breaker for the metrics endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerMetrics {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub total_calls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_timeouts: u64,
    pub total_rejections: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    /// A half-open probe is running; other callers are turned away.
    probe_in_flight: bool,
    next_attempt_at: Option<Instant>,
    next_attempt_wall: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    total_calls: u64,
    total_successes: u64,
    total_failures: u64,
    total_timeouts: u64,
    total_rejections: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            probe_in_flight: false,
            next_attempt_at: None,
            next_attempt_wall: None,
            last_failure_at: None,
            last_success_at: None,
            total_calls: 0,
            total_successes: 0,
            total_failures: 0,
            total_timeouts: 0,
            total_rejections: 0,
        }
    }
}

enum Admission {
    Proceed { probe: bool },
    Reject { retry_in: Duration },
}

/// Three-state circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Runs `f` under the breaker, failing fast while the circuit is open.
    pub async fn execute<F, Fut, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.admit() {
            Admission::Reject { retry_in } => Err(BreakerError::Open {
                name: self.name.clone(),
                retry_in,
            }),
            Admission::Proceed { probe } => self.run(f, probe).await,
        }
    }

    /// Like [`execute`](Self::execute), but answers from `fallback` while open.
    pub async fn execute_with_fallback<F, Fut, FB, FbFut, T, E>(
        &self,
        f: F,
        fallback: FB,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T, E>>,
    {
        match self.admit() {
            Admission::Reject { .. } => fallback().await.map_err(BreakerError::Inner),
            Admission::Proceed { probe } => self.run(f, probe).await,
        }
    }

    /// Operator override: close the circuit and clear consecutive counters.
    pub fn reset(&self) {
        let mut s = self.inner.lock();
        s.state = CircuitState::Closed;
        s.consecutive_failures = 0;
        s.consecutive_successes = 0;
        s.probe_in_flight = false;
        s.next_attempt_at = None;
        s.next_attempt_wall = None;
        info!(breaker = %self.name, "Circuit manually reset to closed");
    }

    pub fn metrics(&self) -> BreakerMetrics {
        let s = self.inner.lock();
        BreakerMetrics {
            name: self.name.clone(),
            state: s.state,
            consecutive_failures: s.consecutive_failures,
            consecutive_successes: s.consecutive_successes,
            total_calls: s.total_calls,
            total_successes: s.total_successes,
            total_failures: s.total_failures,
            total_timeouts: s.total_timeouts,
            total_rejections: s.total_rejections,
            last_failure_at: s.last_failure_at,
            last_success_at: s.last_success_at,
            next_attempt_at: s.next_attempt_wall,
        }
    }

    fn admit(&self) -> Admission {
        let mut s = self.inner.lock();
        s.total_calls += 1;

        match s.state {
            CircuitState::Closed => Admission::Proceed { probe: false },
            CircuitState::Open => {
                let now = Instant::now();
                match s.next_attempt_at {
                    Some(at) if now < at => {
                        s.total_rejections += 1;
                        Admission::Reject { retry_in: at - now }
                    }
                    _ => {
                        s.state = CircuitState::HalfOpen;
                        s.consecutive_successes = 0;
                        s.probe_in_flight = true;
                        info!(breaker = %self.name, "Circuit half-open, probing");
                        Admission::Proceed { probe: true }
                    }
                }
            }
            CircuitState::HalfOpen if s.probe_in_flight => {
                s.total_rejections += 1;
                Admission::Reject {
                    retry_in: Duration::ZERO,
                }
            }
            CircuitState::HalfOpen => {
                s.probe_in_flight = true;
                Admission::Proceed { probe: true }
            }
        }
    }

    async fn run<F, Fut, T, E>(&self, f: F, probe: bool) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut guard = ProbeGuard {
            breaker: self,
            armed: probe,
        };
        let timeout = self.config.call_timeout();

        let result = match tokio::time::timeout(timeout, f()).await {
            Ok(Ok(value)) => {
                self.on_success();
                Ok(value)
            }
            Ok(Err(e)) => {
                self.on_failure(false);
                Err(BreakerError::Inner(e))
            }
            Err(_) => {
                self.on_failure(true);
                Err(BreakerError::Timeout(timeout))
            }
        };

        guard.armed = false;
        result
    }

    fn on_success(&self) {
        let mut s = self.inner.lock();
        s.probe_in_flight = false;
        s.consecutive_failures = 0;
        s.total_successes += 1;
        s.last_success_at = Some(Utc::now());

        if s.state == CircuitState::HalfOpen {
            s.consecutive_successes += 1;
            if s.consecutive_successes >= self.config.success_threshold {
                s.state = CircuitState::Closed;
                s.consecutive_successes = 0;
                s.next_attempt_at = None;
                s.next_attempt_wall = None;
                info!(breaker = %self.name, "Circuit closed after successful probation");
            }
        }
    }

    fn on_failure(&self, timed_out: bool) {
        let mut s = self.inner.lock();
        s.probe_in_flight = false;
        s.consecutive_failures += 1;
        s.total_failures += 1;
        if timed_out {
            s.total_timeouts += 1;
        }
        s.last_failure_at = Some(Utc::now());

        let trip = match s.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => s.consecutive_failures >= self.config.failure_threshold,
            // A call admitted before the circuit opened; the window is already set.
            CircuitState::Open => false,
        };

        if trip {
            let reset = self.config.reset_timeout();
            s.state = CircuitState::Open;
            s.consecutive_successes = 0;
            s.next_attempt_at = Some(Instant::now() + reset);
            s.next_attempt_wall = chrono::Duration::from_std(reset)
                .ok()
                .map(|d| Utc::now() + d);
            warn!(
                breaker = %self.name,
                consecutive_failures = s.consecutive_failures,
                reset_timeout_ms = reset.as_millis() as u64,
                "Circuit opened"
            );
        }
    }
}

/// Releases the half-open probe slot if the guarded future is dropped mid-call.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.inner.lock().probe_in_flight = false;
        }
    }
}
