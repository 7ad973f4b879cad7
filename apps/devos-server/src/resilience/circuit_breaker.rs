//! Circuit breaker implementation for external service resilience.
//!
//! Prevents cascading failures when external services (OpenAI, GitHub)
//! become unavailable or unresponsive.
//!
//! # State Machine
//!
//! ```text
//! CLOSED → OPEN (consecutive failures reach threshold)
//! OPEN → HALF_OPEN (recovery timeout elapsed, checked on next call)
//! HALF_OPEN → CLOSED (consecutive successes reach threshold)
//! HALF_OPEN → OPEN (any failure)
//! ```
//!
//! The OPEN → HALF_OPEN transition is evaluated lazily, on the next call
//! attempt only. There is no background timer: a breaker that receives no
//! calls stays nominally OPEN past its recovery timeout. Exceptions and
//! timeouts increment the same failure counter with no separate weighting.
//!
//! Admission and counter updates share one mutex per breaker instance, so
//! state transitions are observed in arrival order under concurrent callers.
//! Distinct breakers (one per protected dependency) are fully independent.
//!
//! # Example
//!
//! ```rust,ignore
//! use devos_server::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::new("openai", CircuitBreakerConfig::default());
//!
//! match breaker.call("analyze_code", Duration::from_secs(60), make_api_call()).await {
//!     Ok(result) => { /* success recorded */ }
//!     Err(e) => { /* rejection, timeout, or forwarded upstream error */ }
//! }
//! ```

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::events::TimeoutEventLog;
use super::timeout::{TimeoutError, run_with_timeout};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitBreakerState {
    /// Normal operation, calls flow through.
    Closed,
    /// Failing fast, calls are rejected without being attempted.
    Open,
    /// Probing recovery with live calls.
    HalfOpen,
}

impl std::fmt::Display for CircuitBreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit from CLOSED.
    pub failure_threshold: u32,
    /// Time to wait after the last failure before probing recovery.
    pub recovery_timeout: Duration,
    /// Consecutive successes that close the circuit from HALF_OPEN.
    pub success_threshold: u32,
    /// Default per-call deadline for wrapped operations.
    pub call_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 3,
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Mutable breaker state guarded by the instance mutex.
#[derive(Debug)]
struct Inner {
    state: CircuitBreakerState,
    failure_count: u32,
    success_count: u32,
    last_failure_monotonic: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
}

/// Read-only snapshot of a breaker, as exposed by health endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    /// Current state.
    pub state: CircuitBreakerState,
    /// Consecutive failures recorded.
    pub failure_count: u32,
    /// Consecutive successes recorded while half-open.
    pub success_count: u32,
    /// Wall-clock time of the last recorded failure.
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Seconds since the last recorded failure.
    pub time_since_last_failure: Option<f64>,
}

/// Rejection produced when an open breaker denies admission.
#[derive(Debug, Clone, Error)]
#[error("circuit breaker for '{service}' is open; retry in {retry_after_seconds:.1}s")]
pub struct CircuitBreakerOpenError {
    /// The protected service.
    pub service: String,
    /// Seconds until the breaker will probe recovery.
    pub retry_after_seconds: f64,
}

/// Failure of a breaker-protected call.
///
/// The breaker never swallows the wrapped operation's failure; inner errors
/// are forwarded unmodified so the caller decides how to surface them.
#[derive(Debug, Error)]
pub enum CallError<E>
where
    E: std::fmt::Display + std::fmt::Debug,
{
    /// Admission denied: the breaker is open and the recovery timeout has
    /// not elapsed. The wrapped operation was never invoked.
    #[error(transparent)]
    Open(#[from] CircuitBreakerOpenError),
    /// The wrapped operation exceeded its deadline.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    /// The wrapped operation failed on its own; forwarded as-is.
    #[error("{0}")]
    Inner(E),
}

/// Circuit breaker for one protected dependency.
///
/// One instance per dependency, never shared across dependencies.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Service name for logging and rejection errors.
    name: String,
    /// Configuration.
    config: CircuitBreakerConfig,
    /// State and counters, serialized through one lock.
    inner: Mutex<Inner>,
    /// Shared timeout-event log, if wired in at construction.
    events: Option<Arc<TimeoutEventLog>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitBreakerState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_monotonic: None,
                last_failure_at: None,
            }),
            events: None,
        }
    }

    /// Create a breaker that records failures into a shared event log.
    #[must_use]
    pub fn with_event_log(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        events: Arc<TimeoutEventLog>,
    ) -> Self {
        let mut breaker = Self::new(name, config);
        breaker.events = Some(events);
        breaker
    }

    /// Get the service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current state without side effects.
    #[must_use]
    pub fn state(&self) -> CircuitBreakerState {
        self.lock_inner().state
    }

    /// Check admission for one call attempt.
    ///
    /// This is the only place the lazy OPEN → HALF_OPEN transition happens:
    /// if the breaker is open and the recovery timeout has elapsed since the
    /// last failure, it moves to HALF_OPEN and admits the call.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitBreakerOpenError`] while the breaker is open and the
    /// recovery timeout has not elapsed.
    pub fn try_acquire(&self) -> Result<(), CircuitBreakerOpenError> {
        let mut inner = self.lock_inner();
        match inner.state {
            CircuitBreakerState::Closed | CircuitBreakerState::HalfOpen => Ok(()),
            CircuitBreakerState::Open => {
                let elapsed = inner
                    .last_failure_monotonic
                    .map_or(self.config.recovery_timeout, |at| at.elapsed());
                if elapsed >= self.config.recovery_timeout {
                    inner.state = CircuitBreakerState::HalfOpen;
                    inner.success_count = 0;
                    tracing::info!(
                        name = %self.name,
                        from = "OPEN",
                        to = "HALF_OPEN",
                        "Circuit breaker probing recovery"
                    );
                    Ok(())
                } else {
                    let retry_after = self.config.recovery_timeout - elapsed;
                    Err(CircuitBreakerOpenError {
                        service: self.name.clone(),
                        retry_after_seconds: retry_after.as_secs_f64(),
                    })
                }
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.lock_inner();
        inner.failure_count = 0;
        if inner.state == CircuitBreakerState::HalfOpen {
            inner.success_count += 1;
            if inner.success_count >= self.config.success_threshold {
                inner.state = CircuitBreakerState::Closed;
                inner.success_count = 0;
                tracing::info!(
                    name = %self.name,
                    from = "HALF_OPEN",
                    to = "CLOSED",
                    "Circuit breaker closed"
                );
            }
        }
    }

    /// Record a failed call. Timeouts and other failures count identically.
    pub fn record_failure(&self) {
        let mut inner = self.lock_inner();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.success_count = 0;
        inner.last_failure_monotonic = Some(Instant::now());
        inner.last_failure_at = Some(Utc::now());

        match inner.state {
            CircuitBreakerState::HalfOpen => {
                inner.state = CircuitBreakerState::Open;
                tracing::warn!(
                    name = %self.name,
                    from = "HALF_OPEN",
                    to = "OPEN",
                    "Circuit breaker reopened"
                );
            }
            CircuitBreakerState::Closed
                if inner.failure_count >= self.config.failure_threshold =>
            {
                inner.state = CircuitBreakerState::Open;
                tracing::warn!(
                    name = %self.name,
                    from = "CLOSED",
                    to = "OPEN",
                    failure_count = inner.failure_count,
                    "Circuit breaker opened"
                );
            }
            _ => {}
        }
    }

    /// Get a read-only snapshot of the breaker.
    #[must_use]
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.lock_inner();
        CircuitBreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure_time: inner.last_failure_at,
            time_since_last_failure: inner
                .last_failure_monotonic
                .map(|at| at.elapsed().as_secs_f64()),
        }
    }

    /// Execute `fut` with breaker protection under `timeout`.
    ///
    /// If admission is denied the future is never polled (fail fast, zero
    /// cost). If admitted, the call runs under the given deadline; success
    /// and failure are recorded, and inner failures are forwarded unmodified.
    ///
    /// # Errors
    ///
    /// - [`CallError::Open`] if the breaker rejected the call.
    /// - [`CallError::Timeout`] if the call exceeded `timeout`.
    /// - [`CallError::Inner`] carrying the operation's own error.
    pub async fn call<T, E, Fut>(
        &self,
        operation: &str,
        timeout: Duration,
        fut: Fut,
    ) -> Result<T, CallError<E>>
    where
        E: std::fmt::Display + std::fmt::Debug,
        Fut: Future<Output = Result<T, E>>,
    {
        self.try_acquire()?;

        match run_with_timeout(operation, timeout, fut).await {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(err)) => {
                if let Some(events) = &self.events {
                    events.record(
                        self.name.clone(),
                        operation,
                        timeout.as_secs_f64(),
                        err.to_string(),
                    );
                }
                self.record_failure();
                Err(CallError::Inner(err))
            }
            Err(timeout_err) => {
                if let Some(events) = &self.events {
                    events.record(
                        self.name.clone(),
                        operation,
                        timeout.as_secs_f64(),
                        timeout_err.to_string(),
                    );
                }
                self.record_failure();
                Err(CallError::Timeout(timeout_err))
            }
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
