//! Health aggregation for protected dependencies.
//!
//! Produces point-in-time [`SystemHealth`] snapshots on demand: one bounded
//! connectivity probe per registered dependency, circuit breaker snapshots,
//! best-effort system resources, and the tail of the shared timeout-event
//! log. Nothing is cached beyond the request and nothing is persisted.
//!
//! Probe failures are swallowed here, not propagated: the aggregator's job
//! is to summarize, so a failing dependency becomes an `unhealthy` entry
//! instead of an error. Every probe runs under its own deadline so no single
//! dependency can hang the aggregate.
//!
//! # Status Derivation
//!
//! - `unhealthy` if any dependency probe is unhealthy
//! - `degraded` if any breaker is open, or more than 10 timeout events were
//!   recorded within the trailing 24-hour window
//! - `healthy` otherwise
//!
//! Readiness is `status != unhealthy`. Liveness is the weaker signal that
//! the process responds at all; it is served without touching any probe.

pub mod resources;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::resilience::{CircuitBreakerSnapshot, CircuitBreakerState, TimeoutEvent, TimeoutEventLog, run_with_timeout};

/// Hard cap on any single probe, regardless of dependency configuration.
const MAX_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout events shown in the overall snapshot.
const RECENT_EVENTS_IN_SNAPSHOT: usize = 10;

/// Recent timeout events above which the system counts as degraded.
const DEGRADED_TIMEOUT_THRESHOLD: usize = 10;

/// Trailing window for "recent" timeout events.
const TIMEOUT_WINDOW_HOURS: i64 = 24;

/// Health status of a service or the whole system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Operating normally.
    Healthy,
    /// Functional with warnings.
    Degraded,
    /// Not able to serve correctly.
    Unhealthy,
    /// Probe could not classify the dependency (e.g. not configured).
    Unknown,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of one dependency connectivity probe.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    /// Classified status.
    pub status: HealthStatus,
    /// Error description when not healthy.
    pub error_message: Option<String>,
    /// Probe-specific details.
    pub details: Value,
}

impl ProbeOutcome {
    /// A healthy outcome with details.
    #[must_use]
    pub fn healthy(details: Value) -> Self {
        Self {
            status: HealthStatus::Healthy,
            error_message: None,
            details,
        }
    }

    /// An unhealthy outcome with an error message.
    #[must_use]
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            error_message: Some(message.into()),
            details: Value::Null,
        }
    }

    /// An unknown outcome (e.g. dependency not configured).
    #[must_use]
    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unknown,
            error_message: Some(message.into()),
            details: Value::Null,
        }
    }
}

/// A protected dependency that the aggregator can interrogate.
#[async_trait]
pub trait DependencyProbe: Send + Sync {
    /// Dependency name (e.g. `openai`).
    fn name(&self) -> &str;

    /// Run a lightweight connectivity probe.
    ///
    /// Implementations report failure through the outcome; the aggregator
    /// additionally bounds the call with [`probe_timeout`](Self::probe_timeout).
    async fn probe(&self) -> ProbeOutcome;

    /// Snapshot of this dependency's circuit breaker.
    fn breaker_snapshot(&self) -> CircuitBreakerSnapshot;

    /// Resolved timeout table for health reporting.
    fn timeout_table(&self) -> Value;

    /// Deadline budget for one probe.
    fn probe_timeout(&self) -> Duration;
}

/// Health of one dependency at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    /// Dependency name.
    pub name: String,
    /// Classified status.
    pub status: HealthStatus,
    /// Probe latency, seconds.
    pub response_time: f64,
    /// When the probe ran.
    pub last_check: DateTime<Utc>,
    /// Error description when not healthy.
    pub error_message: Option<String>,
    /// Probe-specific details.
    pub details: Value,
}

/// Overall system health at a point in time. Computed on demand, never
/// persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    /// Derived overall status.
    pub status: HealthStatus,
    /// When the snapshot was computed.
    pub timestamp: DateTime<Utc>,
    /// Process uptime, seconds.
    pub uptime: f64,
    /// Per-dependency health.
    pub services: Vec<ServiceHealth>,
    /// Best-effort system resource figures.
    pub system_resources: Value,
    /// Circuit breaker snapshots by dependency name.
    pub circuit_breakers: BTreeMap<String, CircuitBreakerSnapshot>,
    /// Most recent timeout events.
    pub timeout_events: Vec<TimeoutEvent>,
}

/// Timeout-system projection for `/health/timeout`.
#[derive(Debug, Clone, Serialize)]
pub struct TimeoutHealth {
    /// `healthy` or `degraded` based on recent event volume.
    pub status: HealthStatus,
    /// Resolved timeout tables by dependency name.
    pub timeout_configs: BTreeMap<String, Value>,
    /// Events within the trailing window.
    pub recent_timeout_events: Vec<TimeoutEvent>,
    /// Count of events within the trailing window.
    pub total_recent_timeouts: usize,
    /// When the projection was computed.
    pub timestamp: DateTime<Utc>,
}

/// Per-service projection for `/health/services`.
#[derive(Debug, Clone, Serialize)]
pub struct ServicesHealth {
    /// Health by dependency name.
    pub services: BTreeMap<String, ServiceHealth>,
    /// When the projection was computed.
    pub timestamp: DateTime<Utc>,
}

/// Circuit-breaker projection for `/health/circuit-breakers`.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakersHealth {
    /// `healthy` when no breaker is open, else `degraded`.
    pub status: HealthStatus,
    /// Breaker snapshots by dependency name.
    pub circuit_breakers: BTreeMap<String, CircuitBreakerSnapshot>,
    /// Names of breakers currently open.
    pub open_breakers: Vec<String>,
    /// When the projection was computed.
    pub timestamp: DateTime<Utc>,
}

/// Central health aggregation service.
///
/// Constructed once at composition time with the dependencies to watch and
/// the shared timeout-event log.
pub struct HealthService {
    started_at: Instant,
    probes: Vec<Arc<dyn DependencyProbe>>,
    events: Arc<TimeoutEventLog>,
}

impl HealthService {
    /// Create a health service over the given dependencies.
    #[must_use]
    pub fn new(probes: Vec<Arc<dyn DependencyProbe>>, events: Arc<TimeoutEventLog>) -> Self {
        Self {
            started_at: Instant::now(),
            probes,
            events,
        }
    }

    /// Process uptime, seconds.
    #[must_use]
    pub fn uptime_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// Append a timeout event to the shared log. Never raises.
    pub fn record_timeout_event(
        &self,
        service: impl Into<String>,
        operation: impl Into<String>,
        timeout_seconds: f64,
        error: impl Into<String>,
    ) {
        self.events.record(service, operation, timeout_seconds, error);
    }

    /// The shared timeout-event log.
    #[must_use]
    pub fn events(&self) -> &Arc<TimeoutEventLog> {
        &self.events
    }

    /// Perform a comprehensive health check of all components.
    pub async fn check_overall_health(&self) -> SystemHealth {
        let started = Instant::now();
        let timestamp = Utc::now();

        let mut services = Vec::with_capacity(self.probes.len());
        for probe in &self.probes {
            services.push(self.check_service_health(probe.as_ref()).await);
        }

        let circuit_breakers = self.breaker_snapshots();
        let recent_timeouts = self.recent_timeout_count();
        let status = derive_overall_status(&services, &circuit_breakers, recent_timeouts);

        tracing::info!(
            status = %status,
            response_time_secs = started.elapsed().as_secs_f64(),
            "Health check completed"
        );

        SystemHealth {
            status,
            timestamp,
            uptime: self.uptime_seconds(),
            services,
            system_resources: resources::system_resources(),
            circuit_breakers,
            timeout_events: self.events.recent(RECENT_EVENTS_IN_SNAPSHOT),
        }
    }

    /// Probe one dependency under its deadline.
    ///
    /// The probe's own budget is capped so a hung dependency yields an
    /// unhealthy entry instead of stalling the aggregate.
    pub async fn check_service_health(&self, probe: &dyn DependencyProbe) -> ServiceHealth {
        let started = Instant::now();
        let timestamp = Utc::now();
        let limit = probe.probe_timeout().min(MAX_PROBE_TIMEOUT);

        let outcome = match run_with_timeout(probe.name(), limit, probe.probe()).await {
            Ok(outcome) => outcome,
            Err(timeout_err) => ProbeOutcome::unhealthy(timeout_err.to_string()),
        };

        if outcome.status == HealthStatus::Unhealthy {
            tracing::warn!(
                service = probe.name(),
                error = outcome.error_message.as_deref().unwrap_or("unknown"),
                "Service health check failed"
            );
        }

        ServiceHealth {
            name: probe.name().to_string(),
            status: outcome.status,
            response_time: started.elapsed().as_secs_f64(),
            last_check: timestamp,
            error_message: outcome.error_message,
            details: outcome.details,
        }
    }

    /// Timeout-system projection: configs plus recent events.
    pub async fn check_timeout_health(&self) -> TimeoutHealth {
        let recent = self.recent_timeout_events();
        let status = if recent.len() > DEGRADED_TIMEOUT_THRESHOLD {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        TimeoutHealth {
            status,
            timeout_configs: self
                .probes
                .iter()
                .map(|p| (p.name().to_string(), p.timeout_table()))
                .collect(),
            total_recent_timeouts: recent.len(),
            recent_timeout_events: recent,
            timestamp: Utc::now(),
        }
    }

    /// Per-service projection.
    pub async fn check_services_health(&self) -> ServicesHealth {
        let mut services = BTreeMap::new();
        for probe in &self.probes {
            let health = self.check_service_health(probe.as_ref()).await;
            services.insert(health.name.clone(), health);
        }

        ServicesHealth {
            services,
            timestamp: Utc::now(),
        }
    }

    /// Circuit-breaker projection.
    pub async fn check_circuit_breakers_health(&self) -> CircuitBreakersHealth {
        let circuit_breakers = self.breaker_snapshots();
        let open_breakers: Vec<String> = circuit_breakers
            .iter()
            .filter(|(_, snapshot)| snapshot.state == CircuitBreakerState::Open)
            .map(|(name, _)| name.clone())
            .collect();
        let status = if open_breakers.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        CircuitBreakersHealth {
            status,
            circuit_breakers,
            open_breakers,
            timestamp: Utc::now(),
        }
    }

    fn breaker_snapshots(&self) -> BTreeMap<String, CircuitBreakerSnapshot> {
        self.probes
            .iter()
            .map(|p| (p.name().to_string(), p.breaker_snapshot()))
            .collect()
    }

    fn recent_timeout_events(&self) -> Vec<TimeoutEvent> {
        let cutoff = Utc::now() - chrono::Duration::hours(TIMEOUT_WINDOW_HOURS);
        self.events.recorded_since(cutoff)
    }

    fn recent_timeout_count(&self) -> usize {
        self.recent_timeout_events().len()
    }
}

/// Derive the overall status from dependency health, breaker states, and
/// recent timeout volume.
fn derive_overall_status(
    services: &[ServiceHealth],
    breakers: &BTreeMap<String, CircuitBreakerSnapshot>,
    recent_timeouts: usize,
) -> HealthStatus {
    if services.iter().any(|s| s.status == HealthStatus::Unhealthy) {
        return HealthStatus::Unhealthy;
    }

    let any_open = breakers
        .values()
        .any(|snapshot| snapshot.state == CircuitBreakerState::Open);
    if any_open || recent_timeouts > DEGRADED_TIMEOUT_THRESHOLD {
        return HealthStatus::Degraded;
    }

    HealthStatus::Healthy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{CircuitBreaker, CircuitBreakerConfig};
    use serde_json::json;

    struct StubProbe {
        name: String,
        outcome: ProbeOutcome,
        delay: Duration,
        breaker: CircuitBreaker,
    }

    impl StubProbe {
        fn healthy(name: &str) -> Self {
            Self {
                name: name.to_string(),
                outcome: ProbeOutcome::healthy(json!({"message": "ok"})),
                delay: Duration::ZERO,
                breaker: CircuitBreaker::new(name, CircuitBreakerConfig::default()),
            }
        }

        fn unhealthy(name: &str) -> Self {
            Self {
                outcome: ProbeOutcome::unhealthy("connection refused"),
                ..Self::healthy(name)
            }
        }

        fn hanging(name: &str) -> Self {
            Self {
                delay: Duration::from_secs(60),
                ..Self::healthy(name)
            }
        }
    }

    #[async_trait]
    impl DependencyProbe for StubProbe {
        fn name(&self) -> &str {
            &self.name
        }

        async fn probe(&self) -> ProbeOutcome {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.outcome.clone()
        }

        fn breaker_snapshot(&self) -> CircuitBreakerSnapshot {
            self.breaker.snapshot()
        }

        fn timeout_table(&self) -> Value {
            json!({"default_timeout": 30.0})
        }

        fn probe_timeout(&self) -> Duration {
            Duration::from_millis(100)
        }
    }

    fn service(status: HealthStatus) -> ServiceHealth {
        ServiceHealth {
            name: "test".to_string(),
            status,
            response_time: 0.01,
            last_check: Utc::now(),
            error_message: None,
            details: Value::Null,
        }
    }

    #[test]
    fn status_unhealthy_wins() {
        let services = vec![service(HealthStatus::Healthy), service(HealthStatus::Unhealthy)];
        assert_eq!(
            derive_overall_status(&services, &BTreeMap::new(), 0),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn status_degraded_on_open_breaker() {
        let breaker = CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: 1,
                ..CircuitBreakerConfig::default()
            },
        );
        breaker.record_failure();

        let mut breakers = BTreeMap::new();
        breakers.insert("test".to_string(), breaker.snapshot());

        assert_eq!(
            derive_overall_status(&[service(HealthStatus::Healthy)], &breakers, 0),
            HealthStatus::Degraded
        );
    }

    #[test]
    fn status_degraded_on_timeout_volume() {
        let services = vec![service(HealthStatus::Healthy)];
        assert_eq!(
            derive_overall_status(&services, &BTreeMap::new(), 11),
            HealthStatus::Degraded
        );
        assert_eq!(
            derive_overall_status(&services, &BTreeMap::new(), 10),
            HealthStatus::Healthy
        );
    }

    #[test]
    fn status_unknown_does_not_degrade() {
        let services = vec![service(HealthStatus::Unknown)];
        assert_eq!(
            derive_overall_status(&services, &BTreeMap::new(), 0),
            HealthStatus::Healthy
        );
    }

    #[tokio::test]
    async fn overall_health_aggregates_probes() {
        let events = Arc::new(TimeoutEventLog::default());
        let health = HealthService::new(
            vec![
                Arc::new(StubProbe::healthy("openai")),
                Arc::new(StubProbe::unhealthy("github")),
            ],
            events,
        );

        let snapshot = health.check_overall_health().await;
        assert_eq!(snapshot.status, HealthStatus::Unhealthy);
        assert_eq!(snapshot.services.len(), 2);
        assert!(snapshot.circuit_breakers.contains_key("openai"));
        assert!(snapshot.uptime >= 0.0);
    }

    #[tokio::test]
    async fn hanging_probe_is_bounded() {
        let events = Arc::new(TimeoutEventLog::default());
        let health = HealthService::new(vec![Arc::new(StubProbe::hanging("openai"))], events);

        let started = Instant::now();
        let snapshot = health.check_overall_health().await;

        // The 60s probe was cut off at its 100ms budget.
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(snapshot.services[0].status, HealthStatus::Unhealthy);
        assert!(
            snapshot.services[0]
                .error_message
                .as_deref()
                .unwrap()
                .contains("timed out")
        );
    }

    #[tokio::test]
    async fn timeout_health_degrades_above_threshold() {
        let events = Arc::new(TimeoutEventLog::default());
        let health = HealthService::new(vec![], Arc::clone(&events));

        for _ in 0..11 {
            events.record("openai", "analyze_code", 60.0, "deadline exceeded");
        }

        let timeout_health = health.check_timeout_health().await;
        assert_eq!(timeout_health.status, HealthStatus::Degraded);
        assert_eq!(timeout_health.total_recent_timeouts, 11);
    }

    #[tokio::test]
    async fn circuit_breakers_health_lists_open() {
        struct OpenProbe(StubProbe);

        #[async_trait]
        impl DependencyProbe for OpenProbe {
            fn name(&self) -> &str {
                self.0.name()
            }
            async fn probe(&self) -> ProbeOutcome {
                self.0.probe().await
            }
            fn breaker_snapshot(&self) -> CircuitBreakerSnapshot {
                self.0.breaker.snapshot()
            }
            fn timeout_table(&self) -> Value {
                self.0.timeout_table()
            }
            fn probe_timeout(&self) -> Duration {
                self.0.probe_timeout()
            }
        }

        let stub = StubProbe::healthy("openai");
        for _ in 0..5 {
            stub.breaker.record_failure();
        }

        let events = Arc::new(TimeoutEventLog::default());
        let health = HealthService::new(vec![Arc::new(OpenProbe(stub))], events);

        let breakers = health.check_circuit_breakers_health().await;
        assert_eq!(breakers.status, HealthStatus::Degraded);
        assert_eq!(breakers.open_breakers, vec!["openai".to_string()]);
    }
}
