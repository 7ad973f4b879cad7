//! Circuit breaker configuration from the environment.
//!
//! # Environment Variables
//!
//! - `<SERVICE>_CIRCUIT_BREAKER_FAILURE_THRESHOLD` (default: 5)
//! - `<SERVICE>_CIRCUIT_BREAKER_RECOVERY_TIMEOUT` (seconds, default: 60.0)
//! - `<SERVICE>_CIRCUIT_BREAKER_SUCCESS_THRESHOLD` (default: 3)
//! - `<SERVICE>_CIRCUIT_BREAKER_TIMEOUT` (seconds, default: 30.0)

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Circuit breaker settings as read from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures before opening.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds to wait before probing recovery.
    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout_secs: f64,
    /// Consecutive successes to close from half-open.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// Default per-call deadline, seconds.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: f64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout(),
            success_threshold: default_success_threshold(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

impl CircuitBreakerSettings {
    /// Read the settings for `service` from the environment.
    #[must_use]
    pub fn from_env(service: &str) -> Self {
        Self::from_lookup(service, |key| std::env::var(key).ok())
    }

    fn from_lookup(service: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let prefix = format!("{}_CIRCUIT_BREAKER", service.to_uppercase());
        let defaults = Self::default();
        Self {
            failure_threshold: parse_or(
                lookup(&format!("{prefix}_FAILURE_THRESHOLD")),
                defaults.failure_threshold,
            ),
            recovery_timeout_secs: parse_positive_or(
                lookup(&format!("{prefix}_RECOVERY_TIMEOUT")),
                defaults.recovery_timeout_secs,
            ),
            success_threshold: parse_or(
                lookup(&format!("{prefix}_SUCCESS_THRESHOLD")),
                defaults.success_threshold,
            ),
            call_timeout_secs: parse_positive_or(
                lookup(&format!("{prefix}_TIMEOUT")),
                defaults.call_timeout_secs,
            ),
        }
    }

    /// Convert to the resilience module's `CircuitBreakerConfig`.
    #[must_use]
    pub fn to_resilience_config(&self) -> crate::resilience::CircuitBreakerConfig {
        crate::resilience::CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_secs_f64(self.recovery_timeout_secs),
            success_threshold: self.success_threshold,
            call_timeout: Duration::from_secs_f64(self.call_timeout_secs),
        }
    }
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_recovery_timeout() -> f64 {
    60.0
}

const fn default_success_threshold() -> u32 {
    3
}

const fn default_call_timeout() -> f64 {
    30.0
}

fn parse_or(raw: Option<String>, default: u32) -> u32 {
    raw.and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_positive_or(raw: Option<String>, default: f64) -> f64 {
    raw.and_then(|v| v.parse::<f64>().ok())
        .filter(|secs| *secs > 0.0)
        .unwrap_or(default)
}
