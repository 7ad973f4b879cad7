//! Per-operation timeout policies.
//!
//! A [`TimeoutPolicy`] is an immutable mapping from operation name to
//! deadline, plus a default, built once at startup from environment
//! variables. Lookup never fails: an unknown operation falls back to the
//! service default, and an unparsable or non-positive override is ignored.
//!
//! # Environment Variables
//!
//! - `<SERVICE>_DEFAULT_TIMEOUT` - service default, seconds
//! - `<SERVICE>_<OPERATION>_TIMEOUT` - per-operation override, seconds
//!
//! e.g. `OPENAI_ANALYZE_CODE_TIMEOUT=120.0`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

/// Documented OpenAI operation timeouts, seconds.
const OPENAI_DEFAULT_TIMEOUT: f64 = 30.0;
const OPENAI_OPERATION_TIMEOUTS: &[(&str, f64)] = &[
    ("analyze_code", 60.0),
    ("generate_code", 90.0),
    ("explain_code", 45.0),
    ("optimize_code", 75.0),
    ("generate_tests", 120.0),
    ("test_connection", 10.0),
];

/// Documented GitHub operation timeouts, seconds.
const GITHUB_DEFAULT_TIMEOUT: f64 = 30.0;
const GITHUB_OPERATION_TIMEOUTS: &[(&str, f64)] = &[
    ("test_connection", 10.0),
    ("get_status", 15.0),
    ("setup", 60.0),
];

/// Immutable operation → deadline mapping for one service.
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    service: String,
    default_timeout: Duration,
    operations: BTreeMap<String, Duration>,
}

impl TimeoutPolicy {
    /// Build the OpenAI policy from the environment.
    #[must_use]
    pub fn openai() -> Self {
        Self::from_env("openai", OPENAI_DEFAULT_TIMEOUT, OPENAI_OPERATION_TIMEOUTS)
    }

    /// Build the GitHub policy from the environment.
    #[must_use]
    pub fn github() -> Self {
        Self::from_env("github", GITHUB_DEFAULT_TIMEOUT, GITHUB_OPERATION_TIMEOUTS)
    }

    /// Build a policy from environment variables for `service`, seeding the
    /// given documented defaults.
    #[must_use]
    pub fn from_env(service: &str, default_secs: f64, defaults: &[(&str, f64)]) -> Self {
        Self::from_lookup(service, default_secs, defaults, |key| {
            std::env::var(key).ok()
        })
    }

    fn from_lookup(
        service: &str,
        default_secs: f64,
        defaults: &[(&str, f64)],
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let prefix = service.to_uppercase();
        let default_timeout = resolve_secs(
            lookup(&format!("{prefix}_DEFAULT_TIMEOUT")),
            default_secs,
        );

        let operations = defaults
            .iter()
            .map(|(operation, secs)| {
                let key = format!("{prefix}_{}_TIMEOUT", operation.to_uppercase());
                (
                    (*operation).to_string(),
                    Duration::from_secs_f64(resolve_secs(lookup(&key), *secs)),
                )
            })
            .collect();

        Self {
            service: service.to_string(),
            default_timeout: Duration::from_secs_f64(default_timeout),
            operations,
        }
    }

    /// Get the service this policy belongs to.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Resolve the deadline for `operation`, falling back to the default.
    #[must_use]
    pub fn get_timeout(&self, operation: &str) -> Duration {
        self.operations
            .get(operation)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    /// The service default deadline.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Render the resolved table for health reporting.
    #[must_use]
    pub fn as_json(&self) -> Value {
        let mut table = serde_json::Map::new();
        table.insert(
            "default_timeout".to_string(),
            self.default_timeout.as_secs_f64().into(),
        );
        for (operation, timeout) in &self.operations {
            table.insert(
                format!("{operation}_timeout"),
                timeout.as_secs_f64().into(),
            );
        }
        Value::Object(table)
    }
}

/// Parse an override, ignoring unparsable or non-positive values.
fn resolve_secs(raw: Option<String>, default: f64) -> f64 {
    raw.and_then(|v| v.parse::<f64>().ok())
        .filter(|secs| *secs > 0.0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_openai_defaults() {
        let policy = TimeoutPolicy::from_lookup(
            "openai",
            OPENAI_DEFAULT_TIMEOUT,
            OPENAI_OPERATION_TIMEOUTS,
            |_| None,
        );

        assert_eq!(policy.get_timeout("analyze_code"), Duration::from_secs(60));
        assert_eq!(policy.get_timeout("generate_tests"), Duration::from_secs(120));
        assert_eq!(policy.get_timeout("test_connection"), Duration::from_secs(10));
        // Unknown operations fall back to the service default.
        assert_eq!(policy.get_timeout("unknown"), Duration::from_secs(30));
    }

    #[test]
    fn documented_github_defaults() {
        let policy = TimeoutPolicy::from_lookup(
            "github",
            GITHUB_DEFAULT_TIMEOUT,
            GITHUB_OPERATION_TIMEOUTS,
            |_| None,
        );

        assert_eq!(policy.get_timeout("get_status"), Duration::from_secs(15));
        assert_eq!(policy.get_timeout("unknown"), Duration::from_secs(30));
    }

    #[test]
    fn override_applies_to_named_operation() {
        let policy = TimeoutPolicy::from_lookup(
            "openai",
            OPENAI_DEFAULT_TIMEOUT,
            OPENAI_OPERATION_TIMEOUTS,
            |key| (key == "OPENAI_ANALYZE_CODE_TIMEOUT").then(|| "90.5".to_string()),
        );

        assert_eq!(
            policy.get_timeout("analyze_code"),
            Duration::from_secs_f64(90.5)
        );
        // Other operations keep their documented defaults.
        assert_eq!(policy.get_timeout("explain_code"), Duration::from_secs(45));
    }

    #[test]
    fn default_override_applies_to_unknown_operations() {
        let policy = TimeoutPolicy::from_lookup(
            "openai",
            OPENAI_DEFAULT_TIMEOUT,
            OPENAI_OPERATION_TIMEOUTS,
            |key| (key == "OPENAI_DEFAULT_TIMEOUT").then(|| "45.0".to_string()),
        );

        assert_eq!(policy.get_timeout("unknown"), Duration::from_secs(45));
    }

    #[test]
    fn invalid_overrides_fall_back_silently() {
        let policy = TimeoutPolicy::from_lookup(
            "openai",
            OPENAI_DEFAULT_TIMEOUT,
            OPENAI_OPERATION_TIMEOUTS,
            |key| match key {
                "OPENAI_ANALYZE_CODE_TIMEOUT" => Some("not-a-number".to_string()),
                "OPENAI_EXPLAIN_CODE_TIMEOUT" => Some("-5.0".to_string()),
                _ => None,
            },
        );

        assert_eq!(policy.get_timeout("analyze_code"), Duration::from_secs(60));
        assert_eq!(policy.get_timeout("explain_code"), Duration::from_secs(45));
    }

    #[test]
    fn json_table_includes_default_and_operations() {
        let policy = TimeoutPolicy::from_lookup(
            "github",
            GITHUB_DEFAULT_TIMEOUT,
            GITHUB_OPERATION_TIMEOUTS,
            |_| None,
        );
        let table = policy.as_json();

        assert_eq!(table["default_timeout"], 30.0);
        assert_eq!(table["test_connection_timeout"], 10.0);
        assert_eq!(table["setup_timeout"], 60.0);
    }
}
