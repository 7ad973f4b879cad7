//! GitHub API integration with timeout and circuit breaker protection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::TimeoutPolicy;
use crate::health::{DependencyProbe, ProbeOutcome};
use crate::resilience::{
    CallError, CircuitBreaker, CircuitBreakerSnapshot, CircuitBreakerState, TimeoutError,
    run_with_timeout,
};

/// Default API base URL.
const DEFAULT_API_BASE: &str = "https://api.github.com";

/// GitHub client configuration.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// Personal access token; absent means the integration is unconfigured.
    pub token: Option<String>,
    /// API base URL.
    pub api_base: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

impl GitHubConfig {
    /// Read configuration from the environment.
    ///
    /// Recognized variables: `GITHUB_TOKEN`, `GITHUB_API_BASE`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            token: std::env::var("GITHUB_TOKEN")
                .ok()
                .filter(|token| !token.is_empty()),
            api_base: std::env::var("GITHUB_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
        }
    }
}

/// GitHub API errors.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// Network-level failure.
    #[error("network error: {0}")]
    Network(String),
    /// The API returned an error status.
    #[error("GitHub API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or status text.
        message: String,
    },
}

/// Integration status report.
#[derive(Debug, Clone, Serialize)]
pub struct GitHubStatus {
    /// Whether the integration is usable.
    pub enabled: bool,
    /// Whether a token is configured.
    pub configured: bool,
    /// Current breaker state for the dependency.
    pub circuit_breaker_state: CircuitBreakerState,
}

/// Authenticated user payload from `GET /user`.
#[derive(Debug, Clone, Deserialize)]
struct AuthenticatedUser {
    login: String,
}

/// GitHub client guarded by a circuit breaker and per-operation deadlines.
pub struct GitHubClient {
    config: GitHubConfig,
    http: reqwest::Client,
    timeouts: TimeoutPolicy,
    breaker: Arc<CircuitBreaker>,
}

impl GitHubClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Network`] if the HTTP client cannot be built.
    pub fn new(
        config: GitHubConfig,
        timeouts: TimeoutPolicy,
        breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, GitHubError> {
        let http = reqwest::Client::builder()
            .user_agent("devos-server")
            .build()
            .map_err(|e| GitHubError::Network(e.to_string()))?;

        Ok(Self {
            config,
            http,
            timeouts,
            breaker,
        })
    }

    /// Whether a token is configured.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.config.token.is_some()
    }

    /// This client's circuit breaker.
    #[must_use]
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Verify API connectivity by fetching the authenticated user.
    pub async fn test_connection(&self) -> Result<Value, CallError<GitHubError>> {
        let timeout = self.timeouts.get_timeout("test_connection");
        self.breaker
            .call("test_connection", timeout, async {
                let user = self.get_authenticated_user().await?;
                Ok(json!({
                    "message": "GitHub API connection successful",
                    "authenticated_as": user.login,
                }))
            })
            .await
    }

    /// Report integration status. Local bookkeeping only, but still bounded
    /// by its operation deadline.
    pub async fn get_status(&self) -> Result<GitHubStatus, TimeoutError> {
        let timeout = self.timeouts.get_timeout("get_status");
        let configured = self.is_configured();
        let state = self.breaker.state();

        run_with_timeout("get_status", timeout, async move {
            GitHubStatus {
                enabled: configured,
                configured,
                circuit_breaker_state: state,
            }
        })
        .await
    }

    async fn get_authenticated_user(&self) -> Result<AuthenticatedUser, GitHubError> {
        let url = format!("{}/user", self.config.api_base);
        let token = self.config.token.as_deref().unwrap_or_default();

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| GitHubError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GitHubError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| GitHubError::Network(e.to_string()))
    }
}

#[async_trait]
impl DependencyProbe for GitHubClient {
    fn name(&self) -> &str {
        "github"
    }

    async fn probe(&self) -> ProbeOutcome {
        if !self.is_configured() {
            return ProbeOutcome::unknown("no GitHub token configured");
        }

        match self.test_connection().await {
            Ok(details) => ProbeOutcome::healthy(details),
            Err(e) => ProbeOutcome::unhealthy(e.to_string()),
        }
    }

    fn breaker_snapshot(&self) -> CircuitBreakerSnapshot {
        self.breaker.snapshot()
    }

    fn timeout_table(&self) -> Value {
        self.timeouts.as_json()
    }

    fn probe_timeout(&self) -> Duration {
        self.timeouts.get_timeout("test_connection")
    }
}
