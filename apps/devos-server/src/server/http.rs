//! HTTP/JSON API server implementation.
//!
//! Routes:
//!
//! - `GET /health` family - system health projections
//! - `POST /api/analyze/*`, `/api/generate/*`, `/api/optimize/*` - LLM-backed
//!   code operations
//! - `GET /api/integrations/github/status` - integration status
//!
//! Every route runs under the per-route timeout middleware; handlers map
//! breaker rejections, deadline overruns, and upstream failures onto the
//! standard error envelope.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::middleware::{RouteTimeouts, route_timeout};
use crate::error::ApiError;
use crate::health::{HealthService, HealthStatus};
use crate::integrations::github::GitHubClient;
use crate::integrations::openai::{OpenAiClient, Usage};
use crate::resilience::CallError;

/// Shared state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    /// Protected LLM client.
    pub openai: Arc<OpenAiClient>,
    /// Protected GitHub client.
    pub github: Arc<GitHubClient>,
    /// Health aggregation service.
    pub health: Arc<HealthService>,
    /// Per-route timeout ceilings.
    pub route_timeouts: Arc<RouteTimeouts>,
}

/// Create the Axum router with all endpoints.
#[must_use]
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(overall_health))
        .route("/health/timeout", get(timeout_health))
        .route("/health/services", get(services_health))
        .route("/health/circuit-breakers", get(circuit_breakers_health))
        .route("/health/ready", get(readiness_probe))
        .route("/health/live", get(liveness_probe))
        .route("/api/analyze/code", post(analyze_code))
        .route("/api/analyze/explain", post(explain_code))
        .route("/api/optimize/code", post(optimize_code))
        .route("/api/generate/code", post(generate_code))
        .route("/api/generate/tests", post(generate_tests))
        .route("/api/integrations/github/status", get(github_status))
        .layer(middleware::from_fn_with_state(state.clone(), route_timeout))
        .with_state(state)
}

// =============================================================================
// Health Endpoints
// =============================================================================

/// Overall system health. 200 for healthy/degraded, 503 for unhealthy.
async fn overall_health(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.health.check_overall_health().await;
    let status_code = if health.status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status_code, Json(health))
}

/// Timeout system health and configuration.
async fn timeout_health(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.health.check_timeout_health().await;
    let status_code = if health.status == HealthStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(health))
}

/// Individual service health statuses.
async fn services_health(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.health.check_services_health().await;
    let any_unhealthy = health
        .services
        .values()
        .any(|s| s.status == HealthStatus::Unhealthy);
    let status_code = if any_unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status_code, Json(health))
}

/// Circuit breaker states for all services.
async fn circuit_breakers_health(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.health.check_circuit_breakers_health().await;
    let status_code = if health.status == HealthStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(health))
}

/// Readiness probe: ready unless the system is unhealthy.
async fn readiness_probe(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.health.check_overall_health().await;
    let is_ready = health.status != HealthStatus::Unhealthy;

    let body = serde_json::json!({
        "status": if is_ready { "ready" } else { "not ready" },
        "timestamp": health.timestamp,
    });
    let status_code = if is_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(body))
}

/// Liveness probe: the process can respond at all. Touches no dependency.
async fn liveness_probe() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "alive",
        "timestamp": chrono::Utc::now(),
    }))
}

// =============================================================================
// Code Operation Endpoints
// =============================================================================

/// Request body for code operations.
#[derive(Debug, Serialize, Deserialize)]
pub struct CodeRequest {
    /// The code (or description, for generation) to operate on.
    pub code: String,
    /// Optional surrounding context.
    #[serde(default)]
    pub context: Option<String>,
}

impl CodeRequest {
    /// Validate and assemble the prompt.
    fn prompt(&self) -> Result<String, ApiError> {
        if self.code.trim().is_empty() {
            return Err(ApiError::validation("code must not be empty").with_detail("field", "code"));
        }
        Ok(self.context.as_ref().map_or_else(
            || self.code.clone(),
            |context| format!("{context}\n\n{}", self.code),
        ))
    }
}

/// Response from code analysis.
#[derive(Debug, Serialize)]
pub struct AnalyzeCodeResponse {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Analysis text.
    pub analysis: String,
    /// Token usage, when reported.
    pub usage: Option<Usage>,
}

/// Response from code explanation.
#[derive(Debug, Serialize)]
pub struct ExplainCodeResponse {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Explanation text.
    pub explanation: String,
    /// Token usage, when reported.
    pub usage: Option<Usage>,
}

/// Response from code optimization.
#[derive(Debug, Serialize)]
pub struct OptimizeCodeResponse {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Optimized code.
    pub optimized_code: String,
    /// Token usage, when reported.
    pub usage: Option<Usage>,
}

/// Response from code generation.
#[derive(Debug, Serialize)]
pub struct GenerateCodeResponse {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Generated code.
    pub code: String,
    /// Token usage, when reported.
    pub usage: Option<Usage>,
}

/// Response from test generation.
#[derive(Debug, Serialize)]
pub struct GenerateTestsResponse {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Generated tests.
    pub tests: String,
    /// Token usage, when reported.
    pub usage: Option<Usage>,
}

/// Analyze code endpoint.
async fn analyze_code(
    State(state): State<AppState>,
    Json(req): Json<CodeRequest>,
) -> Result<Json<AnalyzeCodeResponse>, ApiError> {
    let prompt = req.prompt()?;
    let output = state
        .openai
        .analyze_code(&prompt)
        .await
        .map_err(|e| map_call_error("openai", "analyze_code", e))?;

    Ok(Json(AnalyzeCodeResponse {
        success: true,
        analysis: output.content,
        usage: output.usage,
    }))
}

/// Explain code endpoint.
async fn explain_code(
    State(state): State<AppState>,
    Json(req): Json<CodeRequest>,
) -> Result<Json<ExplainCodeResponse>, ApiError> {
    let prompt = req.prompt()?;
    let output = state
        .openai
        .explain_code(&prompt)
        .await
        .map_err(|e| map_call_error("openai", "explain_code", e))?;

    Ok(Json(ExplainCodeResponse {
        success: true,
        explanation: output.content,
        usage: output.usage,
    }))
}

/// Optimize code endpoint.
async fn optimize_code(
    State(state): State<AppState>,
    Json(req): Json<CodeRequest>,
) -> Result<Json<OptimizeCodeResponse>, ApiError> {
    let prompt = req.prompt()?;
    let output = state
        .openai
        .optimize_code(&prompt)
        .await
        .map_err(|e| map_call_error("openai", "optimize_code", e))?;

    Ok(Json(OptimizeCodeResponse {
        success: true,
        optimized_code: output.content,
        usage: output.usage,
    }))
}

/// Generate code endpoint.
async fn generate_code(
    State(state): State<AppState>,
    Json(req): Json<CodeRequest>,
) -> Result<Json<GenerateCodeResponse>, ApiError> {
    let prompt = req.prompt()?;
    let output = state
        .openai
        .generate_code(&prompt)
        .await
        .map_err(|e| map_call_error("openai", "generate_code", e))?;

    Ok(Json(GenerateCodeResponse {
        success: true,
        code: output.content,
        usage: output.usage,
    }))
}

/// Generate tests endpoint.
async fn generate_tests(
    State(state): State<AppState>,
    Json(req): Json<CodeRequest>,
) -> Result<Json<GenerateTestsResponse>, ApiError> {
    let prompt = req.prompt()?;
    let output = state
        .openai
        .generate_tests(&prompt)
        .await
        .map_err(|e| map_call_error("openai", "generate_tests", e))?;

    Ok(Json(GenerateTestsResponse {
        success: true,
        tests: output.content,
        usage: output.usage,
    }))
}

// =============================================================================
// Integration Endpoints
// =============================================================================

/// GitHub integration status endpoint.
async fn github_status(
    State(state): State<AppState>,
) -> Result<Json<crate::integrations::github::GitHubStatus>, ApiError> {
    let status = state.github.get_status().await.map_err(ApiError::from)?;
    Ok(Json(status))
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Map a breaker-protected call failure onto the standard envelope.
fn map_call_error<E>(service: &str, operation: &str, err: CallError<E>) -> ApiError
where
    E: std::fmt::Display + std::fmt::Debug,
{
    match err {
        CallError::Open(e) => ApiError::from(e),
        CallError::Timeout(e) => ApiError::from(e),
        CallError::Inner(e) => {
            ApiError::unavailable(service, format!("{operation} failed: {e}"))
                .with_detail("operation", operation)
        }
    }
}
