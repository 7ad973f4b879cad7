//! Request timeout middleware.
//!
//! Enforces an outer per-route ceiling on total request-handling time,
//! independent of any breaker or deadline used inside the handler. The
//! lookup key is an exact `(method, path)` pair configured at startup; no
//! path-template matching. On overrun the in-flight handler future is
//! dropped and the client receives the standard 408 envelope. There are no
//! retries at this layer.
//!
//! Inner per-dependency timeouts should be configured smaller than this
//! ceiling so failures are attributable to the right layer.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::http::AppState;
use crate::error::{ApiError, ErrorCode};

/// Per-route timeout table with a default ceiling.
#[derive(Debug, Clone)]
pub struct RouteTimeouts {
    default: Duration,
    routes: HashMap<(Method, String), Duration>,
}

impl RouteTimeouts {
    /// Create a table with only the default ceiling.
    #[must_use]
    pub fn new(default: Duration) -> Self {
        Self {
            default,
            routes: HashMap::new(),
        }
    }

    /// Set the ceiling for an exact `(method, path)` pair.
    #[must_use]
    pub fn with_route(mut self, method: Method, path: impl Into<String>, timeout: Duration) -> Self {
        self.routes.insert((method, path.into()), timeout);
        self
    }

    /// Resolve the ceiling for a request.
    #[must_use]
    pub fn timeout_for(&self, method: &Method, path: &str) -> Duration {
        self.routes
            .get(&(method.clone(), path.to_string()))
            .copied()
            .unwrap_or(self.default)
    }

    /// The default ceiling.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        self.default
    }
}

/// Bound the downstream handler by the route's configured ceiling.
pub async fn route_timeout(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let limit = state.route_timeouts.timeout_for(&method, &path);
    let started = Instant::now();

    match tokio::time::timeout(limit, next.run(req)).await {
        Ok(response) => {
            tracing::debug!(
                method = %method,
                path = %path,
                duration_secs = started.elapsed().as_secs_f64(),
                "Request completed"
            );
            response
        }
        Err(_) => {
            let elapsed = started.elapsed();
            tracing::warn!(
                method = %method,
                path = %path,
                timeout_limit_secs = limit.as_secs_f64(),
                actual_duration_secs = elapsed.as_secs_f64(),
                "Request timed out"
            );

            state.health.record_timeout_event(
                "api",
                format!("{method} {path}"),
                limit.as_secs_f64(),
                format!("Request timed out after {:.1} seconds", limit.as_secs_f64()),
            );

            ApiError::new(
                ErrorCode::TimeoutError,
                format!("Request timed out after {:.1} seconds", limit.as_secs_f64()),
            )
            .with_detail("timeout_limit", limit.as_secs_f64())
            .with_detail("actual_duration", elapsed.as_secs_f64())
            .with_detail("path", path)
            .with_detail("method", method.as_str())
            .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_route_lookup() {
        let timeouts = RouteTimeouts::new(Duration::from_secs(30))
            .with_route(Method::POST, "/api/test", Duration::from_secs(10))
            .with_route(Method::GET, "/api/health", Duration::from_secs(5));

        assert_eq!(
            timeouts.timeout_for(&Method::POST, "/api/test"),
            Duration::from_secs(10)
        );
        assert_eq!(
            timeouts.timeout_for(&Method::GET, "/api/health"),
            Duration::from_secs(5)
        );
        // Method must match exactly.
        assert_eq!(
            timeouts.timeout_for(&Method::GET, "/api/test"),
            Duration::from_secs(30)
        );
        // Unknown path gets the default.
        assert_eq!(
            timeouts.timeout_for(&Method::GET, "/api/unknown"),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn no_template_matching() {
        let timeouts = RouteTimeouts::new(Duration::from_secs(30)).with_route(
            Method::GET,
            "/api/items",
            Duration::from_secs(5),
        );

        // Literal strings only; a subpath is a different key.
        assert_eq!(
            timeouts.timeout_for(&Method::GET, "/api/items/42"),
            Duration::from_secs(30)
        );
    }
}
