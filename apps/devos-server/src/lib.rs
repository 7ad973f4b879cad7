// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::default_trait_access
    )
)]

//! DevOS Server - Core Library
//!
//! API gateway for the DevOS developer-operations system. Outbound calls to
//! unreliable dependencies (OpenAI, GitHub) are shielded by a resilience
//! core: per-operation deadlines, a circuit breaker per dependency, and a
//! health aggregation service that summarizes breaker and timeout state.
//!
//! # Layers
//!
//! - `resilience`: circuit breaker, deadline-bound invocation, timeout-event log
//! - `config`: environment-driven settings (timeout policies, breaker tunables)
//! - `integrations`: protected upstream clients (OpenAI, GitHub)
//! - `health`: probe aggregation and system health snapshots
//! - `server`: axum router, handlers, per-route timeout middleware
//! - `error`: error taxonomy and the shared HTTP envelope
//!
//! All state is in-memory and reset on restart. Components are constructed
//! once at the composition root and injected explicitly; there are no
//! ambient singletons.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Environment-driven configuration.
pub mod config;

/// Error taxonomy and HTTP envelope.
pub mod error;

/// Health aggregation.
pub mod health;

/// Protected upstream integrations.
pub mod integrations;

/// Resilience primitives.
pub mod resilience;

/// HTTP server.
pub mod server;

// Re-exports for common composition-time types.
pub use config::{CircuitBreakerSettings, ServerConfig, TimeoutPolicy};
pub use error::{ApiError, ErrorCode};
pub use health::{DependencyProbe, HealthService, HealthStatus, SystemHealth};
pub use integrations::github::{GitHubClient, GitHubConfig};
pub use integrations::openai::{OpenAiClient, OpenAiConfig};
pub use resilience::{
    CallError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState, TimeoutError,
    TimeoutEventLog,
};
pub use server::{AppState, RouteTimeouts, create_router};
