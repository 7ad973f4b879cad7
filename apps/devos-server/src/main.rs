//! DevOS Server Binary
//!
//! Starts the DevOS API gateway.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin devos-server
//! ```
//!
//! # Environment Variables
//!
//! ## Optional
//! - `HTTP_PORT`: HTTP server port (default: 8000)
//! - `API_DEFAULT_TIMEOUT`: default per-route ceiling, seconds (default: 30)
//! - `OPENAI_API_KEY`: OpenAI key (absent: mock mode)
//! - `GITHUB_TOKEN`: GitHub token (absent: integration unconfigured)
//! - `<SERVICE>_<OPERATION>_TIMEOUT`: per-operation deadline override, seconds
//! - `<SERVICE>_CIRCUIT_BREAKER_*`: breaker tunables per service
//! - `RUST_LOG`: log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use devos_server::config::{CircuitBreakerSettings, ServerConfig, TimeoutPolicy};
use devos_server::health::HealthService;
use devos_server::integrations::github::{GitHubClient, GitHubConfig, GitHubError};
use devos_server::integrations::openai::{OpenAiClient, OpenAiConfig, OpenAiError};
use devos_server::resilience::{CircuitBreaker, TimeoutEventLog};
use devos_server::server::{AppState, RouteTimeouts, create_router};
use tokio::net::TcpListener;
use tokio::signal;

/// Headroom added on top of the inner per-operation deadline so route-level
/// timeouts stay attributable to the right layer.
const ROUTE_TIMEOUT_HEADROOM: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    init_tracing();

    tracing::info!("Starting DevOS server");

    let config = ServerConfig::from_env();
    log_config(&config);

    let events = Arc::new(TimeoutEventLog::default());
    let openai_timeouts = TimeoutPolicy::openai();
    let github_timeouts = TimeoutPolicy::github();

    let openai = create_openai(&openai_timeouts, &events)?;
    let github = create_github(&github_timeouts, &events)?;

    let health = Arc::new(HealthService::new(
        vec![Arc::clone(&openai) as _, Arc::clone(&github) as _],
        Arc::clone(&events),
    ));

    let route_timeouts = Arc::new(build_route_timeouts(
        &config,
        &openai_timeouts,
        &github_timeouts,
    ));

    let state = AppState {
        openai,
        github,
        health,
        route_timeouts,
    };
    let app = create_router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    tracing::info!(%addr, "HTTP server starting");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health (+ /timeout /services /circuit-breakers /ready /live)");
    tracing::info!("  POST /api/analyze/code");
    tracing::info!("  POST /api/analyze/explain");
    tracing::info!("  POST /api/optimize/code");
    tracing::info!("  POST /api/generate/code");
    tracing::info!("  POST /api/generate/tests");
    tracing::info!("  GET  /api/integrations/github/status");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("DevOS server stopped");
    Ok(())
}

/// Load .env file from the current or an ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Initialize the tracing subscriber with environment filter.
///
/// Uses static directive strings that are compile-time constants guaranteed to parse.
#[allow(clippy::expect_used)]
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                "devos_server=info"
                    .parse()
                    .expect("static directive 'devos_server=info' is valid"),
            ),
        )
        .init();
}

/// Log the parsed configuration.
fn log_config(config: &ServerConfig) {
    tracing::info!(
        http_port = config.http_port,
        default_route_timeout_secs = config.default_route_timeout.as_secs_f64(),
        "Configuration loaded"
    );
}

/// Create the protected OpenAI client.
fn create_openai(
    timeouts: &TimeoutPolicy,
    events: &Arc<TimeoutEventLog>,
) -> Result<Arc<OpenAiClient>, OpenAiError> {
    let breaker = CircuitBreaker::with_event_log(
        "openai",
        CircuitBreakerSettings::from_env("openai").to_resilience_config(),
        Arc::clone(events),
    );
    let client = OpenAiClient::new(
        OpenAiConfig::from_env(),
        timeouts.clone(),
        Arc::new(breaker),
    )?;

    tracing::info!(
        configured = client.is_configured(),
        "OpenAiClient initialized"
    );

    Ok(Arc::new(client))
}

/// Create the protected GitHub client.
fn create_github(
    timeouts: &TimeoutPolicy,
    events: &Arc<TimeoutEventLog>,
) -> Result<Arc<GitHubClient>, GitHubError> {
    let breaker = CircuitBreaker::with_event_log(
        "github",
        CircuitBreakerSettings::from_env("github").to_resilience_config(),
        Arc::clone(events),
    );
    let client = GitHubClient::new(
        GitHubConfig::from_env(),
        timeouts.clone(),
        Arc::new(breaker),
    )?;

    tracing::info!(
        configured = client.is_configured(),
        "GitHubClient initialized"
    );

    Ok(Arc::new(client))
}

/// Build the per-route ceiling table.
///
/// Each LLM-backed route gets its inner operation deadline plus headroom;
/// everything else falls back to the configured default.
fn build_route_timeouts(
    config: &ServerConfig,
    openai: &TimeoutPolicy,
    github: &TimeoutPolicy,
) -> RouteTimeouts {
    RouteTimeouts::new(config.default_route_timeout)
        .with_route(
            Method::POST,
            "/api/analyze/code",
            openai.get_timeout("analyze_code") + ROUTE_TIMEOUT_HEADROOM,
        )
        .with_route(
            Method::POST,
            "/api/analyze/explain",
            openai.get_timeout("explain_code") + ROUTE_TIMEOUT_HEADROOM,
        )
        .with_route(
            Method::POST,
            "/api/optimize/code",
            openai.get_timeout("optimize_code") + ROUTE_TIMEOUT_HEADROOM,
        )
        .with_route(
            Method::POST,
            "/api/generate/code",
            openai.get_timeout("generate_code") + ROUTE_TIMEOUT_HEADROOM,
        )
        .with_route(
            Method::POST,
            "/api/generate/tests",
            openai.get_timeout("generate_tests") + ROUTE_TIMEOUT_HEADROOM,
        )
        .with_route(
            Method::GET,
            "/api/integrations/github/status",
            github.get_timeout("get_status") + ROUTE_TIMEOUT_HEADROOM,
        )
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed: without them the process
/// cannot respond to termination, and failing fast at startup beats an
/// unresponsive server.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
