//! Server configuration, loaded from environment variables.

pub mod circuit_breaker;
pub mod timeout;

pub use circuit_breaker::CircuitBreakerSettings;
pub use timeout::TimeoutPolicy;

use std::time::Duration;

/// Default HTTP server port.
const DEFAULT_HTTP_PORT: u16 = 8000;

/// Default per-route ceiling, seconds.
const DEFAULT_ROUTE_TIMEOUT: f64 = 30.0;

/// Top-level server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port.
    pub http_port: u16,
    /// Default per-route request ceiling applied by the timeout middleware.
    pub default_route_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            default_route_timeout: Duration::from_secs_f64(DEFAULT_ROUTE_TIMEOUT),
        }
    }
}

impl ServerConfig {
    /// Read settings from the environment.
    ///
    /// Recognized variables: `HTTP_PORT`, `API_DEFAULT_TIMEOUT` (seconds).
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            http_port: parse_env_u16("HTTP_PORT", DEFAULT_HTTP_PORT),
            default_route_timeout: Duration::from_secs_f64(parse_env_positive_f64(
                "API_DEFAULT_TIMEOUT",
                DEFAULT_ROUTE_TIMEOUT,
            )),
        }
    }
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_positive_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|secs| *secs > 0.0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.http_port, 8000);
        assert_eq!(config.default_route_timeout, Duration::from_secs(30));
    }
}
