//! HTTP server: router, handlers, and request middleware.

pub mod http;
pub mod middleware;

pub use http::{AppState, create_router};
pub use middleware::{RouteTimeouts, route_timeout};
