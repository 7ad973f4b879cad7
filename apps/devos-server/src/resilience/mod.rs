//! Resilience primitives for upstream calls.
//!
//! Everything here is built once at composition time and injected where it
//! is used; there are no ambient singletons. Per-dependency state (a breaker
//! per service, one shared timeout-event log) is synchronized internally so
//! call sites stay lock-free.

pub mod circuit_breaker;
pub mod events;
pub mod timeout;

pub use circuit_breaker::{
    CallError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerOpenError,
    CircuitBreakerSnapshot, CircuitBreakerState,
};
pub use events::{DEFAULT_EVENT_CAPACITY, TimeoutEvent, TimeoutEventLog};
pub use timeout::{TimeoutError, run_with_timeout};
