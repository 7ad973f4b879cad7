//! Deadline-bound invocation for upstream calls.
//!
//! Wraps a future in a wall-clock deadline and converts overrun into a typed
//! [`TimeoutError`]. The deadline bounds the *caller's wait*, not necessarily
//! the callee's work: dropping the future cancels it at its next suspension
//! point, but work that cannot observe cancellation (e.g. a blocking call
//! already in flight on the upstream side) may continue in the background.
//! Late results from an abandoned operation are discarded, never applied.

use std::time::{Duration, Instant};

use thiserror::Error;

/// Typed failure for an operation that exceeded its deadline.
#[derive(Debug, Clone, Error)]
#[error("operation '{operation}' timed out after {timeout_seconds:.1}s")]
pub struct TimeoutError {
    /// Name of the operation that overran.
    pub operation: String,
    /// The configured limit, in seconds.
    pub timeout_seconds: f64,
    /// Wall-clock time actually spent waiting, in seconds.
    pub elapsed_seconds: f64,
}

/// Run `fut` under `limit`, converting overrun into a [`TimeoutError`].
///
/// The caller's wait is always bounded by `limit`.
///
/// # Errors
///
/// Returns [`TimeoutError`] if `fut` does not complete within `limit`.
pub async fn run_with_timeout<T, Fut>(
    operation: &str,
    limit: Duration,
    fut: Fut,
) -> Result<T, TimeoutError>
where
    Fut: Future<Output = T>,
{
    let started = Instant::now();
    match tokio::time::timeout(limit, fut).await {
        Ok(value) => Ok(value),
        Err(_) => {
            let elapsed = started.elapsed();
            tracing::warn!(
                operation,
                timeout_secs = limit.as_secs_f64(),
                elapsed_secs = elapsed.as_secs_f64(),
                "Operation timed out"
            );
            Err(TimeoutError {
                operation: operation.to_string(),
                timeout_seconds: limit.as_secs_f64(),
                elapsed_seconds: elapsed.as_secs_f64(),
            })
        }
    }
}
