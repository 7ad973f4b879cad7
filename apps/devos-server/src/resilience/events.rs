//! Bounded log of timeout events.
//!
//! A fixed-capacity ring shared by every protected call site. Appends never
//! fail and never block behind readers for long; once full, the oldest entry
//! is dropped. Readers only ever observe fully written entries.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Default ring capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// A recorded timeout event.
#[derive(Debug, Clone, Serialize)]
pub struct TimeoutEvent {
    /// Service that timed out (e.g. `openai`, `github`, `api`).
    pub service: String,
    /// Operation that timed out.
    pub operation: String,
    /// The limit that was exceeded, in seconds.
    pub timeout_seconds: f64,
    /// Error description.
    pub error: String,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Fixed-capacity, append-only log of timeout events.
///
/// Mutations are serialized through one mutex; a poisoned lock is recovered
/// rather than propagated so recording can never raise.
#[derive(Debug)]
pub struct TimeoutEventLog {
    capacity: usize,
    events: Mutex<VecDeque<TimeoutEvent>>,
}

impl Default for TimeoutEventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl TimeoutEventLog {
    /// Create a log holding at most `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append an event, dropping the oldest entry if the log is full.
    pub fn record(
        &self,
        service: impl Into<String>,
        operation: impl Into<String>,
        timeout_seconds: f64,
        error: impl Into<String>,
    ) {
        let event = TimeoutEvent {
            service: service.into(),
            operation: operation.into(),
            timeout_seconds,
            error: error.into(),
            timestamp: Utc::now(),
        };

        tracing::warn!(
            service = %event.service,
            operation = %event.operation,
            timeout_secs = event.timeout_seconds,
            error = %event.error,
            "Timeout event recorded"
        );

        let mut events = self
            .events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        events.push_back(event);
        while events.len() > self.capacity {
            events.pop_front();
        }
    }

    /// Number of events currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The most recent `count` events, oldest first.
    #[must_use]
    pub fn recent(&self, count: usize) -> Vec<TimeoutEvent> {
        let events = self
            .events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let skip = events.len().saturating_sub(count);
        events.iter().skip(skip).cloned().collect()
    }

    /// Events recorded at or after `cutoff`, oldest first.
    #[must_use]
    pub fn recorded_since(&self, cutoff: DateTime<Utc>) -> Vec<TimeoutEvent> {
        let events = self
            .events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        events
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_append_order() {
        let log = TimeoutEventLog::default();
        log.record("openai", "analyze_code", 60.0, "deadline exceeded");
        log.record("github", "test_connection", 10.0, "deadline exceeded");

        let events = log.recent(10);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].service, "openai");
        assert_eq!(events[1].service, "github");
    }

    #[test]
    fn drops_oldest_at_capacity() {
        let log = TimeoutEventLog::default();
        for i in 0..150 {
            log.record("openai", format!("op_{i}"), 30.0, "deadline exceeded");
        }

        assert_eq!(log.len(), 100);
        let events = log.recent(100);
        assert_eq!(events[0].operation, "op_50");
        assert_eq!(events[99].operation, "op_149");
    }

    #[test]
    fn recent_limits_count() {
        let log = TimeoutEventLog::default();
        for i in 0..20 {
            log.record("api", format!("op_{i}"), 30.0, "deadline exceeded");
        }

        let events = log.recent(10);
        assert_eq!(events.len(), 10);
        assert_eq!(events[0].operation, "op_10");
    }

    #[test]
    fn recorded_since_filters_by_time() {
        let log = TimeoutEventLog::default();
        log.record("openai", "old", 30.0, "deadline exceeded");

        let cutoff = Utc::now() - chrono::Duration::hours(24);
        assert_eq!(log.recorded_since(cutoff).len(), 1);

        let future_cutoff = Utc::now() + chrono::Duration::hours(1);
        assert!(log.recorded_since(future_cutoff).is_empty());
    }

    #[test]
    fn concurrent_recording() {
        use std::sync::Arc;

        let log = Arc::new(TimeoutEventLog::default());
        let mut handles = vec![];
        for _ in 0..8 {
            let log = Arc::clone(&log);
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    log.record("openai", "op", 30.0, "deadline exceeded");
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        // 400 appends through a 100-slot ring leave exactly 100.
        assert_eq!(log.len(), 100);
    }
}
