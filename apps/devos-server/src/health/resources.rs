//! Best-effort system resource figures for health snapshots.
//!
//! Reads `/proc` on Linux and degrades to an explanatory entry anywhere
//! else or on any read failure. Never fails the enclosing health check.

use serde_json::{Value, json};

/// Collect system resource figures, degrading gracefully when unavailable.
#[must_use]
pub fn system_resources() -> Value {
    collect().unwrap_or_else(|| json!({"error": "unable to retrieve system resources"}))
}

#[cfg(target_os = "linux")]
fn collect() -> Option<Value> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let total_kb = meminfo_field(&meminfo, "MemTotal:")?;
    let available_kb = meminfo_field(&meminfo, "MemAvailable:")?;
    let percent_used = if total_kb > 0 {
        (total_kb.saturating_sub(available_kb)) as f64 / total_kb as f64 * 100.0
    } else {
        0.0
    };

    let load_1m = std::fs::read_to_string("/proc/loadavg")
        .ok()
        .and_then(|s| s.split_whitespace().next().and_then(|v| v.parse::<f64>().ok()));

    Some(json!({
        "memory": {
            "total_kb": total_kb,
            "available_kb": available_kb,
            "percent_used": percent_used,
        },
        "load_average_1m": load_1m,
    }))
}

#[cfg(target_os = "linux")]
fn meminfo_field(meminfo: &str, field: &str) -> Option<u64> {
    meminfo
        .lines()
        .find(|line| line.starts_with(field))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|v| v.parse().ok())
}

#[cfg(not(target_os = "linux"))]
fn collect() -> Option<Value> {
    None
}
