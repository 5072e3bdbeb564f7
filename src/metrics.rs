// SPDX-License-Identifier: Apache-2.0

//! Process-wide counters for fan-out runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::Serialize;

#[derive(Default)]
struct DatabaseMetrics {
    attempted: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    duration_total_ms: AtomicU64,
    duration_max_ms: AtomicU64,
}

static DATABASE_METRICS: OnceLock<DatabaseMetrics> = OnceLock::new();

fn metrics() -> &'static DatabaseMetrics {
    DATABASE_METRICS.get_or_init(DatabaseMetrics::default)
}

/// Records one per-database query attempt.
pub fn record_database(duration_ms: f64, success: bool) {
    let duration_ms = duration_ms.max(0.0) as u64;
    let metrics = metrics();
    metrics.attempted.fetch_add(1, Ordering::Relaxed);
    if !success {
        metrics.failed.fetch_add(1, Ordering::Relaxed);
    }
    metrics
        .duration_total_ms
        .fetch_add(duration_ms, Ordering::Relaxed);
    metrics
        .duration_max_ms
        .fetch_max(duration_ms, Ordering::Relaxed);
}

/// Records a database skipped because the results map already had it.
pub fn record_skipped() {
    metrics().skipped.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseMetricsSnapshot {
    pub attempted: u64,
    pub failed: u64,
    pub skipped: u64,
    pub avg_ms: Option<f64>,
    pub max_ms: Option<u64>,
}

pub fn snapshot() -> DatabaseMetricsSnapshot {
    let metrics = metrics();
    let attempted = metrics.attempted.load(Ordering::Relaxed);
    let duration_total = metrics.duration_total_ms.load(Ordering::Relaxed);
    let max_ms = metrics.duration_max_ms.load(Ordering::Relaxed);

    DatabaseMetricsSnapshot {
        attempted,
        failed: metrics.failed.load(Ordering::Relaxed),
        skipped: metrics.skipped.load(Ordering::Relaxed),
        avg_ms: (attempted > 0).then(|| duration_total as f64 / attempted as f64),
        max_ms: (max_ms > 0).then_some(max_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters are global and other tests record concurrently, so only
    // lower bounds are asserted.
    #[test]
    fn counters_accumulate() {
        let initial = snapshot();

        record_database(120.0, true);
        record_database(40.0, false);
        record_skipped();

        let after = snapshot();
        assert!(after.attempted >= initial.attempted + 2);
        assert!(after.failed >= initial.failed + 1);
        assert!(after.skipped >= initial.skipped + 1);
        assert!(after.max_ms.is_some_and(|max| max >= 120));
        assert!(after.avg_ms.is_some());
    }
}
