//! Optional metrics instrumentation for vex.
//!
//! When the `observe` feature is enabled, scans, plans and row mutations emit
//! counters, histograms, and gauges via the [`metrics`] crate. A downstream
//! application must install a metrics recorder (e.g. `metrics-exporter-prometheus`)
//! to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record a completed KNN scan.
///
/// - `vex.knn.scans_total` – incremented on every scan
/// - `vex.knn.scan_duration_seconds` – histogram of filtering latency
/// - `vex.knn.rows_scanned_total` – counter of candidate rows scored
/// - `vex.knn.rows_emitted_total` – counter of neighbors returned
#[inline]
pub fn record_knn_scan(duration: std::time::Duration, rows_scanned: u64, rows_emitted: u64) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("vex.knn.scans_total").increment(1);
        metrics::histogram!("vex.knn.scan_duration_seconds").record(duration.as_secs_f64());
        metrics::counter!("vex.knn.rows_scanned_total").increment(rows_scanned);
        metrics::counter!("vex.knn.rows_emitted_total").increment(rows_emitted);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, rows_scanned, rows_emitted);
    }
}

/// Record the peak candidate heap size of the last scan.
///
/// - `vex.knn.heap_peak` – gauge
#[inline]
pub fn set_heap_peak(len: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::gauge!("vex.knn.heap_peak").set(len as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = len;
    }
}

/// Record the strategy chosen by the planner.
///
/// - `vex.plan.chosen_total` – counter with `strategy` label
#[inline]
pub fn record_plan(strategy: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("vex.plan.chosen_total", "strategy" => strategy).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = strategy;
    }
}

/// Record a planner fallback after an infeasible KNN shape.
///
/// - `vex.plan.fallbacks_total` – counter
#[inline]
pub fn record_plan_fallback() {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("vex.plan.fallbacks_total").increment(1);
    }
}

/// Record a row mutation through the virtual table.
///
/// - `vex.rows.mutations_total` – counter with `kind` label (`insert` / `update` / `delete`)
#[inline]
pub fn record_row_mutation(kind: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("vex.rows.mutations_total", "kind" => kind).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = kind;
    }
}
