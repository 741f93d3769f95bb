//! Optional metrics instrumentation for tributary workers.
//!
//! When the `observe` feature is enabled, workers emit counters, histograms
//! and gauges via the [`metrics`] crate. A downstream application must install
//! a metrics recorder (e.g. `metrics-exporter-prometheus`) to collect them.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

use crate::types::{ProductType, TaskKind, ThresholdBucket};
use std::time::Duration;

/// Record a message that finished processing in the single-message path.
///
/// - `tributary.messages.processed_total` – counter with `kind` label
/// - `tributary.messages.failures` – histogram of failed attempts per message
#[inline]
pub fn record_message_processed(kind: TaskKind, failures: u32) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tributary.messages.processed_total", "kind" => kind.as_str())
            .increment(1);
        metrics::histogram!("tributary.messages.failures", "kind" => kind.as_str())
            .record(failures as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (kind, failures);
    }
}

/// Record a message whose retries were exhausted.
///
/// - `tributary.messages.exhausted_total` – counter with `kind` label
#[inline]
pub fn record_message_failure(kind: TaskKind, failures: u32) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tributary.messages.exhausted_total", "kind" => kind.as_str())
            .increment(1);
        metrics::histogram!("tributary.messages.failures", "kind" => kind.as_str())
            .record(failures as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (kind, failures);
    }
}

/// Record a successful flush cycle.
///
/// - `tributary.flush.total` – counter with `worker` label
/// - `tributary.flush.duration_seconds` – histogram
/// - `tributary.flush.tasks_total` – counter of tasks covered by the flush
#[inline]
pub fn record_flush(worker: &str, duration: Duration, tasks: u64) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tributary.flush.total", "worker" => worker.to_string()).increment(1);
        metrics::histogram!("tributary.flush.duration_seconds", "worker" => worker.to_string())
            .record(duration.as_secs_f64());
        metrics::counter!("tributary.flush.tasks_total", "worker" => worker.to_string())
            .increment(tasks);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (worker, duration, tasks);
    }
}

/// Record a failed flush attempt.
///
/// - `tributary.flush.failures_total` – counter with `worker` label
#[inline]
pub fn record_flush_retry(worker: &str, attempt: u32) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tributary.flush.failures_total", "worker" => worker.to_string())
            .increment(1);
        metrics::gauge!("tributary.flush.last_failed_attempt", "worker" => worker.to_string())
            .set(attempt as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (worker, attempt);
    }
}

/// Record a flush cycle abandoned after its retries were exhausted.
///
/// - `tributary.flush.abandoned_total` – counter with `worker` label
#[inline]
pub fn record_cycle_abandoned(worker: &str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tributary.flush.abandoned_total", "worker" => worker.to_string())
            .increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = worker;
    }
}

/// Record the lag between a task being enqueued and its cycle committing.
///
/// - `tributary.ingest.delay_seconds` – histogram with `worker` label
#[inline]
pub fn record_ingest_delay(worker: &str, delay_secs: f64) {
    #[cfg(feature = "observe")]
    {
        metrics::histogram!("tributary.ingest.delay_seconds", "worker" => worker.to_string())
            .record(delay_secs);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (worker, delay_secs);
    }
}

/// Record rows dropped before writing.
///
/// - `tributary.rows.filtered_total` – counter with `product` and `reason` labels
#[inline]
pub fn record_rows_filtered(product: ProductType, reason: &'static str, rows: u64) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!(
            "tributary.rows.filtered_total",
            "product" => product.as_str(),
            "reason" => reason
        )
        .increment(rows);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (product, reason, rows);
    }
}

/// Record a quota lookup against the shared cache.
///
/// - `tributary.quota.lookups_total` – counter with `result` label (`hit` / `miss`)
#[inline]
pub fn record_quota_lookup(product: ProductType, hit: bool) {
    #[cfg(feature = "observe")]
    {
        let result = if hit { "hit" } else { "miss" };
        metrics::counter!(
            "tributary.quota.lookups_total",
            "product" => product.as_str(),
            "result" => result
        )
        .increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (product, hit);
    }
}

/// Record the fate of a quota notification.
///
/// - `tributary.notifications.total` – counter with `product`, `bucket` and `outcome` labels
#[inline]
pub fn record_notification(product: ProductType, bucket: ThresholdBucket, outcome: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!(
            "tributary.notifications.total",
            "product" => product.as_str(),
            "bucket" => bucket.as_str(),
            "outcome" => outcome
        )
        .increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (product, bucket, outcome);
    }
}
