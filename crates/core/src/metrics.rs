//! Prometheus metrics for batch conversions.
//!
//! This module provides metrics for:
//! - Task outcomes (succeeded, failed, skipped, cancelled)
//! - Conversion duration
//! - Metadata transfer failures
//! - Active workers

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tracing::warn;

use crate::task::{TaskResult, TaskStatus};

/// Registry holding every vidtune metric.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    for metric in all_metrics() {
        if let Err(e) = registry.register(metric) {
            warn!(error = %e, "Failed to register metric");
        }
    }
    registry
});

// =============================================================================
// Task Metrics
// =============================================================================

/// Tasks total by terminal status.
pub static TASKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vidtune_tasks_total", "Total tasks by terminal status"),
        &["result"], // "succeeded", "failed", "skipped", "cancelled"
    )
    .unwrap()
});

/// Conversion duration in seconds, successful tasks only.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "vidtune_conversion_duration_seconds",
            "Duration of successful conversions",
        )
        .buckets(vec![
            0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0,
        ]),
        &["bitrate"],
    )
    .unwrap()
});

/// Metadata transfers that failed on an otherwise successful task.
pub static METADATA_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "vidtune_metadata_failures_total",
        "Total metadata transfers that failed",
    )
    .unwrap()
});

/// Workers currently running a conversion.
pub static ACTIVE_WORKERS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("vidtune_active_workers", "Conversions currently running").unwrap()
});

/// Batches total by final status.
pub static BATCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vidtune_batches_total", "Total batches by final status"),
        &["status"], // "completed", "aborted"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Records a terminal task result.
pub fn record_task_result(result: &TaskResult, bitrate_kbps: Option<u32>) {
    TASKS_TOTAL
        .with_label_values(&[result.status.as_str()])
        .inc();

    if result.status == TaskStatus::Succeeded {
        let bitrate = bitrate_kbps.map(|b| b.to_string()).unwrap_or_default();
        CONVERSION_DURATION
            .with_label_values(&[bitrate.as_str()])
            .observe(result.elapsed().as_secs_f64());
    }
}

/// Holds a gauge incremented until dropped, so a panicking worker still
/// gives its slot back.
pub struct GaugeGuard {
    gauge: IntGauge,
}

impl GaugeGuard {
    pub fn new(gauge: &IntGauge) -> Self {
        gauge.inc();
        Self {
            gauge: gauge.clone(),
        }
    }
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

/// Get all metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(TASKS_TOTAL.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(METADATA_FAILURES.clone()),
        Box::new(ACTIVE_WORKERS.clone()),
        Box::new(BATCHES_TOTAL.clone()),
    ]
}

/// Encode all metrics as Prometheus text format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{InvalidTaskError, TaskId};
    use std::path::PathBuf;

    #[test]
    fn test_gauge_guard_released_on_panic() {
        let gauge = IntGauge::new("test_active", "test gauge").unwrap();

        {
            let _guard = GaugeGuard::new(&gauge);
            assert_eq!(gauge.get(), 1);
        }
        assert_eq!(gauge.get(), 0);

        let worker_gauge = gauge.clone();
        let joined = std::thread::spawn(move || {
            let _guard = GaugeGuard::new(&worker_gauge);
            panic!("worker died");
        })
        .join();
        assert!(joined.is_err());
        assert_eq!(gauge.get(), 0);
    }

    #[test]
    fn test_render_contains_metrics() {
        // Prometheus only outputs vector metrics that have been accessed
        let err = InvalidTaskError::SourceNotFound {
            path: PathBuf::from("/missing.mp4"),
        };
        record_task_result(&TaskResult::skipped(TaskId(1), "/missing.mp4", &err), None);
        METADATA_FAILURES.inc();
        ACTIVE_WORKERS.set(0);
        BATCHES_TOTAL.with_label_values(&["completed"]).inc();

        let output = render();
        assert!(output.contains("vidtune_tasks_total"));
        assert!(output.contains("result=\"skipped\""));
        assert!(output.contains("vidtune_metadata_failures_total"));
        assert!(output.contains("vidtune_active_workers"));
        assert!(output.contains("vidtune_batches_total"));
        assert!(output.contains("# HELP"));
    }
}
