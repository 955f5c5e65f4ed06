use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};

/// Metrics collection and management
///
/// Records through the `metrics` facade; without an installed recorder every
/// call is a no-op.
#[derive(Debug, Clone, Copy)]
pub struct MetricsCollector {
    // Database metrics
    pub db_operations_total: &'static str,
    pub db_operation_duration: &'static str,
    pub db_connection_pool_size: &'static str,

    // Rollup metrics
    pub summaries_upserted_total: &'static str,

    // Error metrics
    pub errors_total: &'static str,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            db_operations_total: "issue_tracker_db_operations_total",
            db_operation_duration: "issue_tracker_db_operation_duration_seconds",
            db_connection_pool_size: "issue_tracker_db_connection_pool_size",

            summaries_upserted_total: "issue_tracker_summaries_upserted_total",

            errors_total: "issue_tracker_errors_total",
        }
    }
}

impl MetricsCollector {
    /// Record database operation metrics
    pub fn record_db_operation(&self, operation: &str, duration: Duration, success: bool) {
        let status = if success { "success" } else { "error" };

        counter!(
            self.db_operations_total,
            "operation" => operation.to_string(),
            "status" => status
        )
        .increment(1);
        histogram!(self.db_operation_duration, "operation" => operation.to_string())
            .record(duration.as_secs_f64());
    }

    /// Record a persisted rollup
    pub fn record_summary_upsert(&self, granularity: &str) {
        counter!(self.summaries_upserted_total, "granularity" => granularity.to_string())
            .increment(1);
    }

    /// Record error metrics
    pub fn record_error(&self, error_kind: &str, operation: &str) {
        counter!(
            self.errors_total,
            "kind" => error_kind.to_string(),
            "operation" => operation.to_string()
        )
        .increment(1);
    }

    /// Update connection pool size
    pub fn update_connection_pool_size(&self, size: u32) {
        gauge!(self.db_connection_pool_size).set(f64::from(size));
    }
}

/// Performance timing wrapper for metrics
pub struct MetricsTimer {
    collector: MetricsCollector,
    operation: String,
    start: Instant,
}

impl MetricsTimer {
    pub fn new(collector: MetricsCollector, operation: &str) -> Self {
        Self {
            collector,
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self, success: bool) {
        let duration = self.start.elapsed();
        self.collector.record_db_operation(&self.operation, duration, success);
    }
}
