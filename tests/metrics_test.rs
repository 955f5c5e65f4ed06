//! Unit tests for metrics.rs module

use std::time::Duration;

use issue_tracker::metrics::{MetricsCollector, MetricsTimer};

#[test]
fn test_metrics_collector_default_names() {
    let collector = MetricsCollector::default();
    assert_eq!(collector.db_operations_total, "issue_tracker_db_operations_total");
    assert_eq!(
        collector.db_operation_duration,
        "issue_tracker_db_operation_duration_seconds"
    );
    assert_eq!(collector.db_connection_pool_size, "issue_tracker_db_connection_pool_size");
    assert_eq!(collector.summaries_upserted_total, "issue_tracker_summaries_upserted_total");
    assert_eq!(collector.errors_total, "issue_tracker_errors_total");
}

#[test]
fn test_record_db_operation_success_and_failure() {
    let collector = MetricsCollector::default();
    collector.record_db_operation("list_issues", Duration::from_millis(12), true);
    collector.record_db_operation("list_issues", Duration::from_millis(40), false);
}

#[test]
fn test_record_summary_upserts() {
    let collector = MetricsCollector::default();
    collector.record_summary_upsert("monthly");
    collector.record_summary_upsert("annual");
}

#[test]
fn test_record_error_and_pool_size() {
    let collector = MetricsCollector::default();
    collector.record_error("store_error", "process_summary");
    collector.update_connection_pool_size(10);
}

#[test]
fn test_metrics_timer() {
    let collector = MetricsCollector::default();
    let timer = MetricsTimer::new(collector, "yearly_trend");
    std::thread::sleep(Duration::from_millis(2));
    timer.finish(true);
}

#[test]
fn test_collector_is_copy() {
    let collector = MetricsCollector::default();
    let copied = collector;
    MetricsTimer::new(collector, "a").finish(true);
    MetricsTimer::new(copied, "b").finish(false);
}
