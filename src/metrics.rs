/// Metrics and telemetry for the moderation engine
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Report intake outcomes
/// - Moderation actions and reversals
/// - Security events and findings
/// - Notification delivery and background jobs

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap();

    // ========== Report Metrics ==========

    /// Report submissions by outcome (accepted or rejection code)
    pub static ref REPORT_SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "report_submissions_total",
        "Total number of report submissions by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Reports waiting on a decision, refreshed by the health job
    pub static ref REPORTS_OPEN: IntGauge = register_int_gauge!(
        "reports_open",
        "Number of pending or under-review reports"
    )
    .unwrap();

    // ========== Moderation Metrics ==========

    /// Moderation actions by action type
    pub static ref MODERATION_ACTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "moderation_actions_total",
        "Total number of moderation actions",
        &["action_type"]
    )
    .unwrap();

    /// Reversed moderation actions by action type
    pub static ref MODERATION_REVERSALS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "moderation_reversals_total",
        "Total number of reversed moderation actions",
        &["action_type"]
    )
    .unwrap();

    /// Restrictions deactivated by the expiration sweep
    pub static ref RESTRICTIONS_EXPIRED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "restrictions_expired_total",
        "Total number of restrictions and suspensions cleared by the sweep",
        &["kind"]
    )
    .unwrap();

    // ========== Security Metrics ==========

    /// Security events by event type
    pub static ref SECURITY_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "security_events_total",
        "Total number of security events recorded",
        &["event_type"]
    )
    .unwrap();

    /// Suspicious activity findings by severity
    pub static ref SECURITY_FINDINGS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "security_findings_total",
        "Total number of suspicious activity findings",
        &["severity"]
    )
    .unwrap();

    // ========== Notification Metrics ==========

    /// Notification deliveries by status
    pub static ref NOTIFICATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "notifications_total",
        "Total number of notification delivery attempts",
        &["status"]
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job executions by job type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();

    /// Background job duration in seconds
    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "background_job_duration_seconds",
        "Background job execution time in seconds",
        &["job_type"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record the outcome of a report submission
pub fn record_report_outcome(outcome: &str) {
    REPORT_SUBMISSIONS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Update the open report gauge
pub fn set_open_reports(count: i64) {
    REPORTS_OPEN.set(count);
}

/// Record a moderation action
pub fn record_action_taken(action_type: &str) {
    MODERATION_ACTIONS_TOTAL.with_label_values(&[action_type]).inc();
}

/// Record a reversal
pub fn record_action_reversed(action_type: &str) {
    MODERATION_REVERSALS_TOTAL.with_label_values(&[action_type]).inc();
}

/// Record a sweep pass
pub fn record_sweep(restrictions: u64, suspensions: u64) {
    RESTRICTIONS_EXPIRED_TOTAL
        .with_label_values(&["restriction"])
        .inc_by(restrictions);
    RESTRICTIONS_EXPIRED_TOTAL
        .with_label_values(&["suspension"])
        .inc_by(suspensions);
}

/// Record a security event
pub fn record_security_event(event_type: &str) {
    SECURITY_EVENTS_TOTAL.with_label_values(&[event_type]).inc();
}

/// Record a suspicious activity finding
pub fn record_security_finding(severity: &str) {
    SECURITY_FINDINGS_TOTAL.with_label_values(&[severity]).inc();
}

/// Record a notification dispatch pass
pub fn record_notifications(delivered: usize, failed: usize) {
    NOTIFICATIONS_TOTAL
        .with_label_values(&["delivered"])
        .inc_by(delivered as u64);
    NOTIFICATIONS_TOTAL
        .with_label_values(&["failed"])
        .inc_by(failed as u64);
}

/// Record a background job execution
pub fn record_background_job(job_type: &str, status: &str, duration: f64) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_type])
        .observe(duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/api/moderation/queue", 200, 0.05);
        let metrics = render_metrics();
        assert!(metrics.contains("http_requests_total"));
        assert!(metrics.contains("http_request_duration_seconds"));
    }

    #[test]
    fn test_record_report_outcomes() {
        record_report_outcome("accepted");
        record_report_outcome("DuplicateReport");
        let metrics = render_metrics();
        assert!(metrics.contains("report_submissions_total"));
        assert!(metrics.contains("DuplicateReport"));
    }

    #[test]
    fn test_record_moderation_lifecycle() {
        record_action_taken("suspended");
        record_action_reversed("suspended");
        record_sweep(2, 1);
        let metrics = render_metrics();
        assert!(metrics.contains("moderation_actions_total"));
        assert!(metrics.contains("moderation_reversals_total"));
        assert!(metrics.contains("restrictions_expired_total"));
    }

    #[test]
    fn test_record_security_and_notifications() {
        record_security_event("self_report_attempt");
        record_security_finding("critical");
        record_notifications(3, 1);
        let metrics = render_metrics();
        assert!(metrics.contains("security_events_total"));
        assert!(metrics.contains("security_findings_total"));
        assert!(metrics.contains("notifications_total"));
    }

    #[test]
    fn test_record_background_job() {
        record_background_job("expiration_sweep", "success", 0.2);
        let metrics = render_metrics();
        assert!(metrics.contains("background_jobs_total"));
        assert!(metrics.contains("background_job_duration_seconds"));
    }
}
