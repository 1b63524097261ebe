//! Prometheus metrics for request and backend monitoring.
//!
//! This module provides metrics for:
//! - Student requests per operation
//! - Failed student requests per operation
//! - Backend call latency
//! - Backend logins

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::debug;

use crate::student::Operation;

// === Metric Name Constants ===

/// Student requests counter metric name.
pub const METRIC_STUDENT_REQUESTS: &str = "student_requests_total";
/// Failed student requests counter metric name.
pub const METRIC_STUDENT_REQUEST_FAILURES: &str = "student_request_failures_total";
/// Backend call latency metric name.
pub const METRIC_BACKEND_LATENCY: &str = "backend_request_latency_ms";
/// Backend logins counter metric name.
pub const METRIC_BACKEND_LOGINS: &str = "backend_logins_total";

/// Install the Prometheus recorder and return the handle used by `/metrics`.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_counter!(
        METRIC_STUDENT_REQUESTS,
        "Total number of student requests received"
    );
    describe_counter!(
        METRIC_STUDENT_REQUEST_FAILURES,
        "Total number of student requests whose service call failed"
    );
    describe_histogram!(
        METRIC_BACKEND_LATENCY,
        "Student backend call latency in milliseconds"
    );
    describe_counter!(
        METRIC_BACKEND_LOGINS,
        "Total number of backend service-account logins"
    );

    debug!("Metrics initialized");
}

/// Increment the request counter for an operation.
pub fn inc_student_request(operation: Operation) {
    counter!(METRIC_STUDENT_REQUESTS, "operation" => operation.as_str()).increment(1);
}

/// Increment the failure counter for an operation.
pub fn inc_student_request_failure(operation: Operation) {
    counter!(METRIC_STUDENT_REQUEST_FAILURES, "operation" => operation.as_str()).increment(1);
}

/// Record backend call latency.
pub fn record_backend_latency(start: Instant, operation: Operation) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_BACKEND_LATENCY, "operation" => operation.as_str()).record(latency_ms);
}

/// Increment backend logins counter.
pub fn inc_backend_logins() {
    counter!(METRIC_BACKEND_LOGINS).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_a_noop() {
        init_metrics();
        inc_student_request(Operation::ListStudents);
        inc_student_request_failure(Operation::AddStudent);
        record_backend_latency(Instant::now(), Operation::Login);
        inc_backend_logins();
    }
}
