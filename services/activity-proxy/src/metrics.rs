//! Prometheus metrics exposition
//!
//! - `proxy_requests_total` (counter): labels `status`, `method`
//! - `proxy_request_duration_seconds` (histogram): label `status`
//! - `proxy_upstream_errors_total` (counter): label `error_type`
//!
//! `upstream_token_requests_total` is recorded by the `upstream-auth` crate
//! and rendered through the same recorder.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Histogram buckets from 5ms up to the 60s default client timeout.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("proxy_request_duration_seconds".to_string()),
        DURATION_BUCKETS,
    )
}

/// Install the global Prometheus recorder and return a handle for rendering.
///
/// `proxy_request_duration_seconds` gets explicit buckets so it renders as a
/// histogram (`_bucket` lines) rather than the default summary.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a completed request with status code and HTTP method labels.
pub fn record_request(status: u16, method: &str, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!("proxy_requests_total", "status" => status_str.clone(), "method" => method.to_string())
        .increment(1);
    metrics::histogram!("proxy_request_duration_seconds", "status" => status_str)
        .record(duration_secs);
}

/// Record an upstream error with a classification label.
pub fn record_upstream_error(error_type: &str) {
    metrics::counter!("proxy_upstream_errors_total", "error_type" => error_type.to_string())
        .increment(1);
}

/// Middleware timing every request that reaches the router.
pub async fn track_requests(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    record_request(
        response.status().as_u16(),
        &method,
        started.elapsed().as_secs_f64(),
    );
    response
}

#[cfg(test)]
pub(crate) fn test_handle() -> PrometheusHandle {
    builder().unwrap().build_recorder().handle()
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_request(200, "GET", 0.05);
        record_upstream_error("timeout");
    }

    /// Isolated recorder/handle pair; `install_recorder()` can only succeed
    /// once per process.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = builder().unwrap().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_request_increments_counter_and_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request(200, "GET", 0.042);
        record_request(404, "PUT", 1.5);

        let output = handle.render();
        assert!(output.contains("proxy_requests_total"));
        assert!(output.contains("status=\"200\""));
        assert!(output.contains("method=\"GET\""));
        assert!(output.contains("status=\"404\""));
        assert!(output.contains("method=\"PUT\""));
        assert!(
            output.contains("proxy_request_duration_seconds_bucket"),
            "histogram must render _bucket lines"
        );
    }

    #[test]
    fn record_upstream_error_increments_counter_with_label() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_upstream_error("timeout");
        record_upstream_error("unauthorized");

        let output = handle.render();
        assert!(output.contains("proxy_upstream_errors_total"));
        assert!(output.contains("error_type=\"timeout\""));
        assert!(output.contains("error_type=\"unauthorized\""));
    }

    #[test]
    fn histogram_buckets_cover_timeout_range() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request(200, "GET", 0.003);

        let output = handle.render();
        assert!(output.contains("le=\"0.005\""), "5ms bucket must exist");
        assert!(output.contains("le=\"60\""), "60s bucket must exist");
        assert!(output.contains("le=\"+Inf\""));
    }
}
