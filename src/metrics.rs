//! Prometheus metrics.
//!
//! Metrics are recorded through the `metrics` facade. When no recorder is
//! installed the macros are no-ops, so instrumented code runs unchanged with
//! `enable_metrics = false`.

use crate::error::Result;
use crate::http::HttpServer;
use axum::{
    body::Body, extract::MatchedPath, http::Request, middleware::Next, response::IntoResponse,
    routing::get, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Component name of the scrape endpoint
pub const METRICS_SERVER_NAME: &str = "metrics-server";

const HTTP_SECONDS_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

const RPC_MILLISECONDS_BUCKETS: &[f64] = &[5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0];

/// Build the Prometheus recorder without installing it
pub fn build_metrics_recorder() -> Result<metrics_exporter_prometheus::PrometheusRecorder> {
    let recorder = PrometheusBuilder::new()
        .set_buckets(HTTP_SECONDS_BUCKETS)?
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("_duration_ms".to_string()),
            RPC_MILLISECONDS_BUCKETS,
        )?
        .build_recorder();
    Ok(recorder)
}

/// Install the process-wide Prometheus recorder. Call at most once.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    let recorder = build_metrics_recorder()?;
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(|e| {
        crate::error::AppError::system(format!("failed to install metrics recorder: {}", e))
    })?;
    Ok(handle)
}

/// Router exposing `/metrics` in the Prometheus text format
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || std::future::ready(handle.render())),
    )
}

/// HTTP server component serving the scrape endpoint on `addr`
pub fn metrics_server(addr: &str, handle: PrometheusHandle) -> Result<HttpServer> {
    HttpServer::bind(METRICS_SERVER_NAME, addr, metrics_router(handle))
}

/// Middleware to record common HTTP metrics
pub async fn track_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();

    let path = if let Some(matched_path) = req.extensions().get::<MatchedPath>() {
        matched_path.as_str().to_owned()
    } else {
        req.uri().path().to_owned()
    };

    let method = req.method().clone();

    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let labels = [
        ("method", method.to_string()),
        ("path", path),
        ("status", status),
    ];

    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels).record(latency);

    response
}
