//! Metrics tracking middleware
//!
//! Tracks request latency and counts per normalized endpoint in a
//! Prometheus registry owned by [`AppState`].
//!
//! Author: hephaex@gmail.com

use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Instant;

/// Request metrics for the API
pub struct ApiMetrics {
    registry: Registry,
    requests: IntCounterVec,
    latency: HistogramVec,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("lovenote".to_string()), None)?;

        let requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "endpoint", "status"],
        )?;
        let latency = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request latency in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["method", "endpoint"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(latency.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry,
            requests,
            latency,
        })
    }

    pub fn observe(&self, method: &str, endpoint: &str, status: u16, seconds: f64) {
        self.requests
            .with_label_values(&[method, endpoint, &status.to_string()])
            .inc();
        self.latency
            .with_label_values(&[method, endpoint])
            .observe(seconds);
    }

    /// Prometheus text exposition of everything registered
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Metrics tracking middleware
pub async fn metrics_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let endpoint = normalize_endpoint(request.uri().path());

    let response = next.run(request).await;

    state.metrics.observe(
        &method,
        &endpoint,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

/// Replace numeric id segments with `:id` so label cardinality stays bounded
pub fn normalize_endpoint(path: &str) -> String {
    path.split('/')
        .map(|seg| if is_numeric(seg) { ":id" } else { seg })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(
            normalize_endpoint("/api/relationships/12/notes/7"),
            "/api/relationships/:id/notes/:id"
        );
        assert_eq!(normalize_endpoint("/api/users/me"), "/api/users/me");
        assert_eq!(normalize_endpoint("/health"), "/health");
    }

    #[test]
    fn test_is_numeric() {
        assert!(is_numeric("123"));
        assert!(!is_numeric("12a"));
        assert!(!is_numeric(""));
    }

    #[test]
    fn test_observe_then_render() {
        let metrics = ApiMetrics::new().unwrap();
        metrics.observe("GET", "/api/invites", 200, 0.003);

        let text = metrics.render().unwrap();
        assert!(text.contains("lovenote_http_requests_total"));
        assert!(text.contains("endpoint=\"/api/invites\""));
        assert!(text.contains("lovenote_http_request_duration_seconds_bucket"));
    }
}
