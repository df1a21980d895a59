//! Health, status and metrics endpoints.
//!
//! - `/health` - liveness probe
//! - `/status` - version, uptime, webhook counters and request latency
//! - `/metrics` - Prometheus text format
//!
//! # Example Response
//!
//! ```json
//! {
//!   "name": "billing-sync",
//!   "version": "0.1.0",
//!   "status": "running",
//!   "uptime_seconds": 3600,
//!   "webhooks": {
//!     "events_total": 120,
//!     "applied_total": 112,
//!     "skipped_total": 3,
//!     "unhandled_total": 4,
//!     "failed_total": 1,
//!     "premium_sync_failures_total": 0,
//!     "failures_by_reason": {"profile_not_found": 1}
//!   },
//!   "requests": {"count": 131, "server_errors": 1, "p50_ms": 41.2, "p99_ms": 410.0, ...},
//!   "generated_at": "2026-01-01T12:00:00Z"
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::metrics::{global_metrics, MetricsSnapshot};

/// Slowest request the histogram can hold, in microseconds
const MAX_TRACKED_LATENCY_US: u64 = 60_000_000;

/// `/health` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// `/status` body
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_seconds: u64,
    /// Webhook pipeline counters
    pub webhooks: MetricsSnapshot,
    /// Latency and error counts of every HTTP request served
    pub requests: RequestSummary,
    pub generated_at: DateTime<Utc>,
}

/// Request latency distribution, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestSummary {
    pub count: u64,
    /// Responses with a 5xx status
    pub server_errors: u64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

/// Request statistics shared by the latency middleware and `/status`.
///
/// Latencies go into an hdrhistogram (1us to 60s, 3 significant figures);
/// slower requests are clamped to the upper bound.
#[derive(Debug)]
pub struct StatusState {
    started: Instant,
    latencies: Mutex<Option<Histogram<u64>>>,
    server_errors: AtomicU64,
}

impl StatusState {
    pub fn new() -> Self {
        let latencies = match Histogram::new_with_bounds(1, MAX_TRACKED_LATENCY_US, 3) {
            Ok(histogram) => Some(histogram),
            Err(e) => {
                warn!(error = %e, "Latency histogram unavailable");
                None
            }
        };

        Self {
            started: Instant::now(),
            latencies: Mutex::new(latencies),
            server_errors: AtomicU64::new(0),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Record one served request
    pub fn observe(&self, latency: Duration, status: StatusCode) {
        if status.is_server_error() {
            self.server_errors.fetch_add(1, Ordering::Relaxed);
        }

        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        if let Some(histogram) = self.latencies.lock().as_mut() {
            histogram.saturating_record(micros.clamp(1, MAX_TRACKED_LATENCY_US));
        }
    }

    pub fn summary(&self) -> RequestSummary {
        let server_errors = self.server_errors.load(Ordering::Relaxed);
        let guard = self.latencies.lock();
        let Some(histogram) = guard.as_ref() else {
            return RequestSummary {
                server_errors,
                ..RequestSummary::default()
            };
        };

        let ms = |us: u64| us as f64 / 1000.0;
        RequestSummary {
            count: histogram.len(),
            server_errors,
            mean_ms: histogram.mean() / 1000.0,
            p50_ms: ms(histogram.value_at_quantile(0.50)),
            p95_ms: ms(histogram.value_at_quantile(0.95)),
            p99_ms: ms(histogram.value_at_quantile(0.99)),
            max_ms: ms(histogram.max()),
        }
    }
}

impl Default for StatusState {
    fn default() -> Self {
        Self::new()
    }
}

/// `GET /health`
#[instrument(skip_all)]
pub async fn health_handler() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse { status: "healthy" })
}

/// `GET /status`
#[instrument(skip_all)]
pub async fn status_handler(State(state): State<Arc<StatusState>>) -> Json<StatusResponse> {
    debug!("Status check requested");
    Json(StatusResponse {
        name: crate::NAME,
        version: crate::VERSION,
        status: "running",
        uptime_seconds: state.uptime().as_secs(),
        webhooks: global_metrics().snapshot(),
        requests: state.summary(),
        generated_at: Utc::now(),
    })
}

/// `GET /metrics`, Prometheus text exposition format
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        global_metrics().to_prometheus_format(),
    )
}

/// Middleware timing every request and counting server errors
pub async fn track_latency(
    State(state): State<Arc<StatusState>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;
    state.observe(started.elapsed(), response.status());
    response
}

/// Routes: `GET /health`, `GET /status`, `GET /metrics`
pub fn status_router(state: Arc<StatusState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_summary() {
        let summary = StatusState::new().summary();
        assert_eq!(summary.count, 0);
        assert_eq!(summary.server_errors, 0);
    }

    #[test]
    fn test_summary_percentiles() {
        let state = StatusState::new();
        for ms in [1, 2, 5, 10, 50] {
            state.observe(Duration::from_millis(ms), StatusCode::OK);
        }

        let summary = state.summary();
        assert_eq!(summary.count, 5);
        assert!(summary.p50_ms > 0.0);
        assert!(summary.p95_ms >= summary.p50_ms);
        assert!(summary.p99_ms >= summary.p95_ms);
        // 3 significant figures
        assert!((50.0..=51.0).contains(&summary.max_ms), "max {}", summary.max_ms);
    }

    #[test]
    fn test_server_errors_counted() {
        let state = StatusState::new();
        state.observe(Duration::from_millis(3), StatusCode::OK);
        state.observe(Duration::from_millis(3), StatusCode::BAD_REQUEST);
        state.observe(Duration::from_millis(3), StatusCode::INTERNAL_SERVER_ERROR);

        let summary = state.summary();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.server_errors, 1);
    }

    #[test]
    fn test_out_of_range_latency_clamped() {
        let state = StatusState::new();
        state.observe(Duration::ZERO, StatusCode::OK);
        state.observe(Duration::from_secs(600), StatusCode::OK);

        let summary = state.summary();
        assert_eq!(summary.count, 2);
        assert!(summary.max_ms >= 59_000.0);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let Json(body) = health_handler().await;
        assert_eq!(body, HealthResponse { status: "healthy" });
    }

    #[tokio::test]
    async fn test_status_handler() {
        let state = Arc::new(StatusState::new());
        state.observe(Duration::from_millis(5), StatusCode::OK);

        let Json(body) = status_handler(State(state)).await;
        assert_eq!(body.name, "billing-sync");
        assert_eq!(body.status, "running");
        assert_eq!(body.requests.count, 1);
    }

    #[tokio::test]
    async fn test_metrics_handler_content_type() {
        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }

    #[test]
    fn test_concurrent_observations() {
        let state = Arc::new(StatusState::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        state.observe(Duration::from_micros(800), StatusCode::OK);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(state.summary().count, 4_000);
    }
}
