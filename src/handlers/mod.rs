//! HTTP handlers outside the webhook itself

pub mod status;

pub use status::{
    health_handler, metrics_handler, status_handler, status_router, track_latency,
    HealthResponse, RequestSummary, StatusResponse, StatusState,
};
