use axum::{routing::get, Router};

/// Router exposing Prometheus metrics at `/metrics`
pub fn create_router() -> Router {
    Router::new().route("/metrics", get(|| async { meter_metrics::gather_metrics() }))
}
