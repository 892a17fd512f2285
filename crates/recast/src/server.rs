//! Admin HTTP surface.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::timeout::TimeoutLayer;

use crate::dedup::DedupCache;
use crate::handlers;
use crate::scheduler::SchedulerHandle;
use crate::store::ContentStore;

/// Shared admin-API state.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<DedupCache>,
    pub store: Arc<dyn ContentStore>,
    pub scheduler: SchedulerHandle,
}

pub fn build_app(state: AppState, request_timeout_secs: u64) -> Router {
    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route("/version", get(handlers::version))
        .route("/cache/stats", get(handlers::cache_stats))
        .route("/cache/clear", post(handlers::cache_clear))
        .route("/cache/force_auto_clear", post(handlers::cache_force_auto_clear))
        .route("/pipeline/stats", get(handlers::pipeline_stats))
        .route("/scheduler/settings-changed", post(handlers::settings_changed))
        .with_state(state)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_secs),
        ))
}
