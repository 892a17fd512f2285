//! Fingerprint-cache admin handlers.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::server::AppState;

#[derive(Serialize)]
pub struct CacheActionResponse {
    status: &'static str,
    message: String,
}

/// POST /cache/clear
pub async fn cache_clear(State(state): State<AppState>) -> Json<CacheActionResponse> {
    let cleared = state.cache.clear();
    Json(CacheActionResponse {
        status: "success",
        message: format!("{} cleared", cleared),
    })
}

#[derive(Serialize)]
pub struct CacheStatsResponse {
    cache_size: usize,
    recent_hashes: Vec<String>,
    last_auto_clear: String,
    hours_since_clear: f64,
    hours_until_next_clear: f64,
    next_auto_clear: String,
}

/// GET /cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    let stats = state.cache.stats();
    Json(CacheStatsResponse {
        cache_size: stats.size,
        recent_hashes: stats.recent,
        last_auto_clear: stats.last_cleared.to_rfc3339(),
        hours_since_clear: stats.hours_since_clear,
        hours_until_next_clear: stats.hours_until_clear,
        next_auto_clear: stats.next_clear.to_rfc3339(),
    })
}

/// POST /cache/force_auto_clear
///
/// Rewinds the last-clear timestamp by 25 hours and re-runs the TTL
/// check, so the auto-clear path can be exercised without waiting out
/// the TTL.
pub async fn cache_force_auto_clear(
    State(state): State<AppState>,
) -> Json<CacheActionResponse> {
    if state.cache.force_auto_clear() {
        Json(CacheActionResponse {
            status: "success",
            message: "auto clear triggered".to_string(),
        })
    } else {
        Json(CacheActionResponse {
            status: "error",
            message: "auto clear did not trigger".to_string(),
        })
    }
}
