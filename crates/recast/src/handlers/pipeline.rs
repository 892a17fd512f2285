//! Pipeline telemetry and scheduler control handlers.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::server::AppState;

#[derive(Serialize)]
pub struct PipelineStatsResponse {
    counts: BTreeMap<String, u64>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// GET /pipeline/stats
///
/// Item counts per status. The dead-letter counts (`sent_to_ai`,
/// `error_sending_to_ai`, `error_permanent`) are the ones operators
/// watch: nothing schedules those items back in.
pub async fn pipeline_stats(State(state): State<AppState>) -> Response {
    match state.store.status_counts().await {
        Ok(counts) => {
            let counts: BTreeMap<String, u64> = counts
                .into_iter()
                .map(|(status, count)| (status.as_str().to_string(), count))
                .collect();
            (StatusCode::OK, Json(PipelineStatsResponse { counts })).into_response()
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response(),
    }
}

/// POST /scheduler/settings-changed
///
/// Operator tooling calls this after editing sources or destinations
/// to cut the idle wait short. Routing is recomputed every cycle
/// either way.
pub async fn settings_changed(State(state): State<AppState>) -> (StatusCode, &'static str) {
    state.scheduler.notify_settings_changed();
    (StatusCode::OK, "ok")
}
