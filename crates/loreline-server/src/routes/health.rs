use axum::{extract::State, routing::get, Json, Router};
use loreline_schema::HealthStatus;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(check))
}

/// Always 200: degraded components are reported in the body, not the status.
async fn check(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.probe.check().await)
}
