use axum::{extract::State, http::StatusCode, routing::get, Json, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/live", get(live))
        .route("/ready", get(ready))
        .route("/status", get(status))
}

async fn live(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(state.health.liveness()).unwrap_or_default())
}

async fn ready(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let readiness = state.health.readiness().await;
    let code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(serde_json::to_value(readiness).unwrap_or_default()))
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let full_status = state.health.full_status().await;
    Json(serde_json::to_value(full_status).unwrap_or_default())
}
