use axum::{extract::State, Json};
use serde::Serialize;
use super::AppState;
use crate::{
    constants::{API_VERSION, HEALTH_PROBE_PARTITION},
    models::GAME_TABLE,
};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub api_version: &'static str,
    pub store: String,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    // a cheap partition read proves the store answers
    let store_status = match state.db.store().get_all(GAME_TABLE, HEALTH_PROBE_PARTITION).await {
        Ok(_) => "connected".to_string(),
        Err(e) => {
            tracing::warn!("Health check store read failed: {}", e);
            "disconnected".to_string()
        }
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        api_version: API_VERSION,
        store: store_status,
    })
}
