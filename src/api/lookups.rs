use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;

use crate::{
    error::Result,
    models::ApiResponse,
    services::GameService,
};

use super::{require_user, AppState, GameView};

#[derive(Debug, Serialize)]
pub struct NameAvailability {
    pub group: String,
    pub name: String,
    pub available: bool,
}

/// GET /api/v1/lookup/{group}/{name}
pub async fn get_game_by_name(
    State(state): State<AppState>,
    Path((group, name)): Path<(String, String)>,
) -> Result<Json<ApiResponse<GameView>>> {
    let service = GameService::new(state.db, state.config);
    let game = service.get_game_by_name(&group, &name).await?;
    Ok(Json(ApiResponse::success(GameView::from(game))))
}

/// GET /api/v1/lookup/{group}/{name}/available
pub async fn check_name(
    State(state): State<AppState>,
    Path((group, name)): Path<(String, String)>,
) -> Result<Json<ApiResponse<NameAvailability>>> {
    let service = GameService::new(state.db, state.config);
    let available = service.check_name(&group, &name).await?;
    Ok(Json(ApiResponse::success(NameAvailability {
        group,
        name,
        available,
    })))
}

/// PUT /api/v1/games/{game_id}/lookup/{group}/{name}
pub async fn add_name(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((game_id, group, name)): Path<(String, String, String)>,
) -> Result<StatusCode> {
    let caller = require_user(&headers)?;
    let service = GameService::new(state.db, state.config);
    service
        .add_name(&caller.user_id, &game_id, &group, &name)
        .await?;
    Ok(StatusCode::CREATED)
}
