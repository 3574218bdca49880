use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    models::{ApiResponse, Block, GameUpdate, NewGame},
    services::{reconciliation::ApplyReport, GameService, ThreadRandom},
};

use super::{require_user, AppState, GameView};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawQuery {
    pub confirmed_winners_only: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct UpdateGameResponse {
    pub game: GameView,
    pub changes: ApplyReport,
}

/// GET /api/v1/games
pub async fn list_games(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<GameView>>>> {
    let caller = require_user(&headers)?;
    let service = GameService::new(state.db, state.config);
    let games = service.list_games(&caller.user_id).await?;
    Ok(Json(ApiResponse::success(
        games.into_iter().map(GameView::from).collect(),
    )))
}

/// PUT /api/v1/games
pub async fn create_game(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NewGame>,
) -> Result<(StatusCode, Json<ApiResponse<GameView>>)> {
    let caller = require_user(&headers)?;
    let service = GameService::new(state.db, state.config);
    let game = service.create_game(&caller.user_id, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(GameView::from(game))),
    ))
}

/// GET /api/v1/games/{game_id}
pub async fn get_game(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(game_id): Path<String>,
) -> Result<Json<ApiResponse<GameView>>> {
    let caller = require_user(&headers)?;
    let service = GameService::new(state.db, state.config);
    let game = service.load_game(&caller.user_id, &game_id).await?;
    Ok(Json(ApiResponse::success(GameView::from(game))))
}

/// POST /api/v1/games/{game_id}
pub async fn update_game(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(game_id): Path<String>,
    Json(req): Json<GameUpdate>,
) -> Result<Json<ApiResponse<UpdateGameResponse>>> {
    let caller = require_user(&headers)?;
    let service = GameService::new(state.db, state.config);
    let (game, changes) = service.update_game(&caller.user_id, &game_id, req).await?;
    Ok(Json(ApiResponse::success(UpdateGameResponse {
        game: GameView::from(game),
        changes,
    })))
}

/// DELETE /api/v1/games/{game_id}
pub async fn delete_game(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(game_id): Path<String>,
) -> Result<StatusCode> {
    let caller = require_user(&headers)?;
    let service = GameService::new(state.db, state.config);
    service.delete_game(&caller.user_id, &game_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/games/{game_id}/winner
pub async fn draw_winner(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(game_id): Path<String>,
    Query(query): Query<DrawQuery>,
) -> Result<Json<ApiResponse<Block>>> {
    let caller = require_user(&headers)?;
    let service = GameService::new(state.db, state.config);
    let winner = service
        .draw_winner(
            &caller.user_id,
            &game_id,
            query.confirmed_winners_only,
            &mut ThreadRandom,
        )
        .await?;
    Ok(Json(ApiResponse::success(winner)))
}
