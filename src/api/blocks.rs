use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;

use crate::{
    error::{AppError, Result},
    models::{ApiResponse, Block, NewBlock},
    services::GameService,
};

use super::{optional_user, require_user, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimBlockRequest {
    pub claimed_by: Option<String>,
}

// Explicit name wins, then the signed-in user's display name.
fn claimant_name(req: &ClaimBlockRequest, caller_name: Option<&str>) -> Result<String> {
    req.claimed_by
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .or(caller_name)
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest("claimedBy is required".to_string()))
}

/// PUT /api/v1/games/{game_id}/blocks
pub async fn add_block(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(game_id): Path<String>,
    Json(req): Json<NewBlock>,
) -> Result<(StatusCode, Json<ApiResponse<Block>>)> {
    let caller = require_user(&headers)?;
    let service = GameService::new(state.db, state.config);
    let block = service.add_block(&caller.user_id, &game_id, req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(block))))
}

/// DELETE /api/v1/games/{game_id}/blocks/{block_id}
pub async fn delete_block(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((game_id, block_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    let caller = require_user(&headers)?;
    let service = GameService::new(state.db, state.config);
    service
        .delete_block(&caller.user_id, &game_id, &block_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/games/{game_id}/blocks/{block_id}/claim
///
/// Anonymous participants may claim; a signed-in caller's id is recorded.
pub async fn claim_block(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((game_id, block_id)): Path<(String, String)>,
    Json(req): Json<ClaimBlockRequest>,
) -> Result<Json<ApiResponse<Block>>> {
    let caller = optional_user(&headers);
    let name = claimant_name(&req, caller.as_ref().and_then(|c| c.name.as_deref()))?;

    let service = GameService::new(state.db, state.config);
    let block = service
        .claim_block(
            &game_id,
            &block_id,
            &name,
            caller.as_ref().map(|c| c.user_id.as_str()),
        )
        .await?;
    Ok(Json(ApiResponse::success(block)))
}

/// DELETE /api/v1/games/{game_id}/blocks/{block_id}/claim
pub async fn unclaim_block(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((game_id, block_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Block>>> {
    let caller = require_user(&headers)?;
    let service = GameService::new(state.db, state.config);
    let block = service
        .unclaim_block(&caller.user_id, &game_id, &block_id)
        .await?;
    Ok(Json(ApiResponse::success(block)))
}

/// POST /api/v1/games/{game_id}/blocks/{block_id}/confirm
pub async fn confirm_block(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((game_id, block_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Block>>> {
    let caller = require_user(&headers)?;
    let service = GameService::new(state.db, state.config);
    let block = service
        .confirm_block(&caller.user_id, &game_id, &block_id)
        .await?;
    Ok(Json(ApiResponse::success(block)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claimant_name_prefers_explicit_value() {
        let req = ClaimBlockRequest {
            claimed_by: Some(" Ana ".to_string()),
        };
        assert_eq!(claimant_name(&req, Some("Signed In")).unwrap(), "Ana");
    }

    #[test]
    fn claimant_name_falls_back_to_caller() {
        let req = ClaimBlockRequest { claimed_by: None };
        assert_eq!(claimant_name(&req, Some("Signed In")).unwrap(), "Signed In");

        let err = claimant_name(&req, None).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
