// src/api/mod.rs
pub mod blocks;
pub mod games;
pub mod health;
pub mod lookups;

use axum::http::HeaderMap;
use serde::Serialize;

use crate::config::Config;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Game, GameSummary};

// Identity headers set by the authenticating proxy in front of the service
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    pub user_id: String,
    pub name: Option<String>,
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn optional_user(headers: &HeaderMap) -> Option<Caller> {
    let user_id = header_value(headers, USER_ID_HEADER)?;
    Some(Caller {
        user_id: user_id.to_ascii_lowercase(),
        name: header_value(headers, USER_NAME_HEADER),
    })
}

pub fn require_user(headers: &HeaderMap) -> Result<Caller> {
    optional_user(headers)
        .ok_or_else(|| AppError::Unauthorized("Missing X-User-Id header".to_string()))
}

/// A game as returned to clients, with its derived values alongside.
#[derive(Debug, Serialize)]
pub struct GameView {
    #[serde(flatten)]
    pub game: Game,
    #[serde(flatten)]
    pub summary: GameSummary,
}

impl From<Game> for GameView {
    fn from(game: Game) -> Self {
        let summary = game.summary();
        Self { game, summary }
    }
}
