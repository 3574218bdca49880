// src/models/mod.rs
pub mod block;
pub mod game;
pub mod lookup;

pub use block::{Block, NewBlock};
pub use game::{Game, GameOwnership, GameSummary, GameUpdate, NewGame};
pub use lookup::LookupEntry;

use serde::{de::DeserializeOwned, Serialize};

use crate::db::{Fields, StoreError, StoreResult};

// Table names used as the logical table of each row kind
pub const GAME_TABLE: &str = "Game";
pub const BLOCK_TABLE: &str = "Block";
pub const LOOKUP_TABLE: &str = "Lookup";
pub const GAME_OWNER_TABLE: &str = "GameOwner";

// ==================== API RESPONSE ====================
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

// ==================== ROW FIELD BAGS ====================
pub(crate) fn to_fields<T: Serialize>(row: &T) -> StoreResult<Fields> {
    match serde_json::to_value(row)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(StoreError::Corrupt(format!(
            "row serialized to non-object value: {}",
            other
        ))),
    }
}

pub(crate) fn from_fields<T: DeserializeOwned>(fields: &Fields) -> StoreResult<T> {
    Ok(serde_json::from_value(serde_json::Value::Object(
        fields.clone(),
    ))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_response_success_sets_flag() {
        let response = ApiResponse::success("ok");
        assert!(response.success);
        assert_eq!(response.data, "ok");
    }

    #[test]
    fn to_fields_rejects_scalars() {
        let err = to_fields(&42).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
