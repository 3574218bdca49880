use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{from_fields, to_fields, BLOCK_TABLE};
use crate::db::{StoreResult, StoredEntity, VersionToken};

// ==================== BLOCK ====================
/// One numbered cell of a game grid.
///
/// Claim and confirmation are defined by the presence of their timestamps.
/// A confirmation without a claim is tolerated everywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    pub block_id: String,
    #[serde(default)]
    pub index: u32,
    pub title: String,
    #[serde(default)]
    pub claimant_name: Option<String>,
    #[serde(default)]
    pub claimant_user_id: Option<String>,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_winner: bool,
    #[serde(default)]
    pub version: Option<VersionToken>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlock {
    pub title: String,
    pub claimant_name: Option<String>,
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockRow {
    // the game the row was written for; rows predating it use their partition
    #[serde(default)]
    game_id: Option<String>,
    title: String,
    index: u32,
    claimant_name: Option<String>,
    claimant_user_id: Option<String>,
    claimed_at: Option<DateTime<Utc>>,
    confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    is_winner: bool,
}

impl Block {
    pub fn is_claimed(&self) -> bool {
        self.claimed_at.is_some()
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }

    /// Compares the fields a bulk edit is allowed to change.
    pub fn same_editable_fields(&self, other: &Block) -> bool {
        self.title == other.title
            && self.claimant_name == other.claimant_name
            && self.claimant_user_id == other.claimant_user_id
            && self.claimed_at == other.claimed_at
            && self.confirmed_at == other.confirmed_at
    }

    pub fn copy_editable_fields(&mut self, from: &Block) {
        self.title = from.title.clone();
        self.claimant_name = from.claimant_name.clone();
        self.claimant_user_id = from.claimant_user_id.clone();
        self.claimed_at = from.claimed_at;
        self.confirmed_at = from.confirmed_at;
    }

    pub fn to_entity(&self) -> StoreResult<StoredEntity> {
        let row = BlockRow {
            game_id: Some(self.game_id.clone()),
            title: self.title.clone(),
            index: self.index,
            claimant_name: self.claimant_name.clone(),
            claimant_user_id: self.claimant_user_id.clone(),
            claimed_at: self.claimed_at,
            confirmed_at: self.confirmed_at,
            is_winner: self.is_winner,
        };
        let mut entity =
            StoredEntity::new(BLOCK_TABLE, &self.game_id, &self.block_id, to_fields(&row)?);
        entity.version = self.version.clone();
        Ok(entity)
    }

    pub fn from_entity(entity: &StoredEntity) -> StoreResult<Self> {
        let row: BlockRow = from_fields(&entity.fields)?;
        Ok(Self {
            game_id: row
                .game_id
                .unwrap_or_else(|| entity.partition_key.clone()),
            block_id: entity.row_key.clone(),
            index: row.index,
            title: row.title,
            claimant_name: row.claimant_name,
            claimant_user_id: row.claimant_user_id,
            claimed_at: row.claimed_at,
            confirmed_at: row.confirmed_at,
            is_winner: row.is_winner,
            version: entity.version.clone(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::db::{EntityStore, MemoryStore};

    #[test]
    fn entity_mapping_keys_by_game_and_block() {
        let block = claimed_block("b-1", 3, true);
        let entity = block.to_entity().unwrap();

        assert_eq!(entity.table, "Block");
        assert_eq!(entity.partition_key, "game-1");
        assert_eq!(entity.row_key, "b-1");
        assert_eq!(entity.fields["index"], serde_json::json!(3));
        assert_eq!(entity.fields["gameId"], serde_json::json!("game-1"));
    }

    #[test]
    fn recorded_game_id_survives_a_mismatched_partition() {
        let mut entity = open_block("b-1", 1).to_entity().unwrap();
        entity.partition_key = "game-2".to_string();
        assert_eq!(Block::from_entity(&entity).unwrap().game_id, "game-1");

        entity.fields.remove("gameId");
        assert_eq!(Block::from_entity(&entity).unwrap().game_id, "game-2");
    }

    #[tokio::test]
    async fn insert_then_read_back_round_trips() {
        let store = MemoryStore::new();
        let mut block = claimed_block("b-1", 2, true);
        block.claimant_user_id = Some("user-9".to_string());
        block.version = None;

        let version = store.insert(&block.to_entity().unwrap()).await.unwrap();
        let stored = store.get("Block", "game-1", "b-1").await.unwrap().unwrap();
        let read = Block::from_entity(&stored).unwrap();

        assert_eq!(read.version, Some(version));
        assert_eq!(Block { version: None, ..read }, block);
    }

    #[test]
    fn confirmed_without_claim_is_representable() {
        let mut block = open_block("b-1", 1);
        block.confirmed_at = Some(ts(0));
        assert!(!block.is_claimed());
        assert!(block.is_confirmed());
        assert!(block.to_entity().is_ok());
    }

    #[test]
    fn editable_field_comparison_ignores_identity_and_winner() {
        let server = claimed_block("b-1", 1, false);
        let mut submitted = server.clone();
        submitted.index = 40;
        submitted.is_winner = true;
        submitted.version = None;
        assert!(server.same_editable_fields(&submitted));

        submitted.title = "changed".to_string();
        assert!(!server.same_editable_fields(&submitted));
    }
}
