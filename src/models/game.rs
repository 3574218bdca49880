use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{from_fields, to_fields, Block, GAME_OWNER_TABLE, GAME_TABLE};
use crate::db::{StoreResult, StoredEntity, VersionToken};

// ==================== GAME ====================
/// Aggregate root. `blocks` is loaded from the game's own partition and is
/// never written as part of the game row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub owner_id: String,
    pub game_id: String,
    pub title: String,
    pub description: String,
    pub image: Option<String>,
    pub group_name: Option<String>,
    pub short_name: Option<String>,
    pub confirmed_winners_only: bool,
    pub display_as_grid: bool,
    pub version: Option<VersionToken>,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGame {
    pub game_id: Option<String>,
    pub title: String,
    pub description: String,
    pub image: Option<String>,
    pub group_name: Option<String>,
    pub short_name: Option<String>,
    pub confirmed_winners_only: Option<bool>,
    pub display_as_grid: Option<bool>,
}

/// A full client-side edit of a game, blocks included.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameUpdate {
    pub title: String,
    pub description: String,
    pub image: Option<String>,
    pub group_name: Option<String>,
    pub short_name: Option<String>,
    pub confirmed_winners_only: Option<bool>,
    #[serde(default = "default_true")]
    pub display_as_grid: bool,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameRow {
    title: String,
    description: String,
    image: Option<String>,
    group_name: Option<String>,
    short_name: Option<String>,
    #[serde(default = "default_true")]
    confirmed_winners_only: bool,
    #[serde(default = "default_true")]
    display_as_grid: bool,
}

// ==================== GAME OWNERSHIP ====================
/// Reservation of a game id across all owners. Blocks are partitioned by game
/// id alone, so an id stays with the owner who first created it, even after
/// the game row is deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct GameOwnership {
    pub game_id: String,
    pub owner_id: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnershipRow {
    owner_id: String,
}

impl GameOwnership {
    pub const ROW_KEY: &'static str = "owner";

    pub fn to_entity(&self) -> StoreResult<StoredEntity> {
        let row = OwnershipRow {
            owner_id: self.owner_id.clone(),
        };
        Ok(StoredEntity::new(
            GAME_OWNER_TABLE,
            &self.game_id,
            Self::ROW_KEY,
            to_fields(&row)?,
        ))
    }

    pub fn from_entity(entity: &StoredEntity) -> StoreResult<Self> {
        let row: OwnershipRow = from_fields(&entity.fields)?;
        Ok(Self {
            game_id: entity.partition_key.clone(),
            owner_id: row.owner_id,
        })
    }
}

/// Values derived from the block list; recomputed on every call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub block_count: usize,
    pub claimed_count: usize,
    pub percentage_claimed: u32,
    pub is_claimed: bool,
    pub is_completed: bool,
    pub is_won: bool,
    pub won_by_id: Option<String>,
    pub won_by_name: Option<String>,
    pub won_by_date: Option<DateTime<Utc>>,
}

impl GameSummary {
    pub fn from_blocks(blocks: &[Block]) -> Self {
        let block_count = blocks.len();
        let claimed_count = blocks.iter().filter(|b| b.is_claimed()).count();
        let is_claimed = block_count > 0 && claimed_count == block_count;
        let winner = blocks.iter().find(|b| b.is_winner);

        Self {
            block_count,
            claimed_count,
            percentage_claimed: percentage(claimed_count, block_count),
            is_claimed,
            is_completed: is_claimed && blocks.iter().all(Block::is_confirmed),
            is_won: winner.is_some(),
            won_by_id: winner.and_then(|b| b.claimant_user_id.clone()),
            won_by_name: winner.and_then(|b| b.claimant_name.clone()),
            won_by_date: winner.and_then(|b| b.claimed_at),
        }
    }
}

fn percentage(part: usize, total: usize) -> u32 {
    if part == 0 || total == 0 {
        return 0;
    }
    // round to one decimal place, then drop the fraction
    let tenths = (part as f64 / total as f64 * 1000.0).round() / 10.0;
    (tenths as u32).min(100)
}

/// Smallest positive index not used by any block.
pub fn allocate_index(blocks: &[Block]) -> u32 {
    let used: HashSet<u32> = blocks.iter().map(|b| b.index).collect();
    let mut candidate = 1;
    while used.contains(&candidate) {
        candidate += 1;
    }
    candidate
}

impl Game {
    pub fn new(owner_id: &str, game_id: String, new_game: NewGame, defaults: (bool, bool)) -> Self {
        let (confirmed_winners_only, display_as_grid) = defaults;
        Self {
            owner_id: owner_id.to_string(),
            game_id,
            title: new_game.title,
            description: new_game.description,
            image: new_game.image,
            group_name: new_game.group_name,
            short_name: new_game.short_name,
            confirmed_winners_only: new_game
                .confirmed_winners_only
                .unwrap_or(confirmed_winners_only),
            display_as_grid: new_game.display_as_grid.unwrap_or(display_as_grid),
            version: None,
            blocks: Vec::new(),
        }
    }

    /// Replaces the block list, ordered by index.
    pub fn set_blocks(&mut self, mut blocks: Vec<Block>) {
        blocks.sort_by_key(|b| b.index);
        self.blocks = blocks;
    }

    pub fn summary(&self) -> GameSummary {
        GameSummary::from_blocks(&self.blocks)
    }

    pub fn next_available_index(&self) -> u32 {
        allocate_index(&self.blocks)
    }

    pub fn winner(&self) -> Option<&Block> {
        self.blocks.iter().find(|b| b.is_winner)
    }

    pub fn block(&self, block_id: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.block_id == block_id)
    }

    pub fn to_entity(&self) -> StoreResult<StoredEntity> {
        let row = GameRow {
            title: self.title.clone(),
            description: self.description.clone(),
            image: self.image.clone(),
            group_name: self.group_name.clone(),
            short_name: self.short_name.clone(),
            confirmed_winners_only: self.confirmed_winners_only,
            display_as_grid: self.display_as_grid,
        };
        let mut entity =
            StoredEntity::new(GAME_TABLE, &self.owner_id, &self.game_id, to_fields(&row)?);
        entity.version = self.version.clone();
        Ok(entity)
    }

    pub fn from_entity(entity: &StoredEntity) -> StoreResult<Self> {
        let row: GameRow = from_fields(&entity.fields)?;
        Ok(Self {
            owner_id: entity.partition_key.clone(),
            game_id: entity.row_key.clone(),
            title: row.title,
            description: row.description,
            image: row.image,
            group_name: row.group_name,
            short_name: row.short_name,
            confirmed_winners_only: row.confirmed_winners_only,
            display_as_grid: row.display_as_grid,
            version: entity.version.clone(),
            blocks: Vec::new(),
        })
    }
}
