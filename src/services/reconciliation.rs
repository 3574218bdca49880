//! Bulk reconciliation of a client-edited block list against stored blocks.
//!
//! `reconcile` is a pure diff over two snapshots. `apply_plan` persists a
//! conflict-free plan in the order deletes, updates, inserts, game row, using
//! the server's version tokens so a concurrent writer surfaces as a
//! `VersionMismatch` instead of being overwritten.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::claim_engine::{is_store_block_id, new_block_id};
use crate::{
    db::{EntityStore, VersionToken},
    error::{AppError, Result},
    models::{Block, Game, BLOCK_TABLE, GAME_TABLE},
};

/// A matched block whose submitted token no longer matches the stored row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockConflict {
    pub block_id: String,
    pub submitted_version: Option<VersionToken>,
    pub current_version: Option<VersionToken>,
}

#[derive(Debug, Default, Clone)]
pub struct ReconcilePlan {
    pub to_delete: Vec<Block>,
    pub to_update: Vec<Block>,
    pub to_insert: Vec<Block>,
    pub conflicts: Vec<BlockConflict>,
    pub unchanged: usize,
}

impl ReconcilePlan {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn is_noop(&self) -> bool {
        self.to_delete.is_empty() && self.to_update.is_empty() && self.to_insert.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub deleted: usize,
    pub updated: usize,
    pub inserted: usize,
}

/// Every stored block must live in the game's own partition.
pub fn ensure_partition(game_id: &str, server_blocks: &[Block]) -> Result<()> {
    if let Some(foreign) = server_blocks.iter().find(|b| b.game_id != game_id) {
        tracing::warn!(
            "Foreign block {} (partition {}) returned for game {}",
            foreign.block_id,
            foreign.game_id,
            game_id
        );
        return Err(AppError::Forbidden(format!(
            "Block {} does not belong to game {}",
            foreign.block_id, game_id
        )));
    }
    Ok(())
}

pub fn reconcile(game_id: &str, server_blocks: &[Block], submitted: &[Block]) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();

    let server_ids: HashSet<&str> = server_blocks.iter().map(|b| b.block_id.as_str()).collect();
    let mut submitted_by_id: HashMap<&str, &Block> = HashMap::new();
    for block in submitted {
        if !server_ids.contains(block.block_id.as_str()) {
            continue;
        }
        if submitted_by_id.contains_key(block.block_id.as_str()) {
            tracing::warn!(
                "Duplicate block {} in submission for game {}; keeping the first",
                block.block_id,
                game_id
            );
            continue;
        }
        submitted_by_id.insert(block.block_id.as_str(), block);
    }

    let mut used_indices: HashSet<u32> = HashSet::new();

    for server in server_blocks {
        let Some(proposed) = submitted_by_id.get(server.block_id.as_str()) else {
            plan.to_delete.push(server.clone());
            continue;
        };
        used_indices.insert(server.index);

        if let Some(token) = &proposed.version {
            if server.version.as_ref() != Some(token) {
                plan.conflicts.push(BlockConflict {
                    block_id: server.block_id.clone(),
                    submitted_version: Some(token.clone()),
                    current_version: server.version.clone(),
                });
                continue;
            }
        }

        if server.same_editable_fields(proposed) {
            plan.unchanged += 1;
            continue;
        }

        let mut updated = server.clone();
        updated.copy_editable_fields(proposed);
        plan.to_update.push(updated);
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for proposed in submitted {
        let id = proposed.block_id.as_str();
        if server_ids.contains(id) {
            continue;
        }
        // placeholders may repeat; real ids are inserted once
        let placeholder = !is_store_block_id(id);
        if !placeholder && !seen.insert(id) {
            continue;
        }

        let mut block = proposed.clone();
        block.game_id = game_id.to_string();
        if placeholder {
            block.block_id = new_block_id();
        }
        if block.index == 0 || used_indices.contains(&block.index) {
            block.index = next_free(&used_indices);
        }
        used_indices.insert(block.index);
        block.is_winner = false;
        block.version = None;
        plan.to_insert.push(block);
    }

    if plan.has_conflicts() {
        tracing::warn!(
            "Reconciliation for game {} found {} conflicting block(s)",
            game_id,
            plan.conflicts.len()
        );
    } else {
        tracing::debug!(
            "Reconciliation for game {}: delete={}, update={}, insert={}, unchanged={}",
            game_id,
            plan.to_delete.len(),
            plan.to_update.len(),
            plan.to_insert.len(),
            plan.unchanged
        );
    }

    plan
}

fn next_free(used: &HashSet<u32>) -> u32 {
    let mut candidate = 1;
    while used.contains(&candidate) {
        candidate += 1;
    }
    candidate
}

/// Re-reads every row the plan will update and fails with `VersionMismatch`
/// if any moved since the snapshot was taken.
///
/// The store has no multi-row transaction, so a writer landing between this
/// check and the writes can still leave earlier deletes committed.
pub async fn verify_versions(
    store: &dyn EntityStore,
    game: &Game,
    plan: &ReconcilePlan,
) -> Result<()> {
    for block in &plan.to_update {
        let current = store
            .get(BLOCK_TABLE, &block.game_id, &block.block_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Block {} not found", block.block_id)))?;
        if current.version != block.version {
            tracing::warn!(
                "Block {} of game {} changed since it was read",
                block.block_id,
                game.game_id
            );
            return Err(AppError::VersionMismatch(format!(
                "Block {} was modified by another writer",
                block.block_id
            )));
        }
    }

    if let Some(expected) = &game.version {
        let current = store
            .get(GAME_TABLE, &game.owner_id, &game.game_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Game {} not found", game.game_id)))?;
        if current.version.as_ref() != Some(expected) {
            return Err(AppError::VersionMismatch(format!(
                "Game {} was modified by another writer",
                game.game_id
            )));
        }
    }

    Ok(())
}

/// Persists a plan. Refuses to write anything when the plan carries conflicts
/// or when a row it updates has moved on.
pub async fn apply_plan(
    store: &dyn EntityStore,
    game: &Game,
    plan: ReconcilePlan,
) -> Result<ApplyReport> {
    if plan.has_conflicts() {
        return Err(AppError::BlockConflicts(plan.conflicts));
    }
    verify_versions(store, game, &plan).await?;

    let mut report = ApplyReport::default();

    for block in &plan.to_delete {
        store
            .delete(BLOCK_TABLE, &block.game_id, &block.block_id)
            .await?;
        report.deleted += 1;
    }

    for block in &plan.to_update {
        let expected = block.version.as_ref().ok_or_else(|| {
            AppError::Internal(format!("Block {} loaded without a version", block.block_id))
        })?;
        store.update(&block.to_entity()?, expected).await?;
        report.updated += 1;
    }

    for block in &plan.to_insert {
        store.insert(&block.to_entity()?).await?;
        report.inserted += 1;
    }

    let game_entity = game.to_entity()?;
    match &game.version {
        Some(expected) => {
            store.update(&game_entity, expected).await?;
        }
        None => {
            store.insert(&game_entity).await?;
        }
    }

    tracing::info!(
        "Game {} reconciled: deleted={}, updated={}, inserted={}",
        game.game_id,
        report.deleted,
        report.updated,
        report.inserted
    );

    Ok(report)
}
