//! Claim lifecycle of a single block: open, claimed, confirmed.
//!
//! These functions mutate an in-memory block only; persisting the result with
//! a version-guarded write is the caller's job.

use chrono::{DateTime, Utc};

use crate::{
    db::new_row_id,
    error::{AppError, Result},
    models::{Block, Game},
};

/// Fresh row identity for a block. Independent of the block's index.
pub fn new_block_id() -> String {
    new_row_id()
}

/// Row ids minted by [`new_block_id`]; anything else is a client placeholder.
pub fn is_store_block_id(id: &str) -> bool {
    id.len() == 32 && id.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

pub fn claim(
    block: &mut Block,
    claimant_name: &str,
    claimant_user_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    if block.is_claimed() {
        return Err(AppError::Conflict(format!(
            "Block {} is already claimed",
            block.index
        )));
    }

    block.claimant_name = Some(claimant_name.to_string());
    block.claimant_user_id = claimant_user_id.map(str::to_string);
    block.claimed_at = Some(now);
    Ok(())
}

/// Clears every claim field. Unclaiming an open block changes nothing.
pub fn unclaim(block: &mut Block) {
    block.claimant_name = None;
    block.claimant_user_id = None;
    block.claimed_at = None;
    block.confirmed_at = None;
}

/// Toggles confirmation of a claimed block.
pub fn confirm(block: &mut Block, now: DateTime<Utc>) -> Result<()> {
    if !block.is_claimed() {
        return Err(AppError::BadRequest(format!(
            "Block {} must be claimed before it can be confirmed",
            block.index
        )));
    }

    block.confirmed_at = match block.confirmed_at {
        Some(_) => None,
        None => Some(now),
    };
    Ok(())
}

pub fn create_block(
    game: &Game,
    title: &str,
    claimant_name: Option<&str>,
    confirmed: bool,
    now: DateTime<Utc>,
) -> Block {
    Block {
        game_id: game.game_id.clone(),
        block_id: new_block_id(),
        index: game.next_available_index(),
        title: title.to_string(),
        claimant_name: claimant_name.map(str::to_string),
        claimant_user_id: None,
        claimed_at: claimant_name.map(|_| now),
        confirmed_at: confirmed.then_some(now),
        is_winner: false,
        version: None,
    }
}
