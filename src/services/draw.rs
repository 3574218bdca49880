//! Winner draw over a game's eligible blocks.
//!
//! The pick is a plain uniform choice; it is not meant to be verifiable.

use rand::Rng;

use crate::{
    error::{AppError, Result},
    models::{Block, Game},
};

/// Source of uniform picks, injected so draws can be scripted in tests.
pub trait RandomSource: Send {
    /// Returns a value in `0..upper`. `upper` is never zero.
    fn next_index(&mut self, upper: usize) -> usize;
}

/// Thread-local generator used by the running service.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_index(&mut self, upper: usize) -> usize {
        rand::rng().random_range(0..upper)
    }
}

impl RandomSource for rand::rngs::StdRng {
    fn next_index(&mut self, upper: usize) -> usize {
        self.random_range(0..upper)
    }
}

#[derive(Debug, Clone)]
pub struct DrawOutcome {
    pub winner: Block,
    /// Block ids whose winner flag changed and must be written back.
    pub changed: Vec<String>,
}

pub fn eligible_blocks(blocks: &[Block], confirmed_only: bool) -> Vec<&Block> {
    blocks
        .iter()
        .filter(|b| b.is_claimed() && (!confirmed_only || b.is_confirmed()))
        .collect()
}

pub fn draw_winner(
    game: &mut Game,
    confirmed_only_override: Option<bool>,
    rng: &mut dyn RandomSource,
) -> Result<DrawOutcome> {
    if game.winner().is_some() {
        return Err(AppError::Conflict(format!(
            "Game {} already has a winner",
            game.game_id
        )));
    }

    if game.blocks.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Game {} has no blocks",
            game.game_id
        )));
    }

    let confirmed_only = confirmed_only_override.unwrap_or(game.confirmed_winners_only);
    let eligible = eligible_blocks(&game.blocks, confirmed_only);
    if eligible.is_empty() {
        return Err(AppError::BadRequest(if confirmed_only {
            "No confirmed blocks to draw from".to_string()
        } else {
            "No claimed blocks to draw from".to_string()
        }));
    }

    let eligible_len = eligible.len();
    let picked = rng.next_index(eligible_len).min(eligible_len - 1);
    let winner_id = eligible[picked].block_id.clone();

    let mut changed = Vec::new();
    let mut winner = None;
    for block in game.blocks.iter_mut() {
        let is_winner = block.block_id == winner_id;
        if block.is_winner != is_winner {
            block.is_winner = is_winner;
            changed.push(block.block_id.clone());
        }
        if is_winner {
            winner = Some(block.clone());
        }
    }

    let winner = winner.ok_or_else(|| AppError::Internal("drawn block vanished".to_string()))?;
    tracing::info!(
        "Winner drawn: game={}, block={}, index={}, eligible={}",
        game.game_id,
        winner.block_id,
        winner.index,
        eligible_len
    );

    Ok(DrawOutcome { winner, changed })
}
