use chrono::Utc;

use super::{
    claim_engine,
    draw::{self, RandomSource},
    lookup_directory::LookupDirectory,
    reconciliation::{self, ApplyReport},
};
use crate::{
    config::Config,
    db::{new_row_id, Database},
    error::{AppError, Result},
    models::{
        Block, Game, GameOwnership, GameUpdate, NewBlock, NewGame, BLOCK_TABLE, GAME_OWNER_TABLE,
        GAME_TABLE,
    },
};

/// Game Service - loads a fresh aggregate per call and writes back through
/// version-guarded store operations
pub struct GameService {
    db: Database,
    config: Config,
}

impl GameService {
    pub fn new(db: Database, config: Config) -> Self {
        Self { db, config }
    }

    async fn load_blocks(&self, game_id: &str) -> Result<Vec<Block>> {
        let rows = self.db.store().get_all(BLOCK_TABLE, game_id).await?;
        let blocks = rows
            .iter()
            .map(Block::from_entity)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(blocks)
    }

    pub async fn load_game(&self, owner_id: &str, game_id: &str) -> Result<Game> {
        let entity = self
            .db
            .store()
            .get(GAME_TABLE, owner_id, game_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Game {} not found", game_id)))?;

        let mut game = Game::from_entity(&entity)?;
        let blocks = self.load_blocks(&game.game_id).await?;
        game.set_blocks(blocks);
        Ok(game)
    }

    async fn game_owner(&self, game_id: &str) -> Result<Option<String>> {
        let entity = self
            .db
            .store()
            .get(GAME_OWNER_TABLE, game_id, GameOwnership::ROW_KEY)
            .await?;
        Ok(entity
            .as_ref()
            .map(GameOwnership::from_entity)
            .transpose()?
            .map(|o| o.owner_id))
    }

    /// Like `load_game`, but a game id reserved by someone else, or missing
    /// from the caller's partition, is `Forbidden`.
    async fn load_owned_game(&self, owner_id: &str, game_id: &str) -> Result<Game> {
        if self.game_owner(game_id).await?.as_deref() != Some(owner_id) {
            tracing::warn!("Game id {} is not reserved by {}", game_id, owner_id);
            return Err(AppError::Forbidden(format!(
                "Game {} does not belong to the caller",
                game_id
            )));
        }

        match self.load_game(owner_id, game_id).await {
            Err(AppError::NotFound(_)) => {
                tracing::warn!("Game {} is not owned by {}", game_id, owner_id);
                Err(AppError::Forbidden(format!(
                    "Game {} does not belong to the caller",
                    game_id
                )))
            }
            other => other,
        }
    }

    pub async fn list_games(&self, owner_id: &str) -> Result<Vec<Game>> {
        let rows = self.db.store().get_all(GAME_TABLE, owner_id).await?;
        let mut games = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut game = Game::from_entity(row)?;
            let blocks = self.load_blocks(&game.game_id).await?;
            game.set_blocks(blocks);
            games.push(game);
        }
        Ok(games)
    }

    pub async fn create_game(&self, owner_id: &str, new_game: NewGame) -> Result<Game> {
        let game_id = new_game
            .game_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(new_row_id);

        let store = self.db.store();
        match self.game_owner(&game_id).await? {
            Some(existing) if existing != owner_id => {
                tracing::warn!(
                    "Game id {} requested by {} is reserved by another owner",
                    game_id,
                    owner_id
                );
                return Err(AppError::Conflict(format!("Game id {} is taken", game_id)));
            }
            Some(_) => {}
            None => {
                let ownership = GameOwnership {
                    game_id: game_id.clone(),
                    owner_id: owner_id.to_string(),
                };
                // a concurrent reservation surfaces as AlreadyExists -> Conflict
                store.insert(&ownership.to_entity()?).await?;
            }
        }

        if store.get(GAME_TABLE, owner_id, &game_id).await?.is_some() {
            return Err(AppError::Conflict(format!("Game {} already exists", game_id)));
        }

        let mut game = Game::new(owner_id, game_id, new_game, self.config.game_defaults());
        game.version = Some(store.insert(&game.to_entity()?).await?);

        tracing::info!("Game created: owner={}, game={}", owner_id, game.game_id);
        Ok(game)
    }

    /// Applies a full client edit: game fields, friendly name and the whole
    /// block list. Nothing is written if any submitted block is stale.
    pub async fn update_game(
        &self,
        owner_id: &str,
        game_id: &str,
        update: GameUpdate,
    ) -> Result<(Game, ApplyReport)> {
        let mut game = self.load_owned_game(owner_id, game_id).await?;

        reconciliation::ensure_partition(game_id, &game.blocks)?;
        let plan = reconciliation::reconcile(game_id, &game.blocks, &update.blocks);
        if plan.has_conflicts() {
            return Err(AppError::BlockConflicts(plan.conflicts));
        }

        game.title = update.title;
        game.description = update.description;
        game.display_as_grid = update.display_as_grid;
        game.group_name = update.group_name;
        game.short_name = update.short_name;
        if let Some(confirmed_only) = update.confirmed_winners_only {
            game.confirmed_winners_only = confirmed_only;
        }
        if let Some(image) = update.image.filter(|i| !i.trim().is_empty()) {
            game.image = Some(image);
        }

        reconciliation::verify_versions(self.db.store(), &game, &plan).await?;
        if let (Some(group), Some(name)) = (&game.group_name, &game.short_name) {
            if !group.trim().is_empty() && !name.trim().is_empty() {
                LookupDirectory::new(self.db.clone())
                    .add_mapping(group, name, game_id, owner_id)
                    .await?;
            }
        }

        let report = reconciliation::apply_plan(self.db.store(), &game, plan).await?;
        let game = self.load_game(owner_id, game_id).await?;
        Ok((game, report))
    }

    /// Removes only the game row; its blocks stay in their partition.
    pub async fn delete_game(&self, owner_id: &str, game_id: &str) -> Result<()> {
        self.load_owned_game(owner_id, game_id).await?;
        self.db.store().delete(GAME_TABLE, owner_id, game_id).await?;
        tracing::info!("Game deleted: owner={}, game={}", owner_id, game_id);
        Ok(())
    }

    pub async fn add_block(
        &self,
        owner_id: &str,
        game_id: &str,
        new_block: NewBlock,
    ) -> Result<Block> {
        let game = self.load_owned_game(owner_id, game_id).await?;
        let mut block = claim_engine::create_block(
            &game,
            &new_block.title,
            new_block.claimant_name.as_deref(),
            new_block.confirmed,
            Utc::now(),
        );
        block.version = Some(self.db.store().insert(&block.to_entity()?).await?);

        tracing::info!(
            "Block added: game={}, block={}, index={}",
            game_id,
            block.block_id,
            block.index
        );
        Ok(block)
    }

    pub async fn delete_block(&self, owner_id: &str, game_id: &str, block_id: &str) -> Result<()> {
        self.load_owned_game(owner_id, game_id).await?;
        self.db.store().delete(BLOCK_TABLE, game_id, block_id).await?;
        tracing::info!("Block deleted: game={}, block={}", game_id, block_id);
        Ok(())
    }

    async fn get_block(&self, game_id: &str, block_id: &str) -> Result<Block> {
        let entity = self
            .db
            .store()
            .get(BLOCK_TABLE, game_id, block_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Block {} not found", block_id)))?;
        Ok(Block::from_entity(&entity)?)
    }

    async fn save_block(&self, block: &mut Block) -> Result<()> {
        let expected = block
            .version
            .clone()
            .ok_or_else(|| AppError::Internal("block loaded without a version".to_string()))?;
        block.version = Some(self.db.store().update(&block.to_entity()?, &expected).await?);
        Ok(())
    }

    /// Open to anyone; no ownership check.
    pub async fn claim_block(
        &self,
        game_id: &str,
        block_id: &str,
        claimant_name: &str,
        claimant_user_id: Option<&str>,
    ) -> Result<Block> {
        let mut block = self.get_block(game_id, block_id).await?;
        claim_engine::claim(&mut block, claimant_name, claimant_user_id, Utc::now())?;
        self.save_block(&mut block).await?;

        tracing::info!(
            "Block claimed: game={}, block={}, by={}",
            game_id,
            block_id,
            claimant_name
        );
        Ok(block)
    }

    pub async fn unclaim_block(&self, owner_id: &str, game_id: &str, block_id: &str) -> Result<Block> {
        self.load_owned_game(owner_id, game_id).await?;
        let mut block = self.get_block(game_id, block_id).await?;

        let before = block.clone();
        claim_engine::unclaim(&mut block);
        if block == before {
            tracing::debug!("Block {} already open", block_id);
            return Ok(block);
        }

        self.save_block(&mut block).await?;
        tracing::info!("Block unclaimed: game={}, block={}", game_id, block_id);
        Ok(block)
    }

    pub async fn confirm_block(&self, owner_id: &str, game_id: &str, block_id: &str) -> Result<Block> {
        self.load_owned_game(owner_id, game_id).await?;
        let mut block = self.get_block(game_id, block_id).await?;
        claim_engine::confirm(&mut block, Utc::now())?;
        self.save_block(&mut block).await?;

        tracing::info!(
            "Block confirmation toggled: game={}, block={}, confirmed={}",
            game_id,
            block_id,
            block.is_confirmed()
        );
        Ok(block)
    }

    pub async fn draw_winner(
        &self,
        owner_id: &str,
        game_id: &str,
        confirmed_only_override: Option<bool>,
        rng: &mut dyn RandomSource,
    ) -> Result<Block> {
        let mut game = self.load_owned_game(owner_id, game_id).await?;
        let outcome = draw::draw_winner(&mut game, confirmed_only_override, rng)?;

        for block in game.blocks.iter_mut() {
            if outcome.changed.contains(&block.block_id) {
                self.save_block(block).await?;
            }
        }

        Ok(game
            .block(&outcome.winner.block_id)
            .cloned()
            .unwrap_or(outcome.winner))
    }

    pub async fn get_game_by_name(&self, group: &str, name: &str) -> Result<Game> {
        let entry = LookupDirectory::new(self.db.clone()).resolve(group, name).await?;
        self.load_game(&entry.owner_id, &entry.game_id).await
    }

    pub async fn check_name(&self, group: &str, name: &str) -> Result<bool> {
        LookupDirectory::new(self.db.clone()).is_available(group, name).await
    }

    pub async fn add_name(
        &self,
        owner_id: &str,
        game_id: &str,
        group: &str,
        name: &str,
    ) -> Result<()> {
        self.load_owned_game(owner_id, game_id).await?;
        LookupDirectory::new(self.db.clone())
            .add_mapping(group, name, game_id, owner_id)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::services::draw::scripted::Scripted;

    fn service() -> GameService {
        GameService::new(Database::in_memory(), test_config())
    }

    fn new_game(id: &str) -> NewGame {
        NewGame {
            game_id: Some(id.to_string()),
            title: "Cup final".to_string(),
            description: "Pick a square".to_string(),
            image: None,
            group_name: None,
            short_name: None,
            confirmed_winners_only: None,
            display_as_grid: None,
        }
    }

    fn new_block(title: &str, claimant: Option<&str>, confirmed: bool) -> NewBlock {
        NewBlock {
            title: title.to_string(),
            claimant_name: claimant.map(str::to_string),
            confirmed,
        }
    }

    fn update_from(game: &Game, blocks: Vec<Block>) -> GameUpdate {
        GameUpdate {
            title: game.title.clone(),
            description: game.description.clone(),
            image: None,
            group_name: None,
            short_name: None,
            confirmed_winners_only: None,
            display_as_grid: game.display_as_grid,
            blocks,
        }
    }

    #[tokio::test]
    async fn create_game_applies_defaults_and_rejects_duplicates() {
        let svc = service();
        let game = svc.create_game("owner", new_game("g1")).await.unwrap();
        assert!(game.confirmed_winners_only);
        assert!(game.display_as_grid);

        let err = svc.create_game("owner", new_game("g1")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn blocks_get_sequential_indices_and_reuse_gaps() {
        let svc = service();
        svc.create_game("owner", new_game("g1")).await.unwrap();
        let b1 = svc.add_block("owner", "g1", new_block("A", None, false)).await.unwrap();
        let b2 = svc.add_block("owner", "g1", new_block("B", None, false)).await.unwrap();
        svc.add_block("owner", "g1", new_block("C", None, false)).await.unwrap();
        assert_eq!((b1.index, b2.index), (1, 2));

        svc.delete_block("owner", "g1", &b2.block_id).await.unwrap();
        let reused = svc.add_block("owner", "g1", new_block("D", None, false)).await.unwrap();
        assert_eq!(reused.index, 2);
    }

    #[tokio::test]
    async fn foreign_owner_is_forbidden() {
        let svc = service();
        svc.create_game("owner", new_game("g1")).await.unwrap();

        let err = svc
            .add_block("intruder", "g1", new_block("A", None, false))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = svc.load_game("intruder", "g1").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn claim_confirm_and_unclaim_flow() {
        let svc = service();
        svc.create_game("owner", new_game("g1")).await.unwrap();
        let block = svc.add_block("owner", "g1", new_block("A", None, false)).await.unwrap();

        let claimed = svc
            .claim_block("g1", &block.block_id, "Jo", Some("user-7"))
            .await
            .unwrap();
        assert!(claimed.is_claimed());

        let err = svc
            .claim_block("g1", &block.block_id, "Late", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let confirmed = svc.confirm_block("owner", "g1", &block.block_id).await.unwrap();
        assert!(confirmed.is_confirmed());

        let open = svc.unclaim_block("owner", "g1", &block.block_id).await.unwrap();
        assert!(!open.is_claimed() && !open.is_confirmed());

        let again = svc.unclaim_block("owner", "g1", &block.block_id).await.unwrap();
        assert_eq!(again, open);
    }

    #[tokio::test]
    async fn claim_of_missing_block_is_not_found() {
        let svc = service();
        let err = svc.claim_block("g1", "nope", "Jo", None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn draw_persists_single_winner() {
        let svc = service();
        svc.create_game("owner", new_game("g1")).await.unwrap();
        svc.add_block("owner", "g1", new_block("A", Some("x"), false)).await.unwrap();
        let confirmed = svc
            .add_block("owner", "g1", new_block("B", Some("y"), true))
            .await
            .unwrap();

        let winner = svc
            .draw_winner("owner", "g1", None, &mut Scripted(vec![0]))
            .await
            .unwrap();
        assert_eq!(winner.block_id, confirmed.block_id);

        let game = svc.load_game("owner", "g1").await.unwrap();
        assert_eq!(game.blocks.iter().filter(|b| b.is_winner).count(), 1);
        assert!(game.summary().is_won);
        assert_eq!(game.summary().won_by_name.as_deref(), Some("y"));

        let err = svc
            .draw_winner("owner", "g1", None, &mut Scripted(vec![0]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_game_reconciles_blocks() {
        let svc = service();
        svc.create_game("owner", new_game("g1")).await.unwrap();
        svc.add_block("owner", "g1", new_block("A", None, false)).await.unwrap();
        svc.add_block("owner", "g1", new_block("B", None, false)).await.unwrap();
        let game = svc.load_game("owner", "g1").await.unwrap();

        let mut edited_a = game.blocks[0].clone();
        edited_a.title = "A edited".to_string();
        let new_c = Block {
            game_id: String::new(),
            block_id: "tmp-1".to_string(),
            index: 0,
            title: "C".to_string(),
            claimant_name: None,
            claimant_user_id: None,
            claimed_at: None,
            confirmed_at: None,
            is_winner: false,
            version: None,
        };

        let mut update = update_from(&game, vec![edited_a, new_c]);
        update.title = "Renamed".to_string();
        let (game, report) = svc.update_game("owner", "g1", update).await.unwrap();

        assert_eq!((report.deleted, report.updated, report.inserted), (1, 1, 1));
        assert_eq!(game.title, "Renamed");
        let titles: Vec<&str> = game.blocks.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["A edited", "C"]);
        assert_eq!(game.blocks[1].index, 2);
    }

    #[tokio::test]
    async fn stale_update_is_rejected_without_writes() {
        let svc = service();
        svc.create_game("owner", new_game("g1")).await.unwrap();
        let block = svc.add_block("owner", "g1", new_block("A", None, false)).await.unwrap();
        let snapshot = svc.load_game("owner", "g1").await.unwrap();

        // a participant claims after the owner loaded the game
        svc.claim_block("g1", &block.block_id, "Jo", None).await.unwrap();

        let mut stale = snapshot.blocks[0].clone();
        stale.title = "Overwrite".to_string();
        let mut update = update_from(&snapshot, vec![stale]);
        update.title = "Should not stick".to_string();

        let err = svc.update_game("owner", "g1", update).await.unwrap_err();
        assert!(matches!(err, AppError::BlockConflicts(ref c) if c.len() == 1));

        let game = svc.load_game("owner", "g1").await.unwrap();
        assert_eq!(game.title, "Cup final");
        assert_eq!(game.blocks[0].claimant_name.as_deref(), Some("Jo"));
        assert_eq!(game.blocks[0].title, "A");
    }

    #[tokio::test]
    async fn update_game_registers_friendly_name() {
        let svc = service();
        let game = svc.create_game("owner", new_game("g1")).await.unwrap();
        let mut update = update_from(&game, Vec::new());
        update.group_name = Some("uk".to_string());
        update.short_name = Some("cup-final".to_string());
        svc.update_game("owner", "g1", update).await.unwrap();

        assert!(!svc.check_name("uk", "cup-final").await.unwrap());
        let by_name = svc.get_game_by_name("uk", "cup-final").await.unwrap();
        assert_eq!(by_name.game_id, "g1");

        let other = svc.create_game("rival", new_game("g2")).await.unwrap();
        let err = svc.add_name("rival", &other.game_id, "uk", "cup-final").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn game_id_cannot_be_reused_by_another_owner() {
        let svc = service();
        svc.create_game("owner", new_game("g1")).await.unwrap();
        let block = svc.add_block("owner", "g1", new_block("A", Some("Jo"), false)).await.unwrap();

        let err = svc.create_game("rival", new_game("g1")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = svc
            .unclaim_block("rival", "g1", &block.block_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let game = svc.load_game("owner", "g1").await.unwrap();
        let err = svc
            .update_game("rival", "g1", update_from(&game, Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = svc
            .draw_winner("rival", "g1", Some(false), &mut Scripted(vec![0]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let game = svc.load_game("owner", "g1").await.unwrap();
        assert_eq!(game.blocks.len(), 1);
        assert_eq!(game.blocks[0].claimant_name.as_deref(), Some("Jo"));
    }

    #[tokio::test]
    async fn deleted_game_id_stays_with_its_owner() {
        let svc = service();
        svc.create_game("owner", new_game("g1")).await.unwrap();
        svc.add_block("owner", "g1", new_block("A", None, false)).await.unwrap();
        svc.delete_game("owner", "g1").await.unwrap();

        let err = svc.create_game("rival", new_game("g1")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let again = svc.create_game("owner", new_game("g1")).await.unwrap();
        assert_eq!(again.game_id, "g1");
        assert_eq!(svc.load_game("owner", "g1").await.unwrap().blocks.len(), 1);
    }

    #[tokio::test]
    async fn block_recorded_for_another_game_blocks_the_edit() {
        let svc = service();
        svc.create_game("owner", new_game("g1")).await.unwrap();
        svc.add_block("owner", "g1", new_block("A", None, false)).await.unwrap();

        let mut stray = Block {
            game_id: "other".to_string(),
            block_id: new_row_id(),
            index: 9,
            title: "Stray".to_string(),
            claimant_name: None,
            claimant_user_id: None,
            claimed_at: None,
            confirmed_at: None,
            is_winner: false,
            version: None,
        }
        .to_entity()
        .unwrap();
        stray.partition_key = "g1".to_string();
        svc.db.store().insert(&stray).await.unwrap();

        let game = svc.load_game("owner", "g1").await.unwrap();
        let err = svc
            .update_game("owner", "g1", update_from(&game, Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(svc.load_game("owner", "g1").await.unwrap().blocks.len(), 2);
    }

    #[tokio::test]
    async fn rejected_edit_does_not_register_its_name() {
        let svc = service();
        svc.create_game("owner", new_game("g1")).await.unwrap();
        let a = svc.add_block("owner", "g1", new_block("A", None, false)).await.unwrap();
        svc.add_block("owner", "g1", new_block("B", None, false)).await.unwrap();
        let snapshot = svc.load_game("owner", "g1").await.unwrap();

        svc.claim_block("g1", &a.block_id, "Jo", None).await.unwrap();

        let mut edit = snapshot.blocks[0].clone();
        edit.title = "A edited".to_string();
        let mut update = update_from(&snapshot, vec![edit]);
        update.group_name = Some("uk".to_string());
        update.short_name = Some("cup-final".to_string());

        let err = svc.update_game("owner", "g1", update).await.unwrap_err();
        assert!(matches!(err, AppError::BlockConflicts(_)));
        assert!(svc.check_name("uk", "cup-final").await.unwrap());
        assert_eq!(svc.load_game("owner", "g1").await.unwrap().blocks.len(), 2);
    }

    #[tokio::test]
    async fn delete_game_does_not_cascade() {
        let svc = service();
        svc.create_game("owner", new_game("g1")).await.unwrap();
        let block = svc.add_block("owner", "g1", new_block("A", None, false)).await.unwrap();

        svc.delete_game("owner", "g1").await.unwrap();
        assert!(matches!(
            svc.load_game("owner", "g1").await.unwrap_err(),
            AppError::NotFound(_)
        ));

        let orphan = svc.get_block("g1", &block.block_id).await.unwrap();
        assert_eq!(orphan.title, "A");
    }

    #[tokio::test]
    async fn list_games_includes_blocks() {
        let svc = service();
        svc.create_game("owner", new_game("g1")).await.unwrap();
        svc.create_game("owner", new_game("g2")).await.unwrap();
        svc.add_block("owner", "g2", new_block("A", None, false)).await.unwrap();

        let games = svc.list_games("owner").await.unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[1].blocks.len(), 1);
        assert!(games.iter().all(|g| g.version.is_some()));
    }
}
