use crate::{
    db::Database,
    error::{AppError, Result},
    models::{LookupEntry, LOOKUP_TABLE},
};

/// Lookup Directory - maps a `(group, name)` pair onto one owner's game
pub struct LookupDirectory {
    db: Database,
}

impl LookupDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Registers the pair for `game_id`. The same owner may repoint an
    /// existing pair at another of their games; anyone else gets `Conflict`.
    pub async fn add_mapping(
        &self,
        group: &str,
        name: &str,
        game_id: &str,
        owner_id: &str,
    ) -> Result<LookupEntry> {
        let store = self.db.store();
        let existing = store.get(LOOKUP_TABLE, group, name).await?;

        let Some(entity) = existing else {
            let mut entry = LookupEntry {
                group: group.to_string(),
                name: name.to_string(),
                game_id: game_id.to_string(),
                owner_id: owner_id.to_string(),
                version: None,
            };
            entry.version = Some(store.insert(&entry.to_entity()?).await?);
            tracing::info!("Lookup {}/{} registered for game {}", group, name, game_id);
            return Ok(entry);
        };

        let mut entry = LookupEntry::from_entity(&entity)?;
        if entry.owner_id != owner_id {
            tracing::warn!(
                "Lookup {}/{} already taken by another owner (game {})",
                group,
                name,
                entry.game_id
            );
            return Err(AppError::Conflict(format!(
                "{}/{} is already in use",
                group, name
            )));
        }

        if entry.game_id == game_id {
            tracing::debug!("Lookup {}/{} already points at game {}", group, name, game_id);
            return Ok(entry);
        }

        let expected = entry
            .version
            .clone()
            .ok_or_else(|| AppError::Internal("lookup row loaded without a version".to_string()))?;
        entry.game_id = game_id.to_string();
        entry.version = Some(store.update(&entry.to_entity()?, &expected).await?);
        tracing::info!("Lookup {}/{} repointed to game {}", group, name, game_id);
        Ok(entry)
    }

    pub async fn resolve(&self, group: &str, name: &str) -> Result<LookupEntry> {
        let entity = self
            .db
            .store()
            .get(LOOKUP_TABLE, group, name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No game named {}/{}", group, name)))?;
        Ok(LookupEntry::from_entity(&entity)?)
    }

    pub async fn is_available(&self, group: &str, name: &str) -> Result<bool> {
        Ok(self
            .db
            .store()
            .get(LOOKUP_TABLE, group, name)
            .await?
            .is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> LookupDirectory {
        LookupDirectory::new(Database::in_memory())
    }

    #[tokio::test]
    async fn add_then_resolve() {
        let dir = directory();
        dir.add_mapping("uk", "final", "g1", "o1").await.unwrap();

        let entry = dir.resolve("uk", "final").await.unwrap();
        assert_eq!(entry.game_id, "g1");
        assert_eq!(entry.owner_id, "o1");
        assert!(!dir.is_available("uk", "final").await.unwrap());
    }

    #[tokio::test]
    async fn resolve_unknown_is_not_found() {
        let err = directory().resolve("uk", "nope").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn other_owner_conflicts() {
        let dir = directory();
        dir.add_mapping("uk", "final", "g1", "o1").await.unwrap();

        let err = dir.add_mapping("uk", "final", "g2", "o2").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(dir.resolve("uk", "final").await.unwrap().game_id, "g1");
    }

    #[tokio::test]
    async fn same_owner_repoints_mapping() {
        let dir = directory();
        dir.add_mapping("uk", "final", "g1", "o1").await.unwrap();
        dir.add_mapping("uk", "final", "g2", "o1").await.unwrap();

        assert_eq!(dir.resolve("uk", "final").await.unwrap().game_id, "g2");
    }

    #[tokio::test]
    async fn same_pair_in_different_groups_is_independent() {
        let dir = directory();
        dir.add_mapping("uk", "final", "g1", "o1").await.unwrap();
        dir.add_mapping("us", "final", "g2", "o2").await.unwrap();
        assert!(dir.is_available("fr", "final").await.unwrap());
    }
}
