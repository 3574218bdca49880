use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{EntityStore, Fields, StoreError, StoreResult, StoredEntity, VersionToken};

type PartitionId = (&'static str, String);

struct Slot {
    seq: u64,
    version: VersionToken,
    fields: Fields,
}

#[derive(Default)]
struct Tables {
    next_seq: u64,
    partitions: HashMap<PartitionId, HashMap<String, Slot>>,
}

/// Process-local entity store used in development and tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn materialize(table: &'static str, partition_key: &str, row_key: &str, slot: &Slot) -> StoredEntity {
    StoredEntity {
        table,
        partition_key: partition_key.to_string(),
        row_key: row_key.to_string(),
        version: Some(slot.version.clone()),
        fields: slot.fields.clone(),
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get(
        &self,
        table: &'static str,
        partition_key: &str,
        row_key: &str,
    ) -> StoreResult<Option<StoredEntity>> {
        let tables = self.inner.read().await;
        let row = tables
            .partitions
            .get(&(table, partition_key.to_string()))
            .and_then(|rows| rows.get(row_key))
            .map(|slot| materialize(table, partition_key, row_key, slot));
        Ok(row)
    }

    async fn get_all(
        &self,
        table: &'static str,
        partition_key: &str,
    ) -> StoreResult<Vec<StoredEntity>> {
        let tables = self.inner.read().await;
        let Some(rows) = tables.partitions.get(&(table, partition_key.to_string())) else {
            return Ok(Vec::new());
        };

        let mut slots: Vec<(&String, &Slot)> = rows.iter().collect();
        slots.sort_by_key(|(_, slot)| slot.seq);

        Ok(slots
            .into_iter()
            .map(|(row_key, slot)| materialize(table, partition_key, row_key, slot))
            .collect())
    }

    async fn insert(&self, entity: &StoredEntity) -> StoreResult<VersionToken> {
        let mut tables = self.inner.write().await;
        let seq = tables.next_seq;
        let rows = tables
            .partitions
            .entry((entity.table, entity.partition_key.clone()))
            .or_default();

        if rows.contains_key(&entity.row_key) {
            return Err(StoreError::AlreadyExists {
                partition_key: entity.partition_key.clone(),
                row_key: entity.row_key.clone(),
            });
        }

        let version = VersionToken::generate();
        rows.insert(
            entity.row_key.clone(),
            Slot {
                seq,
                version: version.clone(),
                fields: entity.fields.clone(),
            },
        );
        tables.next_seq += 1;
        Ok(version)
    }

    async fn update(
        &self,
        entity: &StoredEntity,
        expected: &VersionToken,
    ) -> StoreResult<VersionToken> {
        let mut tables = self.inner.write().await;
        let slot = tables
            .partitions
            .get_mut(&(entity.table, entity.partition_key.clone()))
            .and_then(|rows| rows.get_mut(&entity.row_key))
            .ok_or_else(|| StoreError::NotFound {
                partition_key: entity.partition_key.clone(),
                row_key: entity.row_key.clone(),
            })?;

        if &slot.version != expected {
            return Err(StoreError::VersionMismatch {
                partition_key: entity.partition_key.clone(),
                row_key: entity.row_key.clone(),
            });
        }

        slot.version = VersionToken::generate();
        slot.fields = entity.fields.clone();
        Ok(slot.version.clone())
    }

    async fn delete(
        &self,
        table: &'static str,
        partition_key: &str,
        row_key: &str,
    ) -> StoreResult<()> {
        let mut tables = self.inner.write().await;
        if let Some(rows) = tables.partitions.get_mut(&(table, partition_key.to_string())) {
            rows.remove(row_key);
        }
        Ok(())
    }
}
