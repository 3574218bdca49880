//! Partitioned entity store.
//!
//! Rows are addressed by `(table, partition_key, row_key)` and carry an opaque
//! version token that changes on every successful write. Domain types never
//! reach this layer; they are mapped to [`StoredEntity`] field bags first.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Fresh 32-hex row identity.
pub fn new_row_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

/// Opaque optimistic-concurrency token assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub(crate) fn generate() -> Self {
        Self(hex::encode(rand::random::<[u8; 12]>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntity {
    pub table: &'static str,
    pub partition_key: String,
    pub row_key: String,
    pub version: Option<VersionToken>,
    pub fields: Fields,
}

impl StoredEntity {
    pub fn new(
        table: &'static str,
        partition_key: impl Into<String>,
        row_key: impl Into<String>,
        fields: Fields,
    ) -> Self {
        Self {
            table,
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            version: None,
            fields,
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Row {partition_key}/{row_key} not found")]
    NotFound {
        partition_key: String,
        row_key: String,
    },

    #[error("Row {partition_key}/{row_key} already exists")]
    AlreadyExists {
        partition_key: String,
        row_key: String,
    },

    #[error("Row {partition_key}/{row_key} was modified by another writer")]
    VersionMismatch {
        partition_key: String,
        row_key: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get(
        &self,
        table: &'static str,
        partition_key: &str,
        row_key: &str,
    ) -> StoreResult<Option<StoredEntity>>;

    /// Rows come back in insertion order; callers sort when they need more.
    async fn get_all(
        &self,
        table: &'static str,
        partition_key: &str,
    ) -> StoreResult<Vec<StoredEntity>>;

    /// Fails with `AlreadyExists` on a duplicate key.
    async fn insert(&self, entity: &StoredEntity) -> StoreResult<VersionToken>;

    /// Fails with `VersionMismatch` if the stored version differs from `expected`.
    async fn update(
        &self,
        entity: &StoredEntity,
        expected: &VersionToken,
    ) -> StoreResult<VersionToken>;

    /// Deleting an absent row succeeds.
    async fn delete(
        &self,
        table: &'static str,
        partition_key: &str,
        row_key: &str,
    ) -> StoreResult<()>;
}

/// Cheaply cloneable handle shared by handlers and services.
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn EntityStore>,
}

impl Database {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        match config.database_url.as_deref() {
            Some(url) => {
                let store = PgStore::connect(url, config.database_max_connections).await?;
                tracing::info!("Running database migrations...");
                store.run_migrations().await?;
                Ok(Self::from_store(store))
            }
            None => {
                tracing::warn!("DATABASE_URL not set; using in-memory entity store");
                Ok(Self::in_memory())
            }
        }
    }

    pub fn in_memory() -> Self {
        Self::from_store(MemoryStore::new())
    }

    pub fn from_store(store: impl EntityStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn store(&self) -> &dyn EntityStore {
        self.store.as_ref()
    }
}
