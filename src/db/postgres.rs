use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool, Row};

use super::{EntityStore, Fields, StoreError, StoreResult, StoredEntity, VersionToken};

/// Postgres-backed entity store. Every logical table shares one `entities`
/// relation keyed by `(table_name, partition_key, row_key)`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn exists(&self, entity: &StoredEntity) -> StoreResult<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM entities
             WHERE table_name = $1 AND partition_key = $2 AND row_key = $3",
        )
        .bind(entity.table)
        .bind(&entity.partition_key)
        .bind(&entity.row_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}

fn decode_row(
    table: &'static str,
    partition_key: &str,
    row: &sqlx::postgres::PgRow,
) -> StoreResult<StoredEntity> {
    let row_key: String = row.try_get("row_key")?;
    let version: String = row.try_get("version")?;
    let Json(fields): Json<Fields> = row.try_get("fields")?;

    Ok(StoredEntity {
        table,
        partition_key: partition_key.to_string(),
        row_key,
        version: Some(VersionToken::new(version)),
        fields,
    })
}

#[async_trait]
impl EntityStore for PgStore {
    async fn get(
        &self,
        table: &'static str,
        partition_key: &str,
        row_key: &str,
    ) -> StoreResult<Option<StoredEntity>> {
        let row = sqlx::query(
            "SELECT row_key, version, fields FROM entities
             WHERE table_name = $1 AND partition_key = $2 AND row_key = $3",
        )
        .bind(table)
        .bind(partition_key)
        .bind(row_key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref()
            .map(|r| decode_row(table, partition_key, r))
            .transpose()
    }

    async fn get_all(
        &self,
        table: &'static str,
        partition_key: &str,
    ) -> StoreResult<Vec<StoredEntity>> {
        let rows = sqlx::query(
            "SELECT row_key, version, fields FROM entities
             WHERE table_name = $1 AND partition_key = $2
             ORDER BY seq ASC",
        )
        .bind(table)
        .bind(partition_key)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| decode_row(table, partition_key, r))
            .collect()
    }

    async fn insert(&self, entity: &StoredEntity) -> StoreResult<VersionToken> {
        let version = VersionToken::generate();
        let result = sqlx::query(
            "INSERT INTO entities (table_name, partition_key, row_key, version, fields)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT DO NOTHING",
        )
        .bind(entity.table)
        .bind(&entity.partition_key)
        .bind(&entity.row_key)
        .bind(version.as_str())
        .bind(Json(&entity.fields))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists {
                partition_key: entity.partition_key.clone(),
                row_key: entity.row_key.clone(),
            });
        }
        Ok(version)
    }

    async fn update(
        &self,
        entity: &StoredEntity,
        expected: &VersionToken,
    ) -> StoreResult<VersionToken> {
        let version = VersionToken::generate();
        let result = sqlx::query(
            "UPDATE entities
             SET fields = $1, version = $2, updated_at = NOW()
             WHERE table_name = $3 AND partition_key = $4 AND row_key = $5 AND version = $6",
        )
        .bind(Json(&entity.fields))
        .bind(version.as_str())
        .bind(entity.table)
        .bind(&entity.partition_key)
        .bind(&entity.row_key)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return if self.exists(entity).await? {
                Err(StoreError::VersionMismatch {
                    partition_key: entity.partition_key.clone(),
                    row_key: entity.row_key.clone(),
                })
            } else {
                Err(StoreError::NotFound {
                    partition_key: entity.partition_key.clone(),
                    row_key: entity.row_key.clone(),
                })
            };
        }
        Ok(version)
    }

    async fn delete(
        &self,
        table: &'static str,
        partition_key: &str,
        row_key: &str,
    ) -> StoreResult<()> {
        sqlx::query(
            "DELETE FROM entities
             WHERE table_name = $1 AND partition_key = $2 AND row_key = $3",
        )
        .bind(table)
        .bind(partition_key)
        .bind(row_key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
