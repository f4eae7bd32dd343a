//! Postgres-backed [`EntityLedger`] (§4.E). The in-memory double in
//! [`crate::testing::InMemoryLedger`] is for tests only; this is the
//! implementation a real deployment wires into the run context.
//!
//! Grounded on the `sqlx::PgPool` query style used by `beiju-mmoldb`'s
//! repository layer in the retrieval pack (plain `query_as!`-free runtime
//! queries bound with `.bind(...)`, mapped with `.fetch_optional`/`.execute`,
//! errors folded into this crate's own error enum rather than leaking
//! `sqlx::Error` across the trait boundary).

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use sync_api::error::LedgerError;
use sync_api::ledger::{EntityLedger, EntityLedgerRecord};

pub struct PostgresEntityLedger {
    pool: PgPool,
}

impl PostgresEntityLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing table if it does not already exist. Called once
    /// at startup by the host application, not per run.
    pub async fn ensure_schema(&self) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entity_ledger (
                id UUID PRIMARY KEY,
                sync_id TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                parent_entity_id TEXT,
                hash TEXT NOT NULL,
                sync_job_id TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                UNIQUE (sync_id, entity_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl EntityLedger for PostgresEntityLedger {
    async fn get_by_entity_and_sync_id(
        &self,
        sync_id: &str,
        entity_id: &str,
    ) -> Result<Option<EntityLedgerRecord>, LedgerError> {
        let row = sqlx::query_as::<_, PgEntityLedgerRow>(
            "SELECT id, sync_id, entity_id, parent_entity_id, hash, sync_job_id, created_at, updated_at \
             FROM entity_ledger WHERE sync_id = $1 AND entity_id = $2",
        )
        .bind(sync_id)
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(row.map(Into::into))
    }

    async fn create(
        &self,
        sync_id: &str,
        sync_job_id: &str,
        entity_id: &str,
        parent_entity_id: Option<&str>,
        hash: &str,
    ) -> Result<EntityLedgerRecord, LedgerError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO entity_ledger (id, sync_id, entity_id, parent_entity_id, hash, sync_job_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7) \
             ON CONFLICT (sync_id, entity_id) DO UPDATE SET hash = EXCLUDED.hash, updated_at = EXCLUDED.updated_at",
        )
        .bind(id)
        .bind(sync_id)
        .bind(entity_id)
        .bind(parent_entity_id)
        .bind(hash)
        .bind(sync_job_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        Ok(EntityLedgerRecord {
            id,
            sync_id: sync_id.to_string(),
            entity_id: entity_id.to_string(),
            parent_entity_id: parent_entity_id.map(|s| s.to_string()),
            hash: hash.to_string(),
            sync_job_id: sync_job_id.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn update(&self, sync_id: &str, entity_id: &str, new_hash: &str) -> Result<(), LedgerError> {
        sqlx::query("UPDATE entity_ledger SET hash = $1, updated_at = $2 WHERE sync_id = $3 AND entity_id = $4")
            .bind(new_hash)
            .bind(Utc::now())
            .bind(sync_id)
            .bind(entity_id)
            .execute(&self.pool)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, sync_id: &str, entity_id: &str) -> Result<(), LedgerError> {
        sqlx::query("DELETE FROM entity_ledger WHERE sync_id = $1 AND entity_id = $2")
            .bind(sync_id)
            .bind(entity_id)
            .execute(&self.pool)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn list_entity_ids(&self, sync_id: &str) -> Result<Vec<String>, LedgerError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT entity_id FROM entity_ledger WHERE sync_id = $1")
            .bind(sync_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[derive(sqlx::FromRow)]
struct PgEntityLedgerRow {
    id: Uuid,
    sync_id: String,
    entity_id: String,
    parent_entity_id: Option<String>,
    hash: String,
    sync_job_id: String,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl From<PgEntityLedgerRow> for EntityLedgerRecord {
    fn from(row: PgEntityLedgerRow) -> Self {
        Self {
            id: row.id,
            sync_id: row.sync_id,
            entity_id: row.entity_id,
            parent_entity_id: row.parent_entity_id,
            hash: row.hash,
            sync_job_id: row.sync_job_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
