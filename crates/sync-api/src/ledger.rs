//! §4.E Entity Ledger: the durable (sync_id, entity_id) → hash table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EntityLedgerRecord {
    pub id: Uuid,
    pub sync_id: String,
    pub entity_id: String,
    pub parent_entity_id: Option<String>,
    pub hash: String,
    pub sync_job_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Interface for the entity ledger (§4.E). A row exists if and only if the
/// entity is currently represented in every destination of that sync.
#[async_trait]
pub trait EntityLedger: Send + Sync {
    async fn get_by_entity_and_sync_id(
        &self,
        sync_id: &str,
        entity_id: &str,
    ) -> Result<Option<EntityLedgerRecord>, LedgerError>;

    async fn create(
        &self,
        sync_id: &str,
        sync_job_id: &str,
        entity_id: &str,
        parent_entity_id: Option<&str>,
        hash: &str,
    ) -> Result<EntityLedgerRecord, LedgerError>;

    async fn update(&self, sync_id: &str, entity_id: &str, new_hash: &str) -> Result<(), LedgerError>;

    async fn delete(&self, sync_id: &str, entity_id: &str) -> Result<(), LedgerError>;

    /// All entity ids currently recorded for a sync, used by the
    /// end-of-run delete-reconciliation pass (§9 open-question decision).
    async fn list_entity_ids(&self, sync_id: &str) -> Result<Vec<String>, LedgerError>;
}
