//! In-memory test doubles for the three adapter traits and the ledger,
//! used by this crate's own unit tests and available to downstream crates
//! under the `test-doubles` feature for their own integration tests —
//! mirroring the fake-adapter pattern used to exercise trait-object-heavy
//! code in the retrieval pack (e.g. `holon::core::traits`'s `#[cfg(test)]`
//! unit tests against plain structs rather than live backends).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;

use sync_api::entity::Entity;
use sync_api::error::{DestinationError, EmbeddingError, LedgerError, SourceError};
use sync_api::ledger::{EntityLedger, EntityLedgerRecord};
use sync_api::traits::{DestinationAdapter, EmbeddingModel, EntityStream, SourceAdapter};

#[derive(Default)]
pub struct InMemoryLedger {
    rows: DashMap<(String, String), EntityLedgerRecord>,
}

#[async_trait]
impl EntityLedger for InMemoryLedger {
    async fn get_by_entity_and_sync_id(
        &self,
        sync_id: &str,
        entity_id: &str,
    ) -> Result<Option<EntityLedgerRecord>, LedgerError> {
        Ok(self.rows.get(&(sync_id.to_string(), entity_id.to_string())).map(|r| r.clone()))
    }

    async fn create(
        &self,
        sync_id: &str,
        sync_job_id: &str,
        entity_id: &str,
        parent_entity_id: Option<&str>,
        hash: &str,
    ) -> Result<EntityLedgerRecord, LedgerError> {
        let now = chrono::Utc::now();
        let record = EntityLedgerRecord {
            id: uuid::Uuid::new_v4(),
            sync_id: sync_id.to_string(),
            entity_id: entity_id.to_string(),
            parent_entity_id: parent_entity_id.map(|s| s.to_string()),
            hash: hash.to_string(),
            sync_job_id: sync_job_id.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.rows.insert((sync_id.to_string(), entity_id.to_string()), record.clone());
        Ok(record)
    }

    async fn update(&self, sync_id: &str, entity_id: &str, new_hash: &str) -> Result<(), LedgerError> {
        if let Some(mut row) = self.rows.get_mut(&(sync_id.to_string(), entity_id.to_string())) {
            row.hash = new_hash.to_string();
            row.updated_at = chrono::Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, sync_id: &str, entity_id: &str) -> Result<(), LedgerError> {
        self.rows.remove(&(sync_id.to_string(), entity_id.to_string()));
        Ok(())
    }

    async fn list_entity_ids(&self, sync_id: &str) -> Result<Vec<String>, LedgerError> {
        Ok(self
            .rows
            .iter()
            .filter(|e| e.key().0 == sync_id)
            .map(|e| e.key().1.clone())
            .collect())
    }
}

#[derive(Default)]
pub struct RecordingDestination {
    pub calls: Mutex<Vec<String>>,
    pub inserted: Mutex<HashMap<String, Entity>>,
}

#[async_trait]
impl DestinationAdapter for RecordingDestination {
    async fn ensure_collection(&self, _collection_id: &str) -> Result<(), DestinationError> {
        Ok(())
    }

    async fn bulk_insert(&self, entities: &[Entity]) -> Result<(), DestinationError> {
        let mut calls = self.calls.lock().unwrap();
        let mut inserted = self.inserted.lock().unwrap();
        for e in entities {
            calls.push(format!("insert:{}", e.entity_id));
            inserted.insert(e.entity_id.clone(), e.clone());
        }
        Ok(())
    }

    async fn bulk_delete(&self, entity_ids: &[String], _sync_id: &str) -> Result<(), DestinationError> {
        let mut calls = self.calls.lock().unwrap();
        let mut inserted = self.inserted.lock().unwrap();
        for id in entity_ids {
            calls.push(format!("delete:{id}"));
            inserted.remove(id);
        }
        Ok(())
    }

    async fn bulk_delete_by_parent_id(&self, parent_id: &str, _sync_id: &str) -> Result<(), DestinationError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(format!("delete_by_parent:{parent_id}"));
        let mut inserted = self.inserted.lock().unwrap();
        inserted.retain(|_, e| e.parent_entity_id.as_deref() != Some(parent_id));
        Ok(())
    }
}

pub struct StubEmbeddingModel {
    dims: usize,
}

impl StubEmbeddingModel {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingModel for StubEmbeddingModel {
    fn model_name(&self) -> &str {
        "stub"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| {
            if t.is_empty() {
                vec![0.0; self.dims]
            } else {
                let mut v = vec![0.0; self.dims];
                v[0] = t.len() as f32;
                v
            }
        }).collect())
    }
}

#[derive(Default)]
pub struct StubSource;

#[async_trait]
impl SourceAdapter for StubSource {
    fn short_name(&self) -> &str {
        "stub"
    }

    async fn generate_entities(&self) -> EntityStream {
        Box::pin(tokio_stream::empty())
    }

    async fn validate(&self) -> Result<bool, SourceError> {
        Ok(true)
    }
}
