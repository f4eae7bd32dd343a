//! The entity model (§3 DATA MODEL).
//!
//! An [`Entity`] is the unit of sync accounting. Domain fields are an open,
//! source-defined bag (see [`crate::value::Value`]); the fields that
//! participate in identity, routing, and persistence are named explicitly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::value::Value;

/// One ancestor in an entity's breadcrumb trail (§3).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BreadcrumbEntry {
    pub id: String,
    pub name: String,
    pub entity_type: String,
}

/// Run-scoped stamping applied during ENRICH (§4.G). Excluded from the
/// content hash in its entirety.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct SystemMetadata {
    pub sync_id: Option<String>,
    pub sync_job_id: Option<String>,
    pub source_name: Option<String>,
    pub local_path: Option<String>,
    pub total_size: Option<u64>,
    pub checksum: Option<String>,
    pub should_skip: bool,
    pub white_label_id: Option<String>,
    pub white_label_name: Option<String>,
}

/// The unit of sync. See §3 for field semantics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: String,
    pub entity_type: String,
    pub fields: BTreeMap<String, Value>,
    pub parent_entity_id: Option<String>,
    pub breadcrumbs: Vec<BreadcrumbEntry>,
    pub system_metadata: SystemMetadata,

    /// Cached content hash (§3 "the hash is cached on the in-memory entity
    /// object to avoid recomputation"). Never serialized as part of the
    /// content-bearing projection; invalidated whenever `fields` changes
    /// through [`Entity::set_field`].
    #[serde(skip)]
    cached_hash: Option<String>,

    /// Dense embedding, attached during EMBED. Excluded from the hash.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,

    /// Optional sparse companion vector (§4.C). Excluded from the hash.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse_vector: Option<BTreeMap<u32, f32>>,

    /// Populated once persisted (§4.G PERSIST_*); not content-bearing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_entity_id: Option<String>,

    /// Specialization payload for file entities (§3 "File entity").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileAttributes>,
}

/// Additional attributes carried only by file entities (§3).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FileAttributes {
    pub download_url: Option<String>,
    pub mime_type: Option<String>,
    pub local_path: Option<String>,
    pub size: Option<u64>,
    pub modified_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Fields excluded from the content hash (§3): run-scoped IDs, vectors,
/// system metadata, observation timestamps, and derived text. Kept as a
/// named, versioned constant per §9 "Hash exclusion set" — changing it
/// invalidates every ledger row in the system.
pub const HASH_EXCLUDED_FIELDS: &[&str] = &[
    "sync_id",
    "sync_job_id",
    "sync_metadata",
    "vector",
    "embedding",
    "observed_at",
    "created_at",
    "updated_at",
    "airweave_system_metadata",
];

impl Entity {
    pub fn new(entity_id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_type: entity_type.into(),
            fields: BTreeMap::new(),
            parent_entity_id: None,
            breadcrumbs: Vec::new(),
            system_metadata: SystemMetadata::default(),
            cached_hash: None,
            vector: None,
            sparse_vector: None,
            db_entity_id: None,
            file: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self.cached_hash = None;
        self
    }

    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
        self.cached_hash = None;
    }

    /// Compute (and cache) the content hash (§3 "Content hash").
    ///
    /// Only `fields`, `entity_id`, `entity_type`, `parent_entity_id`, and
    /// `breadcrumbs` participate. For file entities, a stable metadata
    /// subset (name, mime, size, modified-time, parents) is folded in so
    /// renames and moves are detected even when bytes are unchanged.
    pub fn hash(&mut self) -> String {
        if let Some(h) = &self.cached_hash {
            return h.clone();
        }
        let computed = self.compute_hash();
        self.cached_hash = Some(computed.clone());
        computed
    }

    /// Compute the hash without mutating/caching. Used by tests that need
    /// to compare two independent entities without taking `&mut` of both.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.entity_type.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.entity_id.as_bytes());
        hasher.update(b"\0");
        if let Some(parent) = &self.parent_entity_id {
            hasher.update(parent.as_bytes());
        }
        hasher.update(b"\0");

        let filtered: BTreeMap<&String, &Value> = self
            .fields
            .iter()
            .filter(|(k, _)| !HASH_EXCLUDED_FIELDS.contains(&k.as_str()))
            .collect();
        let canonical =
            serde_json::to_vec(&filtered).expect("BTreeMap<&String, &Value> always serializes");
        hasher.update(&canonical);

        for crumb in &self.breadcrumbs {
            hasher.update(crumb.id.as_bytes());
            hasher.update(crumb.entity_type.as_bytes());
        }

        if let Some(file) = &self.file {
            if let Some(mime) = &file.mime_type {
                hasher.update(mime.as_bytes());
            }
            if let Some(size) = file.size {
                hasher.update(size.to_le_bytes());
            }
            if let Some(modified) = file.modified_at {
                hasher.update(modified.timestamp().to_le_bytes());
            }
        }

        hex::encode(hasher.finalize())
    }

    pub fn is_file(&self) -> bool {
        self.file.is_some()
    }

    /// Projection of the entity used as embedding input and as the
    /// vectorization source (§4.G EMBED "a storage-dict projection").
    pub fn to_storage_dict(&self) -> BTreeMap<String, Value> {
        let mut dict = self.fields.clone();
        dict.insert("entity_id".to_string(), Value::String(self.entity_id.clone()));
        dict.insert("entity_type".to_string(), Value::String(self.entity_type.clone()));
        dict
    }
}

/// The action the processor takes for an entity once DETERMINE_ACTION runs
/// (§4.G).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DestinationAction {
    Insert,
    Update,
    Keep,
}
