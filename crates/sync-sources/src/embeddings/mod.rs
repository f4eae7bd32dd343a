//! §4.C Embedding Model implementations, plus run-time model selection.

pub mod local;
pub mod remote;

use std::sync::Arc;

use sync_api::traits::EmbeddingModel;

use local::DeterministicLocalEmbeddingModel;
use remote::RemoteApiEmbeddingModel;

/// §4.C "Model selection is a run-time property of the context (e.g. a
/// remote API when an API key is configured, a local model otherwise)".
///
/// Grounded on the Token Manager / oauth module's pattern of choosing a
/// strategy from what credentials are present rather than from a
/// compile-time feature flag.
pub fn select_embedding_model(api_key: Option<&str>) -> Arc<dyn EmbeddingModel> {
    match api_key {
        Some(key) if !key.is_empty() => Arc::new(RemoteApiEmbeddingModel::new(key.to_string())),
        _ => Arc::new(DeterministicLocalEmbeddingModel::default()),
    }
}
