//! A dependency-free local embedding model (§4.C "a local model otherwise").
//!
//! Deterministic and offline: useful for local-files-only deployments and
//! for tests that need embedding vectors without a network call. Grounded
//! on `Entity::compute_hash`'s SHA-256-over-bytes technique in
//! `sync-api::entity`, fed through one float per hash byte rather than a
//! learned projection.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use sync_api::error::EmbeddingError;
use sync_api::traits::EmbeddingModel;

const DIMENSIONS: usize = 32;

pub struct DeterministicLocalEmbeddingModel;

impl Default for DeterministicLocalEmbeddingModel {
    fn default() -> Self {
        Self
    }
}

impl DeterministicLocalEmbeddingModel {
    /// Repeats a SHA-256 digest of `text` to fill `DIMENSIONS` floats in
    /// [-1, 1], normalizing to unit length so cosine similarity behaves
    /// sensibly against a real vector-store backend.
    fn embed_one(text: &str) -> Vec<f32> {
        if text.is_empty() {
            return vec![0.0; DIMENSIONS];
        }
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();

        let mut vector: Vec<f32> = (0..DIMENSIONS)
            .map(|i| {
                let byte = digest[i % digest.len()];
                (byte as f32 / 255.0) * 2.0 - 1.0
            })
            .collect();

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingModel for DeterministicLocalEmbeddingModel {
    fn model_name(&self) -> &str {
        "deterministic-local-embedding-v1"
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| Self::embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_batch_yields_empty_vector_list() {
        let model = DeterministicLocalEmbeddingModel::default();
        assert_eq!(model.embed_many(&[]).await.unwrap(), Vec::<Vec<f32>>::new());
    }

    #[tokio::test]
    async fn empty_strings_are_preserved_positionally_as_zero_vectors() {
        let model = DeterministicLocalEmbeddingModel::default();
        let out = model.embed_many(&["hello".to_string(), "".to_string()]).await.unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[1].iter().all(|v| *v == 0.0));
        assert!(out[0].iter().any(|v| *v != 0.0));
    }

    #[tokio::test]
    async fn same_text_always_embeds_to_the_same_vector() {
        let model = DeterministicLocalEmbeddingModel::default();
        let a = model.embed("repeat this").await.unwrap();
        let b = model.embed("repeat this").await.unwrap();
        assert_eq!(a, b);
    }
}
