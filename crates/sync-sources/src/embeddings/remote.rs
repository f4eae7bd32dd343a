//! An OpenAI-style remote embedding API client (§4.C "a remote API when an
//! API key is configured").
//!
//! Grounded on `TodoistClient`'s fixed-timeout `reqwest::Client`
//! construction and bearer-token header setup in the retrieval pack,
//! adapted to a single batched embeddings endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use sync_api::error::EmbeddingError;
use sync_api::traits::EmbeddingModel;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MODEL_NAME: &str = "remote-api-embedding-v1";
const DIMENSIONS: usize = 1536;

pub struct RemoteApiEmbeddingModel {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl RemoteApiEmbeddingModel {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client config is static and valid");
        Self { base_url, api_key, client }
    }
}

#[async_trait]
impl EmbeddingModel for RemoteApiEmbeddingModel {
    fn model_name(&self) -> &str {
        MODEL_NAME
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len()))]
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // §4.C "empty strings in a batch are preserved positionally as zero
        // vectors" — most embedding APIs reject an empty input string, so
        // those positions are substituted with a placeholder before the
        // call and zeroed back out afterward rather than sent upstream.
        let placeholder = " ";
        let sanitized: Vec<&str> =
            texts.iter().map(|t| if t.is_empty() { placeholder } else { t.as_str() }).collect();

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": "text-embedding-3-small", "input": sanitized }))
            .send()
            .await
            .map_err(|e| EmbeddingError::Transport(Box::new(e)))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiError(body));
        }

        let parsed: EmbeddingsResponse =
            response.json().await.map_err(|e| EmbeddingError::Transport(Box::new(e)))?;

        let mut vectors = vec![Vec::new(); texts.len()];
        for datum in parsed.data {
            if datum.index < vectors.len() {
                vectors[datum.index] = datum.embedding;
            }
        }
        for (i, text) in texts.iter().enumerate() {
            if text.is_empty() {
                vectors[i] = vec![0.0; DIMENSIONS];
            }
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_metadata_matches_the_configured_dimensions() {
        let model = RemoteApiEmbeddingModel::new("sk-test".to_string());
        assert_eq!(model.model_name(), MODEL_NAME);
        assert_eq!(model.dimensions(), DIMENSIONS);
    }

    #[tokio::test]
    async fn empty_batch_short_circuits_without_a_network_call() {
        let model = RemoteApiEmbeddingModel::new("sk-test".to_string());
        assert_eq!(model.embed_many(&[]).await.unwrap(), Vec::<Vec<f32>>::new());
    }
}
