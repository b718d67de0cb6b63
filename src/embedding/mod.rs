//! Embedding backends used to vectorize chunks and questions.
//!
//! Two providers are available: the Ollama `/api/embed` endpoint and a deterministic hashed
//! bag-of-words encoder that needs no network access. The hashed provider is what tests and
//! offline runs use.

use crate::config::{EmbeddingConfig, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider could not be reached or answered with a server error; worth retrying.
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),
    /// Provider response could not be parsed.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient {
    /// Identifier of the model producing the vectors, recorded alongside persisted indices.
    fn model_name(&self) -> &str;

    /// Produce an embedding vector for each supplied chunk of text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Shared handle to an embedding backend.
pub type SharedEmbeddingClient = Arc<dyn EmbeddingClient + Send + Sync>;

/// Build the embedding client selected by configuration.
pub fn build_embedding_client(config: &EmbeddingConfig) -> SharedEmbeddingClient {
    match config.provider {
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbeddingClient::new(
            config.base_url.clone(),
            config.model.clone(),
            config.timeout(),
        )),
        EmbeddingProvider::Hashed => Arc::new(HashedEmbeddingClient::new(config.dimension)),
    }
}

/// Client for the Ollama `/api/embed` endpoint.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingClient {
    /// Create a client for `model` served at `base_url`.
    pub fn new(base_url: String, model: String, timeout: Duration) -> Self {
        let http = Client::builder()
            .user_agent("pdf-rag/embed")
            .timeout(timeout)
            .build()
            .unwrap_or_else(|error| {
                tracing::warn!(error = %error, "Falling back to default HTTP client for embeddings");
                Client::new()
            });
        Self {
            http,
            base_url,
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let expected = texts.len();
        tracing::debug!(model = %self.model, count = expected, "Requesting embeddings");

        let response = self
            .http
            .post(self.endpoint())
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::Unavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = format!("Ollama returned {status}: {body}");
            return Err(if status.is_server_error() {
                EmbeddingClientError::Unavailable(message)
            } else {
                EmbeddingClientError::GenerationFailed(message)
            });
        }

        let body: OllamaEmbedResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode Ollama embed response: {error}"
            ))
        })?;

        if body.embeddings.len() != expected {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {expected} embeddings, received {}",
                body.embeddings.len()
            )));
        }

        Ok(body.embeddings)
    }
}

/// Deterministic feature-hashing encoder.
///
/// Each lowercase alphanumeric word is hashed into one of `dimension` slots and the resulting
/// counts are L2-normalized, so texts sharing vocabulary score higher under cosine similarity.
pub struct HashedEmbeddingClient {
    dimension: usize,
    model: String,
}

impl HashedEmbeddingClient {
    /// Create an encoder producing `dimension`-wide vectors.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model: format!("hashed-{dimension}"),
        }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let mut slot_bytes = [0_u8; 8];
            slot_bytes.copy_from_slice(&digest[..8]);
            let slot = (u64::from_le_bytes(slot_bytes) % self.dimension as u64) as usize;
            embedding[slot] += 1.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashedEmbeddingClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }
}
