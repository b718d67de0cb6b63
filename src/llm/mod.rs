//! Chat-completion client for a locally hosted Ollama server.
//!
//! Transport failures and 5xx responses are retried with exponential backoff; 4xx responses
//! fail immediately with the server's body so configuration mistakes (unknown model, bad
//! request) are visible to the caller.

use crate::config::LlmConfig;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by chat-completion backends.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Every attempt failed with a transport error or server-side status.
    #[error("LLM backend unavailable: {0}")]
    BackendUnavailable(String),
    /// Backend rejected the request; not retried.
    #[error("LLM backend rejected request ({status}): {body}")]
    BackendRequest {
        /// HTTP status returned by the backend.
        status: StatusCode,
        /// Raw response body.
        body: String,
    },
    /// Backend answered with a payload that could not be decoded.
    #[error("Malformed LLM response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by chat-completion backends.
#[async_trait]
pub trait ChatClient {
    /// Send one user prompt, optionally preceded by a system instruction, and return the reply.
    async fn chat(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
    ) -> Result<String, LlmError>;
}

/// Shared handle to a chat backend.
pub type SharedChatClient = Arc<dyn ChatClient + Send + Sync>;

/// Ollama `/api/chat` client with retry and backoff.
pub struct OllamaChatClient {
    http: Client,
    base_url: String,
    model: String,
    retries: u32,
    backoff: Duration,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}

enum AttemptError {
    Retryable(String),
    Fatal(LlmError),
}

impl OllamaChatClient {
    /// Build a client from the resolved LLM configuration.
    pub fn new(config: &LlmConfig) -> Self {
        let http = Client::builder()
            .user_agent("pdf-rag/chat")
            .timeout(config.timeout())
            .build()
            .unwrap_or_else(|error| {
                tracing::warn!(error = %error, "Falling back to default HTTP client for chat");
                Client::new()
            });
        Self {
            http,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            retries: config.retries,
            backoff: config.backoff(),
        }
    }

    /// Model identifier sent with every request.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }

    fn payload(&self, prompt: &str, system: Option<&str>, temperature: f32) -> Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": { "temperature": temperature },
        })
    }

    async fn attempt(&self, payload: &Value) -> Result<String, AttemptError> {
        let response = self
            .http
            .post(self.endpoint())
            .json(payload)
            .send()
            .await
            .map_err(|error| {
                AttemptError::Retryable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Retryable(format!(
                "Ollama returned {status}: {body}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Fatal(LlmError::BackendRequest { status, body }));
        }

        let body = response
            .bytes()
            .await
            .map_err(|error| AttemptError::Retryable(format!("failed to read body: {error}")))?;
        let parsed: OllamaChatResponse = serde_json::from_slice(&body).map_err(|error| {
            AttemptError::Fatal(LlmError::InvalidResponse(format!(
                "failed to decode Ollama chat response: {error}"
            )))
        })?;

        Ok(parsed.message.content.trim().to_string())
    }
}

#[async_trait]
impl ChatClient for OllamaChatClient {
    async fn chat(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let payload = self.payload(prompt, system, temperature);
        let mut attempt = 0_u32;

        loop {
            match self.attempt(&payload).await {
                Ok(content) => {
                    tracing::debug!(model = %self.model, attempt, chars = content.len(), "Chat completed");
                    return Ok(content);
                }
                Err(AttemptError::Fatal(error)) => {
                    tracing::warn!(model = %self.model, error = %error, "Chat request failed");
                    return Err(error);
                }
                Err(AttemptError::Retryable(message)) if attempt < self.retries => {
                    let delay = self.backoff * 2_u32.saturating_pow(attempt);
                    tracing::warn!(
                        model = %self.model,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Chat request failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(AttemptError::Retryable(message)) => {
                    tracing::error!(
                        model = %self.model,
                        attempts = attempt + 1,
                        error = %message,
                        "Chat retries exhausted"
                    );
                    return Err(LlmError::BackendUnavailable(message));
                }
            }
        }
    }
}
