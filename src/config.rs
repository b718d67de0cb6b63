use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

use crate::processing::chunking::ChunkProfile;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5:7b";
const DEFAULT_TIMEOUT_SECS: f64 = 900.0;
const DEFAULT_BACKOFF_SECS: f64 = 2.0;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the pipeline, fully resolved at construction time.
///
/// Core components receive the section they need; nothing below the binary reads the
/// environment.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Chat model backend settings.
    pub llm: LlmConfig,
    /// Embedding backend settings.
    pub embedding: EmbeddingConfig,
    /// Chunk profiles for indexing and summarization.
    pub chunking: ChunkingConfig,
    /// Retrieval and answer composition settings.
    pub retrieval: RetrievalConfig,
    /// On-disk layout for document artifacts and indices.
    pub storage: StorageConfig,
    /// Page extraction behavior.
    pub extraction: ExtractionConfig,
}

/// Connection and retry settings for the Ollama chat endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the Ollama server.
    pub base_url: String,
    /// Chat model identifier.
    pub model: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: f64,
    /// Additional attempts after the first failed request.
    pub retries: u32,
    /// Base delay in seconds for exponential backoff.
    pub backoff_secs: f64,
}

impl LlmConfig {
    /// Request timeout; out-of-range values fall back to the default.
    pub fn timeout(&self) -> Duration {
        seconds_to_duration(self.timeout_secs, DEFAULT_TIMEOUT_SECS)
    }

    /// Base retry delay; out-of-range values fall back to the default.
    pub fn backoff(&self) -> Duration {
        seconds_to_duration(self.backoff_secs, DEFAULT_BACKOFF_SECS)
    }
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime (`/api/embed`).
    Ollama,
    /// Deterministic hashed bag-of-words vectors computed in process.
    Hashed,
}

/// Embedding backend settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend used to produce vectors.
    pub provider: EmbeddingProvider,
    /// Base URL of the embedding server.
    pub base_url: String,
    /// Embedding model identifier.
    pub model: String,
    /// Vector width for the hashed provider.
    pub dimension: usize,
    /// Per-request timeout in seconds.
    pub timeout_secs: f64,
}

impl EmbeddingConfig {
    /// Request timeout; out-of-range values fall back to the default.
    pub fn timeout(&self) -> Duration {
        seconds_to_duration(self.timeout_secs, DEFAULT_TIMEOUT_SECS)
    }
}

/// Chunk size/overlap pairs used by the two chunking consumers.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChunkingConfig {
    /// Profile applied to page text before indexing.
    pub index: ChunkProfile,
    /// Base profile applied to full text before summarization.
    pub summary: ChunkProfile,
}

/// Retrieval and grounded answering settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    /// Number of evidence items retrieved per question.
    pub top_k: usize,
    /// Optional cap on the number of citations per answer.
    pub max_citations: Option<usize>,
    /// Token budget for the evidence block of the answer prompt.
    pub context_token_budget: usize,
}

/// Filesystem roots for persisted artifacts.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding `docs/` and `indices/`.
    pub data_dir: PathBuf,
}

impl StorageConfig {
    /// Directory containing one sub-directory per document.
    pub fn docs_dir(&self) -> PathBuf {
        self.data_dir.join("docs")
    }

    /// Directory containing one persisted index per document.
    pub fn indices_dir(&self) -> PathBuf {
        self.data_dir.join("indices")
    }
}

/// Page extraction behavior.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ExtractionConfig {
    /// Run OCR on pages whose extracted text is empty.
    pub ocr_empty_pages: bool,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let llm_base_url =
            load_env_optional("OLLAMA_BASE_URL").unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        let llm_model =
            load_env_optional("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string());
        let llm_timeout = parse_seconds("OLLAMA_TIMEOUT_S", DEFAULT_TIMEOUT_SECS, false)?;

        let llm = LlmConfig {
            base_url: llm_base_url.clone(),
            model: llm_model.clone(),
            timeout_secs: llm_timeout,
            retries: parse_env("OLLAMA_RETRIES", 2)?,
            backoff_secs: parse_seconds("OLLAMA_RETRY_BACKOFF_S", DEFAULT_BACKOFF_SECS, true)?,
        };

        let embedding = EmbeddingConfig {
            provider: match load_env_optional("EMBEDDING_PROVIDER") {
                Some(value) => value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))?,
                None => EmbeddingProvider::Ollama,
            },
            base_url: load_env_optional("EMBED_BASE_URL").unwrap_or(llm_base_url),
            model: load_env_optional("EMBED_MODEL").unwrap_or(llm_model),
            dimension: parse_env("EMBEDDING_DIMENSION", 384)?,
            timeout_secs: llm_timeout,
        };

        let chunking = ChunkingConfig {
            index: ChunkProfile::new(
                parse_env("CHUNK_SIZE", 900)?,
                parse_env("CHUNK_OVERLAP", 150)?,
            ),
            summary: ChunkProfile::new(
                parse_env("SUMMARY_CHUNK_SIZE", 1200)?,
                parse_env("SUMMARY_CHUNK_OVERLAP", 200)?,
            ),
        };

        let retrieval = RetrievalConfig {
            top_k: parse_env("TOP_K", 5)?,
            max_citations: load_env_optional("MAX_CITATIONS")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("MAX_CITATIONS".into()))
                })
                .transpose()?,
            context_token_budget: parse_env("ANSWER_CONTEXT_TOKENS", 3000)?,
        };

        let storage = StorageConfig {
            data_dir: load_env_optional("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
        };

        let extraction = ExtractionConfig {
            ocr_empty_pages: parse_bool_env("OCR_EMPTY_PAGES", true)?,
        };

        Ok(Self {
            llm,
            embedding,
            chunking,
            retrieval,
            storage,
            extraction,
        })
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Seconds must fit a `Duration`; zero is accepted only when `allow_zero` is set.
fn parse_seconds(key: &str, default: f64, allow_zero: bool) -> Result<f64, ConfigError> {
    match load_env_optional(key) {
        Some(value) => seconds_from_str(key, &value, allow_zero),
        None => Ok(default),
    }
}

fn seconds_from_str(key: &str, value: &str, allow_zero: bool) -> Result<f64, ConfigError> {
    let seconds: f64 = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))?;
    let representable = Duration::try_from_secs_f64(seconds).is_ok();
    if representable && (allow_zero || seconds > 0.0) {
        Ok(seconds)
    } else {
        Err(ConfigError::InvalidValue(key.to_string()))
    }
}

fn seconds_to_duration(seconds: f64, fallback: f64) -> Duration {
    Duration::try_from_secs_f64(seconds).unwrap_or_else(|_| Duration::from_secs_f64(fallback))
}

fn parse_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    match load_env_optional(key) {
        Some(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        },
        None => Ok(default),
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hashed" => Ok(Self::Hashed),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        llm_url = %config.llm.base_url,
        llm_model = %config.llm.model,
        embedding_provider = ?config.embedding.provider,
        embedding_model = %config.embedding.model,
        data_dir = %config.storage.data_dir.display(),
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}
