//! Document pipeline: staged processing plus question answering and on-demand summaries.
//!
//! `process` runs a fixed sequence of stages for one document, persisting a status record at
//! every transition so that a reader polling `status` sees progress. Artifacts written by
//! completed stages stay usable when a later stage fails.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::embedding::SharedEmbeddingClient;
use crate::extract::{ExtractError, PageExtractor};
use crate::index::{IndexError, IndexManager, IndexOrigin};
use crate::llm::SharedChatClient;
use crate::media::{SpeechRenderer, VideoRenderer};
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::processing::chunking::{ChunkProfile, chunk_pages};
use crate::processing::sanitize::{normalize_whitespace, to_speech_text};
use crate::processing::tokens::build_token_counter;
use crate::processing::types::{ChunkingError, PageText, SummaryMode};
use crate::rag::{Answer, GroundedAnswerer, retrieve};
use crate::storage::{
    DocumentMeta, DocumentRepository, DocumentState, InvalidDocumentId, ProcessingStatus,
    StorageError, validate_document_id,
};
use crate::summarize::MapReduceSummarizer;

/// Errors surfaced by pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No metadata exists for the document.
    #[error("Unknown document '{0}'")]
    UnknownDocument(String),
    /// Document exists but has no persisted index yet.
    #[error("Index not found for document '{0}'; it may still be processing")]
    IndexNotFound(String),
    /// Document has no stored pages to summarize.
    #[error("No pages stored for document '{0}'")]
    NoPages(String),
    /// Document id is not a plain directory name.
    #[error(transparent)]
    InvalidDocumentId(#[from] InvalidDocumentId),
    /// Page extraction failed.
    #[error(transparent)]
    Extract(#[from] ExtractError),
    /// Artifact storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Index build or load failed.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Chunking configuration was invalid.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
}

/// Processing stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Extract page text (with OCR backfill when configured).
    ExtractPages,
    /// Chunk pages and build or reuse the vector index.
    BuildIndex,
    /// Generate the detailed summary, reusing a cached one.
    Summarize,
    /// Narrate the summary.
    Audio,
    /// Render the summary video.
    Video,
}

impl Stage {
    /// Every stage in execution order.
    pub const ALL: [Stage; 5] = [
        Stage::ExtractPages,
        Stage::BuildIndex,
        Stage::Summarize,
        Stage::Audio,
        Stage::Video,
    ];

    /// Status record written when the stage starts.
    pub fn status(self) -> ProcessingStatus {
        let (state, step) = match self {
            Stage::ExtractPages => (DocumentState::Processing, "extracting_pages"),
            Stage::BuildIndex => (DocumentState::Processing, "building_index"),
            Stage::Summarize => (DocumentState::Summarizing, "generating_summary"),
            Stage::Audio => (DocumentState::Tts, "generating_audio"),
            Stage::Video => (DocumentState::Video, "generating_video"),
        };
        ProcessingStatus::in_progress(state, step)
    }
}

/// Coordinates extraction, indexing, answering, summarization, and narration for documents.
///
/// Construct once and share through an `Arc`; distinct documents may be processed
/// concurrently, but callers must not run `process` twice for the same document at once.
pub struct DocumentPipeline {
    repository: Arc<dyn DocumentRepository + Send + Sync>,
    extractor: Arc<dyn PageExtractor + Send + Sync>,
    embedder: SharedEmbeddingClient,
    index_manager: IndexManager,
    answerer: GroundedAnswerer,
    summarizer: MapReduceSummarizer,
    index_profile: ChunkProfile,
    top_k: usize,
    speech: Option<Arc<dyn SpeechRenderer + Send + Sync>>,
    video: Option<Arc<dyn VideoRenderer + Send + Sync>>,
    metrics: Arc<PipelineMetrics>,
}

impl DocumentPipeline {
    /// Assemble a pipeline from resolved configuration and backend handles.
    pub fn new(
        config: &Config,
        repository: Arc<dyn DocumentRepository + Send + Sync>,
        extractor: Arc<dyn PageExtractor + Send + Sync>,
        chat: SharedChatClient,
        embedder: SharedEmbeddingClient,
    ) -> Self {
        let token_counter = build_token_counter(&config.llm.model);
        let answerer = GroundedAnswerer::new(
            chat.clone(),
            token_counter,
            config.retrieval.context_token_budget,
        )
        .with_max_citations(config.retrieval.max_citations);

        Self {
            repository,
            extractor,
            index_manager: IndexManager::new(embedder.clone(), config.storage.indices_dir()),
            embedder,
            answerer,
            summarizer: MapReduceSummarizer::new(chat, config.chunking.summary),
            index_profile: config.chunking.index,
            top_k: config.retrieval.top_k,
            speech: None,
            video: None,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Enable the audio stage.
    pub fn with_speech(mut self, renderer: Arc<dyn SpeechRenderer + Send + Sync>) -> Self {
        self.speech = Some(renderer);
        self
    }

    /// Enable the video stage.
    pub fn with_video(mut self, renderer: Arc<dyn VideoRenderer + Send + Sync>) -> Self {
        self.video = Some(renderer);
        self
    }

    /// Override the index build retry policy.
    pub fn with_index_retry_policy(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.index_manager = self.index_manager.with_retry_policy(max_attempts, backoff);
        self
    }

    /// Current activity counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Run every stage for `doc_id`, reading pages from `source`.
    ///
    /// On failure the status record is set to `error` with the message and the error is
    /// returned.
    pub async fn process(
        &self,
        doc_id: &str,
        source: &Path,
        filename: Option<String>,
    ) -> Result<ProcessingStatus, PipelineError> {
        validate_document_id(doc_id)?;
        tracing::info!(doc_id, source = %source.display(), "Processing document");
        match self.run_stages(doc_id, source, filename).await {
            Ok(status) => {
                tracing::info!(
                    doc_id,
                    has_audio = status.has_audio,
                    has_video = status.has_video,
                    "Document ready"
                );
                Ok(status)
            }
            Err(error) => {
                tracing::error!(doc_id, error = %error, "Document processing failed");
                if let Err(status_error) = self
                    .repository
                    .save_status(doc_id, &ProcessingStatus::failed(error.to_string()))
                    .await
                {
                    tracing::warn!(doc_id, error = %status_error, "Failed to record error status");
                }
                Err(error)
            }
        }
    }

    async fn run_stages(
        &self,
        doc_id: &str,
        source: &Path,
        filename: Option<String>,
    ) -> Result<ProcessingStatus, PipelineError> {
        let mut pages: Vec<PageText> = Vec::new();
        let mut chunks_indexed = 0_u64;
        let mut summary = String::new();
        let mut audio: Option<PathBuf> = None;
        let mut video: Option<PathBuf> = None;

        for stage in Stage::ALL {
            match stage {
                Stage::ExtractPages => {
                    self.enter(doc_id, stage).await?;
                    pages = self.extract(doc_id, source, filename.clone()).await?;
                }
                Stage::BuildIndex => {
                    self.enter(doc_id, stage).await?;
                    chunks_indexed = self.build_index(doc_id, &pages).await?;
                }
                Stage::Summarize => {
                    self.enter(doc_id, stage).await?;
                    summary = match self
                        .repository
                        .load_summary(doc_id, SummaryMode::Detailed)
                        .await?
                    {
                        Some(cached) => {
                            tracing::debug!(doc_id, "Reusing cached detailed summary");
                            cached
                        }
                        None => {
                            self.generate_summary(doc_id, &pages, SummaryMode::Detailed)
                                .await?
                        }
                    };
                }
                Stage::Audio => {
                    if let Some(renderer) = &self.speech {
                        self.enter(doc_id, stage).await?;
                        let out_dir = self.repository.artifact_dir(doc_id).await?;
                        audio = renderer
                            .render(&to_speech_text(&summary), &out_dir)
                            .await
                            .unwrap_or_else(|error| {
                                tracing::warn!(doc_id, error = %error, "Audio generation failed");
                                None
                            });
                    }
                }
                Stage::Video => {
                    if let Some(renderer) = &self.video {
                        self.enter(doc_id, stage).await?;
                        let out_dir = self.repository.artifact_dir(doc_id).await?;
                        video = renderer
                            .render(&summary, audio.as_deref(), &out_dir)
                            .await
                            .unwrap_or_else(|error| {
                                tracing::warn!(doc_id, error = %error, "Video generation failed");
                                None
                            });
                    }
                }
            }
        }

        let status = ProcessingStatus::ready(pages.len(), true, audio.is_some(), video.is_some());
        self.repository.save_status(doc_id, &status).await?;
        self.metrics.record_document(chunks_indexed);
        Ok(status)
    }

    async fn enter(&self, doc_id: &str, stage: Stage) -> Result<(), PipelineError> {
        tracing::debug!(doc_id, stage = ?stage, "Entering stage");
        self.repository
            .save_status(doc_id, &stage.status())
            .await
            .map_err(PipelineError::from)
    }

    async fn extract(
        &self,
        doc_id: &str,
        source: &Path,
        filename: Option<String>,
    ) -> Result<Vec<PageText>, PipelineError> {
        let pages: Vec<PageText> = self
            .extractor
            .extract_pages(source)
            .await?
            .into_iter()
            .map(|page| PageText::new(page.page_number, normalize_whitespace(&page.text)))
            .collect();

        self.repository.save_pages(doc_id, &pages).await?;
        self.repository
            .save_meta(doc_id, &DocumentMeta::new(doc_id, filename, pages.len()))
            .await?;
        tracing::info!(doc_id, pages = pages.len(), "Pages extracted");
        Ok(pages)
    }

    /// Returns the number of chunks embedded, zero when an index was reused.
    async fn build_index(&self, doc_id: &str, pages: &[PageText]) -> Result<u64, PipelineError> {
        let chunks = chunk_pages(doc_id, pages, self.index_profile)?;
        let chunk_count = chunks.len();
        tracing::debug!(doc_id, chunks = chunk_count, "Chunked pages for indexing");

        let (index, origin) = self.index_manager.build_or_load(doc_id, chunks).await?;
        match origin {
            IndexOrigin::Loaded => {
                self.metrics.record_index_reuse();
                Ok(0)
            }
            IndexOrigin::Built => Ok(index.len() as u64),
        }
    }

    async fn generate_summary(
        &self,
        doc_id: &str,
        pages: &[PageText],
        mode: SummaryMode,
    ) -> Result<String, PipelineError> {
        let full_text = pages
            .iter()
            .map(|page| page.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let summary = self.summarizer.summarize(&full_text, mode).await?;
        self.repository.save_summary(doc_id, mode, &summary).await?;
        self.metrics.record_summary();
        tracing::info!(doc_id, mode = %mode, chars = summary.len(), "Summary generated");
        Ok(summary)
    }

    /// Answer `question` from the persisted index of `doc_id`.
    pub async fn ask(&self, doc_id: &str, question: &str) -> Result<Answer, PipelineError> {
        validate_document_id(doc_id)?;
        if self.repository.load_meta(doc_id).await?.is_none() {
            return Err(PipelineError::UnknownDocument(doc_id.to_string()));
        }
        let index = self
            .index_manager
            .load(doc_id)
            .await?
            .ok_or_else(|| PipelineError::IndexNotFound(doc_id.to_string()))?;

        let evidence = retrieve(self.embedder.as_ref(), &index, question, self.top_k).await;
        let answer = self.answerer.answer(question, &evidence).await;
        self.metrics.record_question();
        tracing::info!(
            doc_id,
            evidence = evidence.len(),
            citations = answer.citations.len(),
            "Question answered"
        );
        Ok(answer)
    }

    /// Return the summary for `mode`, generating and caching it on first request.
    ///
    /// The status record is left untouched; it describes the last `process` run.
    pub async fn summary(&self, doc_id: &str, mode: SummaryMode) -> Result<String, PipelineError> {
        validate_document_id(doc_id)?;
        if self.repository.load_meta(doc_id).await?.is_none() {
            return Err(PipelineError::UnknownDocument(doc_id.to_string()));
        }
        if let Some(cached) = self.repository.load_summary(doc_id, mode).await? {
            tracing::debug!(doc_id, mode = %mode, "Serving cached summary");
            return Ok(cached);
        }

        let pages = self
            .repository
            .load_pages(doc_id)
            .await?
            .filter(|pages| !pages.is_empty())
            .ok_or_else(|| PipelineError::NoPages(doc_id.to_string()))?;
        self.generate_summary(doc_id, &pages, mode).await
    }

    /// Latest processing status of `doc_id`.
    pub async fn status(&self, doc_id: &str) -> Result<ProcessingStatus, PipelineError> {
        validate_document_id(doc_id)?;
        self.repository
            .load_status(doc_id)
            .await?
            .ok_or_else(|| PipelineError::UnknownDocument(doc_id.to_string()))
    }
}
