use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pdf_rag::{
    config::{
        ChunkingConfig, Config, EmbeddingConfig, EmbeddingProvider, ExtractionConfig, LlmConfig,
        RetrievalConfig, StorageConfig,
    },
    embedding::{EmbeddingClient, EmbeddingClientError, HashedEmbeddingClient},
    extract::{ExtractError, PageExtractor, PagesFileExtractor},
    index::INDEX_FILE,
    llm::{ChatClient, LlmError},
    media::{RenderError, SpeechRenderer, VideoRenderer},
    pipeline::{DocumentPipeline, PipelineError},
    processing::{ChunkProfile, PageText, SummaryMode, sanitize::to_speech_text},
    rag::NOT_FOUND_ANSWER,
    storage::{
        DocumentRepository, DocumentState, FsDocumentStore, InvalidDocumentId, MemoryDocumentStore,
    },
};
use tempfile::TempDir;

/// Records prompts and replies with a fixed answer.
#[derive(Default)]
struct StubChat {
    prompts: Mutex<Vec<String>>,
}

impl StubChat {
    fn calls(&self) -> usize {
        self.prompts.lock().expect("lock").len()
    }
}

#[async_trait]
impl ChatClient for StubChat {
    async fn chat(
        &self,
        prompt: &str,
        _system: Option<&str>,
        _temperature: f32,
    ) -> Result<String, LlmError> {
        self.prompts.lock().expect("lock").push(prompt.to_string());
        Ok("Alpha is described on the first page [p1:c0].".into())
    }
}

/// Hashed embeddings with a call counter.
struct CountingEmbedder {
    inner: HashedEmbeddingClient,
    calls: Mutex<usize>,
}

impl CountingEmbedder {
    fn new() -> Self {
        Self {
            inner: HashedEmbeddingClient::new(4096),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().expect("lock")
    }
}

#[async_trait]
impl EmbeddingClient for CountingEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        *self.calls.lock().expect("lock") += 1;
        self.inner.generate_embeddings(texts).await
    }
}

struct FailingExtractor;

#[async_trait]
impl PageExtractor for FailingExtractor {
    async fn extract_pages(&self, source: &Path) -> Result<Vec<PageText>, ExtractError> {
        Err(ExtractError::Io {
            path: source.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        })
    }
}

struct FileSpeech;

#[async_trait]
impl SpeechRenderer for FileSpeech {
    async fn render(&self, summary: &str, out_dir: &Path) -> Result<Option<PathBuf>, RenderError> {
        let path = out_dir.join("audio.txt");
        std::fs::write(&path, summary).map_err(|error| RenderError::new("file", error.to_string()))?;
        Ok(Some(path))
    }
}

struct BrokenVideo;

#[async_trait]
impl VideoRenderer for BrokenVideo {
    async fn render(
        &self,
        _summary: &str,
        audio: Option<&Path>,
        _out_dir: &Path,
    ) -> Result<Option<PathBuf>, RenderError> {
        assert!(audio.is_some(), "video stage should receive the narration");
        Err(RenderError::new("ffmpeg", "not installed"))
    }
}

fn test_config(data_dir: &Path) -> Config {
    Config {
        llm: LlmConfig {
            base_url: "http://127.0.0.1:9".into(),
            model: "qwen2.5:7b".into(),
            timeout_secs: 1.0,
            retries: 0,
            backoff_secs: 0.0,
        },
        embedding: EmbeddingConfig {
            provider: EmbeddingProvider::Hashed,
            base_url: "http://127.0.0.1:9".into(),
            model: "hashed".into(),
            dimension: 4096,
            timeout_secs: 1.0,
        },
        chunking: ChunkingConfig {
            index: ChunkProfile::new(900, 150),
            summary: ChunkProfile::new(1200, 200),
        },
        retrieval: RetrievalConfig {
            top_k: 5,
            max_citations: None,
            context_token_budget: 3000,
        },
        storage: StorageConfig {
            data_dir: data_dir.to_path_buf(),
        },
        extraction: ExtractionConfig {
            ocr_empty_pages: false,
        },
    }
}

fn write_pages(dir: &Path, pages: &[&str]) -> PathBuf {
    let path = dir.join("pages.json");
    let body = serde_json::json!({ "pages": pages });
    std::fs::write(&path, body.to_string()).expect("write pages");
    path
}

struct Harness {
    _dir: TempDir,
    data_dir: PathBuf,
    source: PathBuf,
    chat: Arc<StubChat>,
    embedder: Arc<CountingEmbedder>,
    repository: Arc<FsDocumentStore>,
}

impl Harness {
    fn new(pages: &[&str]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = dir.path().join("data");
        let source = write_pages(dir.path(), pages);
        Self {
            repository: Arc::new(FsDocumentStore::new(data_dir.join("docs"))),
            data_dir,
            source,
            chat: Arc::new(StubChat::default()),
            embedder: Arc::new(CountingEmbedder::new()),
            _dir: dir,
        }
    }

    fn pipeline(&self) -> DocumentPipeline {
        DocumentPipeline::new(
            &test_config(&self.data_dir),
            self.repository.clone(),
            Arc::new(PagesFileExtractor::new()),
            self.chat.clone(),
            self.embedder.clone(),
        )
    }
}

#[tokio::test]
async fn end_to_end_answer_cites_first_page() {
    let harness = Harness::new(&["Alpha stuff.", "", "Beta stuff."]);
    let pipeline = harness.pipeline();

    let status = pipeline
        .process("doc-1", &harness.source, Some("sample.pdf".into()))
        .await
        .expect("process");
    assert_eq!(status.state, DocumentState::Ready);
    assert_eq!(status.num_pages, Some(3));
    assert!(status.has_summary);
    assert!(!status.has_audio);

    let index_dir = harness.data_dir.join("indices").join("doc-1");
    let raw = std::fs::read_to_string(index_dir.join(INDEX_FILE)).expect("index file");
    let index: serde_json::Value = serde_json::from_str(&raw).expect("index json");
    assert_eq!(index["entries"].as_array().map(Vec::len), Some(2));

    let answer = pipeline.ask("doc-1", "What is Alpha?").await.expect("answer");
    assert_eq!(answer.citations.first().map(String::as_str), Some("p1:c0"));
    assert!(answer.citations.contains(&"p3:c0".to_string()));
    assert_eq!(answer.text, "Alpha is described on the first page [p1:c0].");

    let snapshot = pipeline.metrics_snapshot();
    assert_eq!(snapshot.documents_processed, 1);
    assert_eq!(snapshot.chunks_indexed, 2);
    assert_eq!(snapshot.questions_answered, 1);
}

#[tokio::test]
async fn reprocessing_reuses_the_persisted_index() {
    let harness = Harness::new(&["Alpha stuff.", "Beta stuff."]);
    let pipeline = harness.pipeline();

    pipeline
        .process("doc-1", &harness.source, None)
        .await
        .expect("first run");
    let embeds_after_first = harness.embedder.calls();
    let chats_after_first = harness.chat.calls();
    pipeline
        .process("doc-1", &harness.source, None)
        .await
        .expect("second run");

    assert_eq!(harness.embedder.calls(), embeds_after_first);
    assert_eq!(harness.chat.calls(), chats_after_first);
    let snapshot = pipeline.metrics_snapshot();
    assert_eq!(snapshot.indexes_reused, 1);
    assert_eq!(snapshot.summaries_generated, 1);
}

#[tokio::test]
async fn status_reports_every_stage_outcome() {
    let harness = Harness::new(&["Alpha stuff."]);
    let pipeline = harness
        .pipeline()
        .with_speech(Arc::new(FileSpeech))
        .with_video(Arc::new(BrokenVideo));

    pipeline
        .process("doc-1", &harness.source, None)
        .await
        .expect("process");

    let status = pipeline.status("doc-1").await.expect("status");
    assert_eq!(status.state, DocumentState::Ready);
    assert!(status.has_summary);
    assert!(status.has_audio);
    assert!(!status.has_video);
    let narrated =
        std::fs::read_to_string(harness.data_dir.join("docs/doc-1/audio.txt")).expect("audio");
    let summary = pipeline
        .summary("doc-1", SummaryMode::Detailed)
        .await
        .expect("summary");
    assert_eq!(narrated, to_speech_text(&summary));
    assert!(!narrated.contains('\n'));
}

#[tokio::test]
async fn extraction_failure_marks_document_as_errored() {
    let dir = tempfile::tempdir().expect("tempdir");
    let repository = Arc::new(MemoryDocumentStore::with_artifact_root(dir.path()));
    let pipeline = DocumentPipeline::new(
        &test_config(dir.path()),
        repository.clone(),
        Arc::new(FailingExtractor),
        Arc::new(StubChat::default()),
        Arc::new(CountingEmbedder::new()),
    );

    let error = pipeline
        .process("doc-1", Path::new("missing.json"), None)
        .await
        .unwrap_err();
    assert!(matches!(error, PipelineError::Extract(_)));

    let status = repository
        .load_status("doc-1")
        .await
        .expect("load")
        .expect("status");
    assert_eq!(status.state, DocumentState::Error);
    assert!(status.error.is_some_and(|message| message.contains("missing")));
}

#[tokio::test]
async fn index_build_failure_is_reported_after_retries() {
    struct DownEmbedder;

    #[async_trait]
    impl EmbeddingClient for DownEmbedder {
        fn model_name(&self) -> &str {
            "down"
        }

        async fn generate_embeddings(
            &self,
            _texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            Err(EmbeddingClientError::Unavailable("connection refused".into()))
        }
    }

    let harness = Harness::new(&["Alpha stuff."]);
    let pipeline = DocumentPipeline::new(
        &test_config(&harness.data_dir),
        harness.repository.clone(),
        Arc::new(PagesFileExtractor::new()),
        harness.chat.clone(),
        Arc::new(DownEmbedder),
    )
    .with_index_retry_policy(3, Duration::from_millis(1));

    let error = pipeline
        .process("doc-1", &harness.source, None)
        .await
        .unwrap_err();
    assert!(matches!(error, PipelineError::Index(_)));

    let status = pipeline.status("doc-1").await.expect("status");
    assert_eq!(status.state, DocumentState::Error);
    // Pages extracted before the failure stay available.
    assert!(
        harness
            .repository
            .load_pages("doc-1")
            .await
            .expect("pages")
            .is_some()
    );
}

#[tokio::test]
async fn ask_rejects_unknown_documents_and_missing_indices() {
    let harness = Harness::new(&["Alpha stuff."]);
    let pipeline = harness.pipeline();

    let error = pipeline.ask("nope", "anything?").await.unwrap_err();
    assert!(matches!(error, PipelineError::UnknownDocument(_)));

    harness
        .repository
        .save_meta(
            "doc-2",
            &pdf_rag::storage::DocumentMeta::new("doc-2", None, 1),
        )
        .await
        .expect("meta");
    let error = pipeline.ask("doc-2", "anything?").await.unwrap_err();
    assert!(matches!(error, PipelineError::IndexNotFound(_)));
}

#[tokio::test]
async fn empty_document_indexes_placeholder_and_answers_from_it() {
    let harness = Harness::new(&["", "   "]);
    let pipeline = harness.pipeline();
    pipeline
        .process("doc-1", &harness.source, None)
        .await
        .expect("process");

    let summary = pipeline
        .summary("doc-1", SummaryMode::Detailed)
        .await
        .expect("summary");
    assert_eq!(summary, pdf_rag::summarize::NO_CONTENT_SUMMARY);

    let answer = pipeline.ask("doc-1", "Anything?").await.expect("answer");
    assert_eq!(answer.citations, vec!["p0"]);
}

#[tokio::test]
async fn summaries_are_generated_once_per_mode() {
    let harness = Harness::new(&["Alpha stuff.", "Beta stuff."]);
    let pipeline = harness.pipeline();
    pipeline
        .process("doc-1", &harness.source, None)
        .await
        .expect("process");
    let calls_after_process = harness.chat.calls();

    let detailed = pipeline
        .summary("doc-1", SummaryMode::Detailed)
        .await
        .expect("detailed");
    assert_eq!(harness.chat.calls(), calls_after_process);
    assert!(!detailed.is_empty());

    let brief = pipeline
        .summary("doc-1", SummaryMode::Brief)
        .await
        .expect("brief");
    let calls_after_brief = harness.chat.calls();
    assert!(calls_after_brief > calls_after_process);
    assert_eq!(
        pipeline
            .summary("doc-1", SummaryMode::Brief)
            .await
            .expect("cached"),
        brief
    );
    assert_eq!(harness.chat.calls(), calls_after_brief);
    assert_eq!(pipeline.metrics_snapshot().summaries_generated, 2);
}

#[tokio::test]
async fn unanswerable_question_returns_sentinel_when_no_evidence() {
    let harness = Harness::new(&["Alpha stuff."]);
    let mut config = test_config(&harness.data_dir);
    config.retrieval.top_k = 0;
    let pipeline = DocumentPipeline::new(
        &config,
        harness.repository.clone(),
        Arc::new(PagesFileExtractor::new()),
        harness.chat.clone(),
        harness.embedder.clone(),
    );
    pipeline
        .process("doc-1", &harness.source, None)
        .await
        .expect("process");
    let calls_before = harness.chat.calls();

    let answer = pipeline.ask("doc-1", "What is Alpha?").await.expect("answer");
    assert_eq!(answer.text, NOT_FOUND_ANSWER);
    assert!(answer.citations.is_empty());
    assert_eq!(harness.chat.calls(), calls_before);
}

#[tokio::test]
async fn path_like_document_ids_are_rejected_before_touching_storage() {
    let harness = Harness::new(&["Alpha stuff."]);
    let pipeline = harness.pipeline();
    pipeline
        .process("doc-1", &harness.source, None)
        .await
        .expect("process");

    for doc_id in ["", "..", "../docs", "doc-1/../doc-2"] {
        let error = pipeline
            .process(doc_id, &harness.source, None)
            .await
            .unwrap_err();
        assert!(
            matches!(error, PipelineError::InvalidDocumentId(InvalidDocumentId(ref id)) if id == doc_id)
        );
        assert!(matches!(
            pipeline.ask(doc_id, "What is Alpha?").await,
            Err(PipelineError::InvalidDocumentId(_))
        ));
        assert!(matches!(
            pipeline.summary(doc_id, SummaryMode::Brief).await,
            Err(PipelineError::InvalidDocumentId(_))
        ));
        assert!(matches!(
            pipeline.status(doc_id).await,
            Err(PipelineError::InvalidDocumentId(_))
        ));
    }

    assert!(harness.data_dir.join("indices/doc-1").join(INDEX_FILE).exists());
    assert_eq!(
        pipeline.status("doc-1").await.expect("status").state,
        DocumentState::Ready
    );
}
