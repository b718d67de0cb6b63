//! Per-document index lifecycle: build once, persist atomically, reuse forever.
//!
//! An index directory is never invalidated automatically. Changing chunk parameters after an
//! index exists has no effect until the directory is deleted. Callers must serialize
//! `build_or_load` for the same document; distinct documents may proceed concurrently.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::store::{DocumentIndex, INDEX_FILE};
use super::types::{ChunkMetadata, ChunkRecord, IndexError, IndexOrigin};
use crate::embedding::EmbeddingClient;
use crate::storage::validate_document_id;

/// Text indexed when a document yields no non-empty chunks.
pub const PLACEHOLDER_TEXT: &str = "No content available";

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(1500);

/// Builds, persists, and reloads document indices under a common root directory.
pub struct IndexManager {
    embedder: Arc<dyn EmbeddingClient + Send + Sync>,
    indices_root: PathBuf,
    max_attempts: u32,
    backoff: Duration,
}

impl IndexManager {
    /// Create a manager with the default retry policy (3 attempts, 1.5s linear backoff).
    pub fn new(embedder: Arc<dyn EmbeddingClient + Send + Sync>, indices_root: PathBuf) -> Self {
        Self {
            embedder,
            indices_root,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Override the retry policy. The delay before attempt `n + 1` is `backoff × n`.
    pub fn with_retry_policy(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Directory holding the persisted index for `doc_id`; rejects ids that are not a plain name.
    pub fn index_dir(&self, doc_id: &str) -> Result<PathBuf, IndexError> {
        validate_document_id(doc_id)?;
        Ok(self.indices_root.join(doc_id))
    }

    /// Load the persisted index for `doc_id`, or `None` when none has been published.
    pub async fn load(&self, doc_id: &str) -> Result<Option<DocumentIndex>, IndexError> {
        let dir = self.index_dir(doc_id)?;
        if !exists(&dir.join(INDEX_FILE)).await {
            return Ok(None);
        }
        DocumentIndex::read_from(&dir).await.map(Some)
    }

    /// Return the persisted index for `doc_id`, building and publishing it first if absent.
    ///
    /// An existing index is returned as-is, regardless of `chunks`. A directory that exists but
    /// cannot be read is discarded and rebuilt.
    pub async fn build_or_load(
        &self,
        doc_id: &str,
        chunks: Vec<ChunkRecord>,
    ) -> Result<(DocumentIndex, IndexOrigin), IndexError> {
        let dir = self.index_dir(doc_id)?;
        match self.load(doc_id).await {
            Ok(Some(index)) => {
                tracing::debug!(doc_id, entries = index.len(), "Reusing persisted index");
                return Ok((index, IndexOrigin::Loaded));
            }
            // A directory without `index.json` is a leftover from an interrupted publish.
            Ok(None) => remove_dir(&dir).await?,
            Err(error) => {
                tracing::warn!(doc_id, error = %error, "Persisted index unreadable; rebuilding");
                remove_dir(&dir).await?;
            }
        }

        let chunks = non_empty_or_placeholder(doc_id, chunks);
        let index = self.build_with_retry(doc_id, &chunks).await?;
        let (index, origin) = self.publish(doc_id, index).await?;
        if origin == IndexOrigin::Built {
            tracing::info!(
                doc_id,
                entries = index.len(),
                dimension = index.dimension(),
                model = index.model(),
                "Index built"
            );
        }
        Ok((index, origin))
    }

    async fn build_with_retry(
        &self,
        doc_id: &str,
        chunks: &[ChunkRecord],
    ) -> Result<DocumentIndex, IndexError> {
        let mut attempt = 1;
        loop {
            match self.build(doc_id, chunks).await {
                Ok(index) => return Ok(index),
                Err(error) if error.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff * attempt;
                    tracing::warn!(
                        doc_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Index build attempt failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    tracing::error!(doc_id, attempts = attempt, error = %error, "Index build failed");
                    return Err(IndexError::BuildFailed {
                        attempts: attempt,
                        source: Box::new(error),
                    });
                }
            }
        }
    }

    async fn build(&self, doc_id: &str, chunks: &[ChunkRecord]) -> Result<DocumentIndex, IndexError> {
        let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedder.generate_embeddings(texts).await?;
        DocumentIndex::from_embeddings(doc_id, self.embedder.model_name(), chunks.to_vec(), vectors)
    }

    /// Write into a hidden sibling directory, then rename it into place.
    ///
    /// When another writer published first, the staged copy is dropped and the published index
    /// is returned instead.
    async fn publish(
        &self,
        doc_id: &str,
        index: DocumentIndex,
    ) -> Result<(DocumentIndex, IndexOrigin), IndexError> {
        let target = self.index_dir(doc_id)?;
        tokio::fs::create_dir_all(&self.indices_root)
            .await
            .map_err(|source| IndexError::Io {
                path: self.indices_root.clone(),
                source,
            })?;

        let staging = self
            .indices_root
            .join(format!(".{doc_id}.{}.tmp", Uuid::new_v4()));
        tokio::fs::create_dir(&staging)
            .await
            .map_err(|source| IndexError::Io {
                path: staging.clone(),
                source,
            })?;

        if let Err(error) = index.write_to(&staging).await {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(error);
        }

        match tokio::fs::rename(&staging, &target).await {
            Ok(()) => Ok((index, IndexOrigin::Built)),
            Err(source) => {
                let _ = tokio::fs::remove_dir_all(&staging).await;
                if exists(&target.join(INDEX_FILE)).await {
                    tracing::debug!(doc_id, "Index published concurrently; using published copy");
                    let published = DocumentIndex::read_from(&target).await?;
                    Ok((published, IndexOrigin::Loaded))
                } else {
                    Err(IndexError::Io {
                        path: target,
                        source,
                    })
                }
            }
        }
    }
}

fn non_empty_or_placeholder(doc_id: &str, chunks: Vec<ChunkRecord>) -> Vec<ChunkRecord> {
    let chunks: Vec<ChunkRecord> = chunks
        .into_iter()
        .filter(|chunk| !chunk.text.trim().is_empty())
        .collect();
    if !chunks.is_empty() {
        return chunks;
    }

    tracing::warn!(doc_id, "No non-empty chunks; indexing placeholder");
    vec![ChunkRecord {
        text: PLACEHOLDER_TEXT.to_string(),
        metadata: ChunkMetadata {
            doc_id: doc_id.to_string(),
            page: 0,
            chunk: None,
        },
    }]
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn remove_dir(dir: &Path) -> Result<(), IndexError> {
    if !exists(dir).await {
        return Ok(());
    }
    tokio::fs::remove_dir_all(dir)
        .await
        .map_err(|source| IndexError::Io {
            path: dir.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingClientError, HashedEmbeddingClient};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Delegates to the hashed client, failing the first `failures` calls with `failure`.
    struct CountingEmbedder {
        inner: HashedEmbeddingClient,
        calls: AtomicUsize,
        failures: usize,
        failure: fn() -> EmbeddingClientError,
    }

    impl CountingEmbedder {
        fn new(failures: usize) -> Self {
            Self {
                inner: HashedEmbeddingClient::new(64),
                calls: AtomicUsize::new(0),
                failures,
                failure: || EmbeddingClientError::Unavailable("connection refused".into()),
            }
        }

        fn rejecting() -> Self {
            Self {
                failure: || EmbeddingClientError::GenerationFailed("Ollama returned 400".into()),
                ..Self::new(usize::MAX)
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingClient for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }

        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err((self.failure)());
            }
            self.inner.generate_embeddings(texts).await
        }
    }

    fn chunk(page: u32, index: u32, text: &str) -> ChunkRecord {
        ChunkRecord {
            text: text.into(),
            metadata: ChunkMetadata {
                doc_id: "doc-1".into(),
                page,
                chunk: Some(index),
            },
        }
    }

    fn manager(root: &Path, embedder: Arc<CountingEmbedder>) -> IndexManager {
        IndexManager::new(embedder, root.to_path_buf())
            .with_retry_policy(3, Duration::from_millis(5))
    }

    #[tokio::test]
    async fn second_call_reuses_persisted_index() {
        let root = tempfile::tempdir().expect("tempdir");
        let embedder = Arc::new(CountingEmbedder::new(0));
        let manager = manager(root.path(), embedder.clone());

        let chunks = vec![chunk(1, 0, "Alpha stuff."), chunk(3, 0, "Beta stuff.")];
        let (first, origin) = manager
            .build_or_load("doc-1", chunks.clone())
            .await
            .expect("first build");
        assert_eq!(origin, IndexOrigin::Built);
        let index_file = manager.index_dir("doc-1").expect("dir").join(INDEX_FILE);
        let modified = std::fs::metadata(&index_file)
            .and_then(|meta| meta.modified())
            .expect("mtime");

        let (second, origin) = manager
            .build_or_load("doc-1", vec![chunk(9, 0, "Different content")])
            .await
            .expect("second call");
        assert_eq!(origin, IndexOrigin::Loaded);
        assert_eq!(embedder.calls(), 1);
        assert_eq!(first, second);
        let modified_again = std::fs::metadata(&index_file)
            .and_then(|meta| meta.modified())
            .expect("mtime");
        assert_eq!(modified, modified_again);
    }

    #[tokio::test]
    async fn publish_leaves_no_staging_directories() {
        let root = tempfile::tempdir().expect("tempdir");
        let manager = manager(root.path(), Arc::new(CountingEmbedder::new(0)));
        manager
            .build_or_load("doc-1", vec![chunk(1, 0, "text")])
            .await
            .expect("build");

        let names: Vec<String> = std::fs::read_dir(root.path())
            .expect("read_dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["doc-1".to_string()]);
    }

    #[tokio::test]
    async fn empty_input_indexes_placeholder() {
        let root = tempfile::tempdir().expect("tempdir");
        let manager = manager(root.path(), Arc::new(CountingEmbedder::new(0)));
        let (index, _) = manager
            .build_or_load("doc-1", vec![chunk(1, 0, "   ")])
            .await
            .expect("build");
        assert_eq!(index.len(), 1);
        assert_eq!(index.entries()[0].text, PLACEHOLDER_TEXT);
        assert_eq!(index.entries()[0].metadata.page, 0);
        assert_eq!(index.entries()[0].metadata.chunk, None);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let root = tempfile::tempdir().expect("tempdir");
        let embedder = Arc::new(CountingEmbedder::new(2));
        let manager = manager(root.path(), embedder.clone());
        let (index, origin) = manager
            .build_or_load("doc-1", vec![chunk(1, 0, "text")])
            .await
            .expect("build after retries");
        assert_eq!(origin, IndexOrigin::Built);
        assert_eq!(index.len(), 1);
        assert_eq!(embedder.calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_report_build_failed() {
        let root = tempfile::tempdir().expect("tempdir");
        let embedder = Arc::new(CountingEmbedder::new(usize::MAX));
        let manager = manager(root.path(), embedder.clone());
        let error = manager
            .build_or_load("doc-1", vec![chunk(1, 0, "text")])
            .await
            .unwrap_err();
        assert!(matches!(error, IndexError::BuildFailed { attempts: 3, .. }));
        assert_eq!(embedder.calls(), 3);
        assert!(manager.load("doc-1").await.expect("load").is_none());
    }

    #[tokio::test]
    async fn corrupt_index_is_rebuilt() {
        let root = tempfile::tempdir().expect("tempdir");
        let embedder = Arc::new(CountingEmbedder::new(0));
        let manager = manager(root.path(), embedder.clone());
        let dir = manager.index_dir("doc-1").expect("dir");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join(INDEX_FILE), b"garbage").expect("write");

        let (index, origin) = manager
            .build_or_load("doc-1", vec![chunk(1, 0, "text")])
            .await
            .expect("rebuild");
        assert_eq!(origin, IndexOrigin::Built);
        assert_eq!(index.len(), 1);
        assert!(manager.load("doc-1").await.expect("load").is_some());
    }

    #[tokio::test]
    async fn load_returns_none_without_index() {
        let root = tempfile::tempdir().expect("tempdir");
        let manager = manager(root.path(), Arc::new(CountingEmbedder::new(0)));
        assert!(manager.load("missing").await.expect("load").is_none());
    }

    #[tokio::test]
    async fn rejected_requests_are_not_retried() {
        let root = tempfile::tempdir().expect("tempdir");
        let embedder = Arc::new(CountingEmbedder::rejecting());
        let manager = manager(root.path(), embedder.clone());
        let error = manager
            .build_or_load("doc-1", vec![chunk(1, 0, "text")])
            .await
            .unwrap_err();
        assert!(matches!(error, IndexError::BuildFailed { attempts: 1, .. }));
        assert_eq!(embedder.calls(), 1);
    }

    #[tokio::test]
    async fn path_like_ids_leave_other_indices_alone() {
        let root = tempfile::tempdir().expect("tempdir");
        let indices = root.path().join("indices");
        let embedder = Arc::new(CountingEmbedder::new(0));
        let manager = manager(&indices, embedder.clone());
        manager
            .build_or_load("doc-a", vec![chunk(1, 0, "Alpha stuff.")])
            .await
            .expect("build doc-a");

        for doc_id in ["", ".", "..", "../indices", "doc-a/..", ".doc-a"] {
            let error = manager
                .build_or_load(doc_id, vec![chunk(1, 0, "text")])
                .await
                .unwrap_err();
            assert!(matches!(error, IndexError::InvalidDocumentId(_)), "{doc_id:?}");
            assert!(manager.load(doc_id).await.is_err());
        }

        assert_eq!(embedder.calls(), 1);
        assert!(indices.join("doc-a").join(INDEX_FILE).exists());
        assert!(manager.load("doc-a").await.expect("load").is_some());
    }

    /// Publishes a competing index for the same document while embeddings are requested.
    struct RacingEmbedder {
        inner: HashedEmbeddingClient,
        rival: IndexManager,
    }

    #[async_trait]
    impl EmbeddingClient for RacingEmbedder {
        fn model_name(&self) -> &str {
            "racing"
        }

        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            self.rival
                .build_or_load("doc-1", vec![chunk(2, 0, "Published first.")])
                .await
                .expect("rival publish");
            self.inner.generate_embeddings(texts).await
        }
    }

    #[tokio::test]
    async fn losing_a_publish_race_returns_the_published_index() {
        let root = tempfile::tempdir().expect("tempdir");
        let rival = manager(root.path(), Arc::new(CountingEmbedder::new(0)));
        let racing = Arc::new(RacingEmbedder {
            inner: HashedEmbeddingClient::new(64),
            rival,
        });
        let manager = IndexManager::new(racing, root.path().to_path_buf());

        let (index, origin) = manager
            .build_or_load("doc-1", vec![chunk(1, 0, "Staged second.")])
            .await
            .expect("build");

        assert_eq!(origin, IndexOrigin::Loaded);
        assert_eq!(index.model(), "counting");
        assert_eq!(index.entries()[0].text, "Published first.");
        let names: Vec<String> = std::fs::read_dir(root.path())
            .expect("read_dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["doc-1".to_string()]);
    }
}
