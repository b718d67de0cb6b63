use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::DocumentRepository;
use super::ids::validate_document_id;
use super::types::{DocumentMeta, ProcessingStatus, StorageError};
use crate::processing::types::{PageText, SummaryMode};

#[derive(Debug, Default)]
struct DocumentRecord {
    pages: Option<Vec<PageText>>,
    meta: Option<DocumentMeta>,
    status: Option<ProcessingStatus>,
    summaries: HashMap<SummaryMode, String>,
}

/// In-process document store for tests and one-shot runs.
///
/// Media renderers still need a real directory, so artifacts go under `artifact_root`.
#[derive(Debug)]
pub struct MemoryDocumentStore {
    documents: Mutex<HashMap<String, DocumentRecord>>,
    artifact_root: PathBuf,
}

impl MemoryDocumentStore {
    /// Store with media artifacts under the system temp directory.
    pub fn new() -> Self {
        Self::with_artifact_root(std::env::temp_dir().join("pdf-rag"))
    }

    /// Store with media artifacts under `root`.
    pub fn with_artifact_root(root: impl Into<PathBuf>) -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            artifact_root: root.into(),
        }
    }

    fn documents(&self) -> MutexGuard<'_, HashMap<String, DocumentRecord>> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentRepository for MemoryDocumentStore {
    async fn save_pages(&self, doc_id: &str, pages: &[PageText]) -> Result<(), StorageError> {
        self.documents()
            .entry(doc_id.to_string())
            .or_default()
            .pages = Some(pages.to_vec());
        Ok(())
    }

    async fn load_pages(&self, doc_id: &str) -> Result<Option<Vec<PageText>>, StorageError> {
        Ok(self
            .documents()
            .get(doc_id)
            .and_then(|record| record.pages.clone()))
    }

    async fn save_meta(&self, doc_id: &str, meta: &DocumentMeta) -> Result<(), StorageError> {
        self.documents()
            .entry(doc_id.to_string())
            .or_default()
            .meta = Some(meta.clone());
        Ok(())
    }

    async fn load_meta(&self, doc_id: &str) -> Result<Option<DocumentMeta>, StorageError> {
        Ok(self
            .documents()
            .get(doc_id)
            .and_then(|record| record.meta.clone()))
    }

    async fn save_status(
        &self,
        doc_id: &str,
        status: &ProcessingStatus,
    ) -> Result<(), StorageError> {
        self.documents()
            .entry(doc_id.to_string())
            .or_default()
            .status = Some(status.clone());
        Ok(())
    }

    async fn load_status(&self, doc_id: &str) -> Result<Option<ProcessingStatus>, StorageError> {
        Ok(self
            .documents()
            .get(doc_id)
            .and_then(|record| record.status.clone()))
    }

    async fn save_summary(
        &self,
        doc_id: &str,
        mode: SummaryMode,
        summary: &str,
    ) -> Result<(), StorageError> {
        self.documents()
            .entry(doc_id.to_string())
            .or_default()
            .summaries
            .insert(mode, summary.to_string());
        Ok(())
    }

    async fn load_summary(
        &self,
        doc_id: &str,
        mode: SummaryMode,
    ) -> Result<Option<String>, StorageError> {
        Ok(self
            .documents()
            .get(doc_id)
            .and_then(|record| record.summaries.get(&mode).cloned()))
    }

    async fn artifact_dir(&self, doc_id: &str) -> Result<PathBuf, StorageError> {
        validate_document_id(doc_id)?;
        let dir = self.artifact_root.join(doc_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StorageError::Io {
                path: dir.clone(),
                source,
            })?;
        Ok(dir)
    }
}
