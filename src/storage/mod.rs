//! Per-document artifact storage.
//!
//! Layout under the docs root: `<doc_id>/{pages.json, meta.json, status.json,
//! summary_<mode>.txt}`. Every file is written to a `.tmp` sibling and renamed into place.

mod fs;
mod ids;
mod memory;
mod types;

use async_trait::async_trait;
use std::path::PathBuf;

use crate::processing::types::{PageText, SummaryMode};

pub use fs::FsDocumentStore;
pub use ids::{
    InvalidDocumentId, current_timestamp_rfc3339, document_id_from_bytes, generate_document_id,
    validate_document_id,
};
pub use memory::MemoryDocumentStore;
pub use types::{DocumentMeta, DocumentState, ProcessingStatus, StorageError};
pub(crate) use types::PagesFile;

/// Read/write access to the artifacts of processed documents.
#[async_trait]
pub trait DocumentRepository {
    /// Persist page texts in page order.
    async fn save_pages(&self, doc_id: &str, pages: &[PageText]) -> Result<(), StorageError>;

    /// Load page texts, numbered from 1, or `None` when never saved.
    async fn load_pages(&self, doc_id: &str) -> Result<Option<Vec<PageText>>, StorageError>;

    /// Persist document metadata.
    async fn save_meta(&self, doc_id: &str, meta: &DocumentMeta) -> Result<(), StorageError>;

    /// Load document metadata.
    async fn load_meta(&self, doc_id: &str) -> Result<Option<DocumentMeta>, StorageError>;

    /// Overwrite the processing status.
    async fn save_status(
        &self,
        doc_id: &str,
        status: &ProcessingStatus,
    ) -> Result<(), StorageError>;

    /// Load the latest processing status.
    async fn load_status(&self, doc_id: &str) -> Result<Option<ProcessingStatus>, StorageError>;

    /// Cache the summary generated for `mode`.
    async fn save_summary(
        &self,
        doc_id: &str,
        mode: SummaryMode,
        summary: &str,
    ) -> Result<(), StorageError>;

    /// Load the cached summary for `mode`.
    async fn load_summary(
        &self,
        doc_id: &str,
        mode: SummaryMode,
    ) -> Result<Option<String>, StorageError>;

    /// Directory where media renderers may write files for `doc_id`, created on demand.
    async fn artifact_dir(&self, doc_id: &str) -> Result<PathBuf, StorageError>;
}

pub(crate) fn pages_from_texts(texts: Vec<String>) -> Vec<PageText> {
    texts
        .into_iter()
        .enumerate()
        .map(|(index, text)| PageText::new(index as u32 + 1, text))
        .collect()
}
