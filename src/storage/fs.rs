use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

use super::ids::validate_document_id;
use super::types::{DocumentMeta, PagesFile, ProcessingStatus, StorageError};
use super::{DocumentRepository, pages_from_texts};
use crate::processing::types::{PageText, SummaryMode};

const PAGES_FILE: &str = "pages.json";
const META_FILE: &str = "meta.json";
const STATUS_FILE: &str = "status.json";

/// Filesystem-backed document store rooted at `<data_dir>/docs`.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    /// Store documents under `root`, one sub-directory per document.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the artifacts of `doc_id`; rejects ids that are not a plain name.
    pub fn doc_dir(&self, doc_id: &str) -> Result<PathBuf, StorageError> {
        validate_document_id(doc_id)?;
        Ok(self.root.join(doc_id))
    }

    fn artifact_path(&self, doc_id: &str, file_name: &str) -> Result<PathBuf, StorageError> {
        Ok(self.doc_dir(doc_id)?.join(file_name))
    }

    fn summary_path(&self, doc_id: &str, mode: SummaryMode) -> Result<PathBuf, StorageError> {
        self.artifact_path(doc_id, &format!("summary_{mode}.txt"))
    }

    async fn write_json<T: Serialize + Sync>(
        &self,
        path: &Path,
        value: &T,
    ) -> Result<(), StorageError> {
        let body = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        write_atomic(path, &body).await
    }

    async fn read_json<T: DeserializeOwned + Send>(
        &self,
        path: &Path,
    ) -> Result<Option<T>, StorageError> {
        let Some(body) = read_optional(path).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|source| StorageError::Malformed {
                path: path.to_path_buf(),
                source,
            })
    }
}

#[async_trait]
impl DocumentRepository for FsDocumentStore {
    async fn save_pages(&self, doc_id: &str, pages: &[PageText]) -> Result<(), StorageError> {
        let file = PagesFile {
            pages: pages.iter().map(|page| page.text.clone()).collect(),
        };
        self.write_json(&self.artifact_path(doc_id, PAGES_FILE)?, &file)
            .await
    }

    async fn load_pages(&self, doc_id: &str) -> Result<Option<Vec<PageText>>, StorageError> {
        let file: Option<PagesFile> = self
            .read_json(&self.artifact_path(doc_id, PAGES_FILE)?)
            .await?;
        Ok(file.map(|file| pages_from_texts(file.pages)))
    }

    async fn save_meta(&self, doc_id: &str, meta: &DocumentMeta) -> Result<(), StorageError> {
        self.write_json(&self.artifact_path(doc_id, META_FILE)?, meta)
            .await
    }

    async fn load_meta(&self, doc_id: &str) -> Result<Option<DocumentMeta>, StorageError> {
        self.read_json(&self.artifact_path(doc_id, META_FILE)?)
            .await
    }

    async fn save_status(
        &self,
        doc_id: &str,
        status: &ProcessingStatus,
    ) -> Result<(), StorageError> {
        self.write_json(&self.artifact_path(doc_id, STATUS_FILE)?, status)
            .await
    }

    async fn load_status(&self, doc_id: &str) -> Result<Option<ProcessingStatus>, StorageError> {
        self.read_json(&self.artifact_path(doc_id, STATUS_FILE)?)
            .await
    }

    async fn save_summary(
        &self,
        doc_id: &str,
        mode: SummaryMode,
        summary: &str,
    ) -> Result<(), StorageError> {
        write_atomic(&self.summary_path(doc_id, mode)?, summary.as_bytes()).await
    }

    async fn load_summary(
        &self,
        doc_id: &str,
        mode: SummaryMode,
    ) -> Result<Option<String>, StorageError> {
        let Some(body) = read_optional(&self.summary_path(doc_id, mode)?).await? else {
            return Ok(None);
        };
        Ok(Some(String::from_utf8_lossy(&body).into_owned()))
    }

    async fn artifact_dir(&self, doc_id: &str) -> Result<PathBuf, StorageError> {
        let dir = self.doc_dir(doc_id)?;
        create_dir_all(&dir).await?;
        Ok(dir)
    }
}

async fn create_dir_all(dir: &Path) -> Result<(), StorageError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| StorageError::Io {
            path: dir.to_path_buf(),
            source,
        })
}

async fn write_atomic(path: &Path, body: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent).await?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, body)
        .await
        .map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
    match tokio::fs::read(path).await {
        Ok(body) => Ok(Some(body)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StorageError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
