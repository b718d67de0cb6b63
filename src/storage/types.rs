use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use super::ids::{InvalidDocumentId, current_timestamp_rfc3339};

/// Errors raised while reading or writing document artifacts.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("Storage I/O failed at {path}: {source}")]
    Io {
        /// Path involved in the failing operation.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Artifact could not be encoded or decoded.
    #[error("Malformed artifact {path}: {source}")]
    Malformed {
        /// Artifact path.
        path: PathBuf,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// Document id cannot be mapped to a storage directory.
    #[error(transparent)]
    InvalidDocumentId(#[from] InvalidDocumentId),
}

/// Descriptive metadata recorded once pages are extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// Document identifier.
    pub doc_id: String,
    /// Original upload filename, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Number of pages extracted.
    pub num_pages: usize,
    /// RFC3339 timestamp of extraction.
    pub created_at: String,
}

impl DocumentMeta {
    /// Metadata stamped with the current time.
    pub fn new(doc_id: &str, filename: Option<String>, num_pages: usize) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            filename,
            num_pages,
            created_at: current_timestamp_rfc3339(),
        }
    }
}

/// Coarse lifecycle state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentState {
    /// Extraction or indexing in progress.
    Processing,
    /// Summary generation in progress.
    Summarizing,
    /// Speech synthesis in progress.
    Tts,
    /// Video rendering in progress.
    Video,
    /// All stages finished.
    Ready,
    /// A stage failed; see `error`.
    Error,
}

/// Latest known processing status, overwritten at every stage transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStatus {
    /// Lifecycle state.
    pub state: DocumentState,
    /// Fine-grained step within the state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    /// Failure message when `state` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Page count, reported once processing is complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_pages: Option<usize>,
    /// Whether a summary artifact exists.
    #[serde(default)]
    pub has_summary: bool,
    /// Whether an audio narration was produced.
    #[serde(default)]
    pub has_audio: bool,
    /// Whether a video was produced.
    #[serde(default)]
    pub has_video: bool,
    /// RFC3339 time of the last update.
    pub updated_at: String,
}

impl ProcessingStatus {
    /// Status for a stage that has just started.
    pub fn in_progress(state: DocumentState, step: &str) -> Self {
        Self {
            state,
            step: Some(step.to_string()),
            error: None,
            num_pages: None,
            has_summary: false,
            has_audio: false,
            has_video: false,
            updated_at: current_timestamp_rfc3339(),
        }
    }

    /// Terminal success status.
    pub fn ready(num_pages: usize, has_summary: bool, has_audio: bool, has_video: bool) -> Self {
        Self {
            state: DocumentState::Ready,
            step: None,
            error: None,
            num_pages: Some(num_pages),
            has_summary,
            has_audio,
            has_video,
            updated_at: current_timestamp_rfc3339(),
        }
    }

    /// Terminal failure status carrying the error message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: DocumentState::Error,
            step: None,
            error: Some(message.into()),
            num_pages: None,
            has_summary: false,
            has_audio: false,
            has_video: false,
            updated_at: current_timestamp_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PagesFile {
    pub(crate) pages: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase_state_and_skips_empty_fields() {
        let status = ProcessingStatus::in_progress(DocumentState::Processing, "extracting_pages");
        let value = serde_json::to_value(&status).expect("json");
        assert_eq!(value["state"], "processing");
        assert_eq!(value["step"], "extracting_pages");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn failed_status_records_message() {
        let status = ProcessingStatus::failed("boom");
        assert_eq!(status.state, DocumentState::Error);
        assert_eq!(status.error.as_deref(), Some("boom"));
    }
}
