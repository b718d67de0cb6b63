//! Shared types used by the vector index and its manager.

use crate::embedding::EmbeddingClientError;
use crate::storage::InvalidDocumentId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned while building, persisting, loading, or searching an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Filesystem operation failed.
    #[error("Index I/O failed at {path}: {source}")]
    Io {
        /// Path involved in the failing operation.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Persisted index could not be decoded or encoded.
    #[error("Malformed index file {path}: {source}")]
    Malformed {
        /// File that failed to (de)serialize.
        path: PathBuf,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// Embedding backend failed to produce vectors.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Backend returned a different number of vectors than texts submitted.
    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    EmbeddingCountMismatch {
        /// Number of texts submitted.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },
    /// Vectors in the index or query disagree on dimensionality.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension recorded by the index.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// Embedding or construction kept failing after every retry.
    #[error("Index build failed after {attempts} attempts: {source}")]
    BuildFailed {
        /// Number of attempts made.
        attempts: u32,
        /// Last error observed.
        #[source]
        source: Box<IndexError>,
    },
    /// Document id cannot be mapped to an index directory.
    #[error(transparent)]
    InvalidDocumentId(#[from] InvalidDocumentId),
}

impl IndexError {
    /// Whether repeating the same build may succeed; only an unreachable or overloaded
    /// embedding service qualifies.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Embedding(EmbeddingClientError::Unavailable(_)))
    }
}

/// Provenance attached to every chunk in an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Identifier of the source document.
    pub doc_id: String,
    /// One-based page number. Zero marks the placeholder chunk of an empty document.
    pub page: u32,
    /// Zero-based chunk position within the page, absent for page-granularity entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<u32>,
}

impl ChunkMetadata {
    /// Citation tag for this provenance: `p{page}:c{chunk}`, or `p{page}` without a chunk.
    pub fn citation(&self) -> String {
        match self.chunk {
            Some(chunk) => format!("p{}:c{}", self.page, chunk),
            None => format!("p{}", self.page),
        }
    }
}

/// Chunk text with provenance, ready for embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Chunk text.
    pub text: String,
    /// Source provenance.
    pub metadata: ChunkMetadata,
}

/// Stored index entry: chunk text, provenance, and embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Chunk text.
    pub text: String,
    /// Source provenance.
    pub metadata: ChunkMetadata,
    /// Embedding vector for `text`.
    pub vector: Vec<f32>,
}

/// Search hit borrowed from an index.
#[derive(Debug, Clone, Copy)]
pub struct ScoredEntry<'a> {
    /// Cosine similarity between the query and the entry.
    pub score: f32,
    /// Matching entry.
    pub entry: &'a IndexEntry,
}

/// Whether `build_or_load` reused a persisted index or built a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    /// Existing on-disk index was loaded.
    Loaded,
    /// Index was embedded and persisted during this call.
    Built,
}
