//! Flat in-memory cosine index with a JSON on-disk form.
//!
//! A persisted index is a directory holding `index.json` (entries and vectors) and a
//! `meta.json` sidecar describing how it was built. Only `index.json` is read back.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;

use super::types::{ChunkRecord, IndexEntry, IndexError, ScoredEntry};
use crate::storage::current_timestamp_rfc3339;

/// File holding serialized entries inside an index directory.
pub const INDEX_FILE: &str = "index.json";
/// Sidecar metadata file inside an index directory.
pub const META_FILE: &str = "meta.json";

const FORMAT_VERSION: u32 = 1;

/// Similarity index over the chunks of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentIndex {
    version: u32,
    doc_id: String,
    model: String,
    dimension: usize,
    entries: Vec<IndexEntry>,
}

/// Human-readable description written next to the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Document the index belongs to.
    pub doc_id: String,
    /// Embedding model used for the vectors.
    pub model: String,
    /// Vector dimensionality.
    pub dimension: usize,
    /// Number of entries.
    pub chunk_count: usize,
    /// RFC3339 creation time.
    pub created_at: String,
}

impl DocumentIndex {
    /// Pair chunk records with their embeddings, validating counts and dimensions.
    pub fn from_embeddings(
        doc_id: &str,
        model: &str,
        records: Vec<ChunkRecord>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if records.len() != vectors.len() {
            return Err(IndexError::EmbeddingCountMismatch {
                expected: records.len(),
                actual: vectors.len(),
            });
        }

        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        let mut entries = Vec::with_capacity(records.len());
        for (record, vector) in records.into_iter().zip(vectors) {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            entries.push(IndexEntry {
                text: record.text,
                metadata: record.metadata,
                vector,
            });
        }

        Ok(Self {
            version: FORMAT_VERSION,
            doc_id: doc_id.to_string(),
            model: model.to_string(),
            dimension,
            entries,
        })
    }

    /// Document identifier.
    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    /// Embedding model recorded at build time.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Vector dimensionality.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Stored entries in insertion order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return up to `k` entries in descending cosine similarity to `query`.
    ///
    /// Ties keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredEntry<'_>>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<ScoredEntry<'_>> = self
            .entries
            .iter()
            .map(|entry| ScoredEntry {
                score: cosine_similarity(query, &entry.vector),
                entry,
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Sidecar description of this index.
    pub fn meta(&self) -> IndexMeta {
        IndexMeta {
            doc_id: self.doc_id.clone(),
            model: self.model.clone(),
            dimension: self.dimension,
            chunk_count: self.entries.len(),
            created_at: current_timestamp_rfc3339(),
        }
    }

    /// Write `index.json` and `meta.json` into an existing directory.
    pub(crate) async fn write_to(&self, dir: &Path) -> Result<(), IndexError> {
        let index_path = dir.join(INDEX_FILE);
        let body = serde_json::to_vec(self).map_err(|source| IndexError::Malformed {
            path: index_path.clone(),
            source,
        })?;
        tokio::fs::write(&index_path, body)
            .await
            .map_err(|source| IndexError::Io {
                path: index_path,
                source,
            })?;

        let meta_path = dir.join(META_FILE);
        let meta = serde_json::to_vec_pretty(&self.meta()).map_err(|source| {
            IndexError::Malformed {
                path: meta_path.clone(),
                source,
            }
        })?;
        tokio::fs::write(&meta_path, meta)
            .await
            .map_err(|source| IndexError::Io {
                path: meta_path,
                source,
            })
    }

    /// Read an index from a directory produced by [`DocumentIndex::write_to`].
    pub async fn read_from(dir: &Path) -> Result<Self, IndexError> {
        let index_path = dir.join(INDEX_FILE);
        let body = tokio::fs::read(&index_path)
            .await
            .map_err(|source| IndexError::Io {
                path: index_path.clone(),
                source,
            })?;
        let index: Self = serde_json::from_slice(&body).map_err(|source| IndexError::Malformed {
            path: index_path,
            source,
        })?;
        if let Some(entry) = index
            .entries
            .iter()
            .find(|entry| entry.vector.len() != index.dimension)
        {
            return Err(IndexError::DimensionMismatch {
                expected: index.dimension,
                actual: entry.vector.len(),
            });
        }
        Ok(index)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
