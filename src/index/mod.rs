//! Per-document vector index: flat cosine search persisted as JSON.

mod manager;
mod store;
mod types;

pub use manager::{IndexManager, PLACEHOLDER_TEXT};
pub use store::{DocumentIndex, INDEX_FILE, IndexMeta, META_FILE};
pub use types::{ChunkMetadata, ChunkRecord, IndexEntry, IndexError, IndexOrigin, ScoredEntry};
