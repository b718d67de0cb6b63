//! Text processing: page hygiene, chunking, and token counting.

pub mod chunking;
pub mod sanitize;
pub mod tokens;
pub mod types;

pub use chunking::{ChunkProfile, chunk_pages, split_text};
pub use types::{ChunkingError, PageText, SummaryMode};
