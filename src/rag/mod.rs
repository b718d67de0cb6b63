//! Retrieval-augmented answering: evidence retrieval, citation tags, grounded answers.

mod answer;
mod citations;
mod retrieve;

use serde::Serialize;

use crate::index::ChunkMetadata;

pub use answer::{Answer, GroundedAnswerer, NOT_FOUND_ANSWER};
pub use citations::build_citations;
pub use retrieve::retrieve;

/// Retrieved passage with provenance and similarity score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
    /// Chunk text.
    pub text: String,
    /// Source provenance; the citation tag derives from it alone.
    pub metadata: ChunkMetadata,
    /// Cosine similarity to the query.
    pub score: f32,
}

impl Evidence {
    /// Citation tag for this passage.
    pub fn citation(&self) -> String {
        self.metadata.citation()
    }
}
