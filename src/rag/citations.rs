use std::collections::HashSet;

use super::Evidence;

/// Citation tags for `evidence`, deduplicated by `(page, chunk)` in first-occurrence order.
///
/// Stops once `max_citations` tags have been emitted.
pub fn build_citations(evidence: &[Evidence], max_citations: Option<usize>) -> Vec<String> {
    let limit = max_citations.unwrap_or(usize::MAX);
    let mut seen = HashSet::new();
    let mut citations = Vec::new();

    for item in evidence {
        if citations.len() >= limit {
            break;
        }
        if seen.insert((item.metadata.page, item.metadata.chunk)) {
            citations.push(item.citation());
        }
    }

    citations
}
