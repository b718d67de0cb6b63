use super::Evidence;
use crate::embedding::EmbeddingClient;
use crate::index::DocumentIndex;

/// Embed `query` and return up to `k` most similar passages from `index`.
///
/// Retrieval never fails: embedding errors, empty vectors, and dimension mismatches are
/// logged and produce an empty result, which the answerer turns into its not-found reply.
pub async fn retrieve(
    embedder: &(dyn EmbeddingClient + Send + Sync),
    index: &DocumentIndex,
    query: &str,
    k: usize,
) -> Vec<Evidence> {
    if k == 0 || index.is_empty() {
        return Vec::new();
    }

    let query_vector = match embedder.generate_embeddings(vec![query.to_string()]).await {
        Ok(mut vectors) => match vectors.pop() {
            Some(vector) if !vector.is_empty() => vector,
            _ => {
                tracing::warn!(doc_id = index.doc_id(), "Query embedding was empty");
                return Vec::new();
            }
        },
        Err(error) => {
            tracing::warn!(doc_id = index.doc_id(), error = %error, "Query embedding failed");
            return Vec::new();
        }
    };

    match index.search(&query_vector, k) {
        Ok(hits) => {
            let evidence: Vec<Evidence> = hits
                .into_iter()
                .map(|hit| Evidence {
                    text: hit.entry.text.clone(),
                    metadata: hit.entry.metadata.clone(),
                    score: hit.score,
                })
                .collect();
            tracing::debug!(doc_id = index.doc_id(), k, hits = evidence.len(), "Retrieved evidence");
            evidence
        }
        Err(error) => {
            tracing::warn!(doc_id = index.doc_id(), error = %error, "Similarity search failed");
            Vec::new()
        }
    }
}
