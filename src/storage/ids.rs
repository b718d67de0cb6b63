use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

const DOC_ID_HEX_LEN: usize = 24;
const DOC_ID_MAX_LEN: usize = 128;

/// Document identifier that cannot be used as a single directory name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Invalid document id '{0}': expected 1-128 letters, digits, '-', '_' or '.', not starting with '.'"
)]
pub struct InvalidDocumentId(pub String);

/// Check that `doc_id` names exactly one directory under a storage root.
///
/// Empty ids, `.`/`..`, hidden names and anything with a path separator are rejected, so an id
/// can never address a parent or sibling directory.
pub fn validate_document_id(doc_id: &str) -> Result<(), InvalidDocumentId> {
    let valid = !doc_id.is_empty()
        && doc_id.len() <= DOC_ID_MAX_LEN
        && !doc_id.starts_with('.')
        && doc_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(InvalidDocumentId(doc_id.to_string()))
    }
}

/// Content-derived document identifier: the first 24 hex characters of the SHA-256 digest.
///
/// Re-processing the same bytes therefore reuses the persisted index.
pub fn document_id_from_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut encoded = hex::encode(digest);
    encoded.truncate(DOC_ID_HEX_LEN);
    encoded
}

/// Random document identifier for uploads that should never share artifacts.
pub fn generate_document_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current timestamp formatted for persisted artifacts.
pub fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
