//! Page extraction seam.
//!
//! PDF parsing and OCR live outside this crate. The pipeline only sees [`PageExtractor`], which
//! yields one [`PageText`] per page; [`OcrBackfill`] fills pages whose text layer is empty from an
//! [`OcrEngine`] when enabled.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::processing::sanitize::is_low_information;
use crate::processing::types::PageText;
use crate::storage::{PagesFile, pages_from_texts};

/// Errors raised while extracting page text.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Source could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Source path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Source content is not in the expected format.
    #[error("Malformed pages file {path}: {source}")]
    Malformed {
        /// Source path.
        path: PathBuf,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// OCR engine failed on a page.
    #[error("OCR failed on page {page}: {message}")]
    Ocr {
        /// One-based page number.
        page: u32,
        /// Engine-provided description.
        message: String,
    },
}

/// Produces ordered page texts for a source document.
#[async_trait]
pub trait PageExtractor {
    /// Extract every page of `source`, numbered from 1, including empty pages.
    async fn extract_pages(&self, source: &Path) -> Result<Vec<PageText>, ExtractError>;
}

/// Recognizes text on a single rendered page.
#[async_trait]
pub trait OcrEngine {
    /// OCR text for `page_number` of `source`, or `None` when the engine is unavailable.
    async fn ocr_page(
        &self,
        source: &Path,
        page_number: u32,
    ) -> Result<Option<String>, ExtractError>;
}

/// Reads pre-extracted page text from a JSON file shaped `{"pages": ["...", ...]}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PagesFileExtractor;

impl PagesFileExtractor {
    /// Create the extractor.
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PageExtractor for PagesFileExtractor {
    async fn extract_pages(&self, source: &Path) -> Result<Vec<PageText>, ExtractError> {
        let body = tokio::fs::read(source)
            .await
            .map_err(|error| ExtractError::Io {
                path: source.to_path_buf(),
                source: error,
            })?;
        let file: PagesFile =
            serde_json::from_slice(&body).map_err(|error| ExtractError::Malformed {
                path: source.to_path_buf(),
                source: error,
            })?;
        Ok(pages_from_texts(file.pages))
    }
}

/// Wraps an extractor and OCRs pages whose extracted text is blank.
///
/// OCR failures are logged and leave the page empty; they never fail extraction.
pub struct OcrBackfill<E> {
    inner: E,
    engine: Option<Arc<dyn OcrEngine + Send + Sync>>,
    enabled: bool,
}

impl<E> OcrBackfill<E> {
    /// Wrap `inner`, backfilling empty pages with `engine` when `enabled`.
    pub fn new(inner: E, engine: Option<Arc<dyn OcrEngine + Send + Sync>>, enabled: bool) -> Self {
        Self {
            inner,
            engine,
            enabled,
        }
    }
}

#[async_trait]
impl<E> PageExtractor for OcrBackfill<E>
where
    E: PageExtractor + Send + Sync,
{
    async fn extract_pages(&self, source: &Path) -> Result<Vec<PageText>, ExtractError> {
        let mut pages = self.inner.extract_pages(source).await?;

        if let (true, Some(engine)) = (self.enabled, self.engine.as_ref()) {
            for page in pages.iter_mut().filter(|page| page.text.trim().is_empty()) {
                match engine.ocr_page(source, page.page_number).await {
                    Ok(Some(text)) if !text.trim().is_empty() => {
                        tracing::debug!(page = page.page_number, chars = text.len(), "OCR backfilled page");
                        page.text = text;
                    }
                    Ok(_) => {}
                    Err(error) => {
                        tracing::warn!(page = page.page_number, error = %error, "OCR failed; page left empty");
                    }
                }
            }
        }

        let joined: String = pages
            .iter()
            .map(|page| page.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        if is_low_information(&joined) {
            tracing::warn!(
                source = %source.display(),
                pages = pages.len(),
                "Extracted text is sparse; the PDF may be scanned or protected"
            );
        }

        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedOcr {
        calls: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl OcrEngine for FixedOcr {
        async fn ocr_page(
            &self,
            _source: &Path,
            page_number: u32,
        ) -> Result<Option<String>, ExtractError> {
            self.calls.lock().expect("lock").push(page_number);
            if page_number == 3 {
                return Err(ExtractError::Ocr {
                    page: page_number,
                    message: "tesseract crashed".into(),
                });
            }
            Ok(Some(format!("ocr text {page_number}")))
        }
    }

    fn pages_file(pages: &[&str]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().expect("tempfile");
        let body = serde_json::json!({ "pages": pages });
        std::fs::write(file.path(), body.to_string()).expect("write");
        file
    }

    #[tokio::test]
    async fn pages_file_is_numbered_from_one() {
        let file = pages_file(&["Alpha stuff.", "", "Beta stuff."]);
        let pages = PagesFileExtractor::new()
            .extract_pages(file.path())
            .await
            .expect("pages");
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0], PageText::new(1, "Alpha stuff."));
        assert_eq!(pages[2].page_number, 3);
    }

    #[tokio::test]
    async fn malformed_pages_file_is_rejected() {
        let file = tempfile::NamedTempFile::new().expect("tempfile");
        std::fs::write(file.path(), "[1, 2]").expect("write");
        let error = PagesFileExtractor::new()
            .extract_pages(file.path())
            .await
            .unwrap_err();
        assert!(matches!(error, ExtractError::Malformed { .. }));
    }

    #[tokio::test]
    async fn backfill_only_touches_empty_pages() {
        let file = pages_file(&["text", " ", "", "more"]);
        let engine = Arc::new(FixedOcr {
            calls: Mutex::new(Vec::new()),
        });
        let extractor = OcrBackfill::new(PagesFileExtractor::new(), Some(engine.clone()), true);
        let pages = extractor.extract_pages(file.path()).await.expect("pages");

        assert_eq!(*engine.calls.lock().expect("lock"), vec![2, 3]);
        assert_eq!(pages[0].text, "text");
        assert_eq!(pages[1].text, "ocr text 2");
        assert_eq!(pages[2].text, "");
        assert_eq!(pages[3].text, "more");
    }

    #[tokio::test]
    async fn disabled_backfill_leaves_pages_alone() {
        let file = pages_file(&["", "text"]);
        let engine = Arc::new(FixedOcr {
            calls: Mutex::new(Vec::new()),
        });
        let extractor = OcrBackfill::new(PagesFileExtractor::new(), Some(engine.clone()), false);
        let pages = extractor.extract_pages(file.path()).await.expect("pages");

        assert!(engine.calls.lock().expect("lock").is_empty());
        assert_eq!(pages[0].text, "");
    }
}
