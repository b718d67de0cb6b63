//! Narration collaborators fed by the finished summary.
//!
//! Speech synthesis and video rendering backends live outside this crate. Both are optional
//! and their failures never fail a document: the pipeline records `has_audio`/`has_video`
//! accordingly.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure reported by a media backend.
#[derive(Debug, Error)]
#[error("{backend} rendering failed: {message}")]
pub struct RenderError {
    /// Backend name, for logs.
    pub backend: String,
    /// Backend-provided description.
    pub message: String,
}

impl RenderError {
    /// Build an error for `backend`.
    pub fn new(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

/// Turns summary text into an audio narration.
#[async_trait]
pub trait SpeechRenderer {
    /// Write narration for `summary` into `out_dir`, returning the file written, if any.
    async fn render(&self, summary: &str, out_dir: &Path) -> Result<Option<PathBuf>, RenderError>;
}

/// Turns summary text, and optionally its narration, into a video.
#[async_trait]
pub trait VideoRenderer {
    /// Write a video for `summary` into `out_dir`, returning the file written, if any.
    async fn render(
        &self,
        summary: &str,
        audio: Option<&Path>,
        out_dir: &Path,
    ) -> Result<Option<PathBuf>, RenderError>;
}
