//! Chunked map-reduce summarization with hierarchical reduction.
//!
//! Long documents are summarized chunk by chunk (map), then partial summaries are merged in
//! batches of at most five per model call (reduce) until five or fewer remain, followed by one
//! final merge. No single prompt ever carries more than one batch of summaries.

mod prompts;

use crate::llm::SharedChatClient;
use crate::processing::chunking::ChunkProfile;
use crate::processing::sanitize::to_plain_text;
use crate::processing::types::{ChunkingError, SummaryMode};

/// Returned when the input text is blank.
pub const NO_CONTENT_SUMMARY: &str = "No content available to summarize.";
/// Returned when every chunk summary came back empty.
pub const FAILED_SUMMARY: &str = "Failed to generate summary.";
/// Maximum number of partial summaries merged by one reduce call.
pub const REDUCE_BATCH_SIZE: usize = 5;

const SUMMARY_TEMPERATURE: f32 = 0.3;
const FALLBACK_LINES: usize = 5;

/// Map-reduce summarizer over a chat backend.
pub struct MapReduceSummarizer {
    chat: SharedChatClient,
    profile: ChunkProfile,
    batch_size: usize,
}

impl MapReduceSummarizer {
    /// Create a summarizer chunking with `profile` (the detailed-mode base profile).
    pub fn new(chat: SharedChatClient, profile: ChunkProfile) -> Self {
        Self {
            chat,
            profile,
            batch_size: REDUCE_BATCH_SIZE,
        }
    }

    /// Summarize `text` in the requested mode.
    ///
    /// Model failures never abort the run: a failed chunk falls back to its first lines and a
    /// failed merge falls back to concatenating its inputs.
    pub async fn summarize(&self, text: &str, mode: SummaryMode) -> Result<String, ChunkingError> {
        if text.trim().is_empty() {
            return Ok(NO_CONTENT_SUMMARY.to_string());
        }

        let chunks = self.profile.for_mode(mode).split(text)?;
        if chunks.is_empty() {
            return Ok(NO_CONTENT_SUMMARY.to_string());
        }
        if chunks.len() == 1 {
            return Ok(self.summarize_chunk(&chunks[0], mode).await);
        }

        tracing::info!(chunks = chunks.len(), mode = %mode, "Summarizing chunks");
        let mut summaries = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            tracing::debug!(chunk = index + 1, total = chunks.len(), "Summarizing chunk");
            let summary = self.summarize_chunk(chunk, mode).await;
            if !summary.trim().is_empty() {
                summaries.push(summary);
            }
        }

        if summaries.is_empty() {
            tracing::warn!(mode = %mode, "Every chunk summary was empty");
            return Ok(FAILED_SUMMARY.to_string());
        }
        if summaries.len() <= self.batch_size {
            return Ok(summaries.join("\n\n"));
        }

        Ok(self.reduce_all(summaries, mode).await)
    }

    async fn summarize_chunk(&self, chunk: &str, mode: SummaryMode) -> String {
        let system = prompts::map_system(mode);
        match self
            .chat
            .chat(&prompts::map_prompt(mode, chunk), Some(&system), SUMMARY_TEMPERATURE)
            .await
        {
            Ok(summary) => to_plain_text(&summary),
            Err(error) => {
                tracing::warn!(error = %error, "Chunk summary failed; using leading lines");
                leading_lines(chunk)
            }
        }
    }

    async fn reduce_all(&self, mut summaries: Vec<String>, mode: SummaryMode) -> String {
        let mut round = 0;
        while summaries.len() > self.batch_size {
            round += 1;
            tracing::debug!(round, summaries = summaries.len(), "Reducing summary batches");
            let mut reduced = Vec::with_capacity(summaries.len().div_ceil(self.batch_size));
            for batch in summaries.chunks(self.batch_size) {
                if let [single] = batch {
                    reduced.push(single.clone());
                } else {
                    reduced.push(self.reduce_batch(batch, mode).await);
                }
            }
            summaries = reduced;
        }

        match summaries.as_slice() {
            [single] => single.clone(),
            batch => self.reduce_batch(batch, mode).await,
        }
    }

    async fn reduce_batch(&self, batch: &[String], mode: SummaryMode) -> String {
        let system = prompts::reduce_system();
        match self
            .chat
            .chat(&prompts::reduce_prompt(mode, batch), Some(&system), SUMMARY_TEMPERATURE)
            .await
        {
            Ok(summary) if !summary.trim().is_empty() => to_plain_text(&summary),
            Ok(_) => {
                tracing::warn!(batch = batch.len(), "Empty batch reduction; concatenating inputs");
                batch.join("\n\n")
            }
            Err(error) => {
                tracing::warn!(
                    batch = batch.len(),
                    error = %error,
                    "Batch reduction failed; concatenating inputs"
                );
                batch.join("\n\n")
            }
        }
    }
}

fn leading_lines(chunk: &str) -> String {
    chunk
        .lines()
        .take(FALLBACK_LINES)
        .collect::<Vec<_>>()
        .join(" ")
}
