//! Character-budget chunking with overlap.
//!
//! Text is cut on byte spans of the source, so every chunk is a contiguous slice of its page.
//! Segmentation prefers the coarsest boundary that keeps a piece within budget: paragraph
//! breaks, then line breaks, then sentence terminals, then whitespace, and finally raw
//! characters. Adjacent pieces are merged greedily while they fit. Sizes are counted in
//! characters.
//!
//! Overlap is applied after segmentation: base chunks are cut at `chunk_size - overlap` and each
//! chunk after the first starts up to `overlap` characters earlier, on a word boundary inside its
//! predecessor, so no chunk exceeds `chunk_size`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::LazyLock;

use super::types::{ChunkingError, PageText, SummaryMode};
use crate::index::{ChunkMetadata, ChunkRecord};

const BRIEF_MIN_CHUNK_SIZE: usize = 600;
const BRIEF_MIN_CHUNK_OVERLAP: usize = 100;

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t\r]*\n\s*").expect("valid paragraph regex"));
static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n]+[ \t]*").expect("valid line regex"));
static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[.!?…]+["'”’)\]]*\s+"#).expect("valid sentence regex")
});
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Boundaries from most to least preferred; a piece may start where a match ends.
static BOUNDARIES: [&LazyLock<Regex>; 4] =
    [&PARAGRAPH_BREAK, &LINE_BREAK, &SENTENCE_END, &WHITESPACE];

/// Target chunk size and overlap, both in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkProfile {
    /// Upper bound on characters per chunk.
    pub chunk_size: usize,
    /// Characters shared with the preceding chunk.
    pub chunk_overlap: usize,
}

impl ChunkProfile {
    /// Build a profile from explicit values.
    pub const fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Derive the profile for a summary mode from a detailed base profile.
    ///
    /// `Brief` halves both values, floored at 600 and 100 characters.
    pub fn for_mode(self, mode: SummaryMode) -> Self {
        match mode {
            SummaryMode::Detailed => self,
            SummaryMode::Brief => Self {
                chunk_size: (self.chunk_size / 2).max(BRIEF_MIN_CHUNK_SIZE),
                chunk_overlap: (self.chunk_overlap / 2).max(BRIEF_MIN_CHUNK_OVERLAP),
            },
        }
    }

    /// Split text according to this profile.
    pub fn split(&self, text: &str) -> Result<Vec<String>, ChunkingError> {
        split_text(text, self.chunk_size, self.chunk_overlap)
    }
}

/// Split text into ordered, overlapping chunks of at most `chunk_size` characters.
///
/// Returns an empty vector when the input is all whitespace. Overlap is clamped to half the
/// chunk size.
pub fn split_text(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let overlap = effective_overlap(chunk_size, chunk_overlap);
    let mut base = Vec::new();
    split_span(text, 0..text.len(), chunk_size - overlap, 0, &mut base);

    let chunks = base
        .iter()
        .enumerate()
        .map(|(index, span)| {
            let start = match index.checked_sub(1) {
                Some(previous) if overlap > 0 => {
                    overlap_start(text, &base[previous], span, overlap)
                }
                _ => span.start,
            };
            text[start..span.end].to_string()
        })
        .collect();
    Ok(chunks)
}

fn effective_overlap(chunk_size: usize, requested: usize) -> usize {
    let ceiling = chunk_size / 2;
    if requested > ceiling {
        tracing::debug!(
            chunk_size,
            requested,
            applied = ceiling,
            "Clamping chunk overlap"
        );
        ceiling
    } else {
        requested
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Shrink `span` so it neither starts nor ends with whitespace.
fn trimmed(text: &str, span: Range<usize>) -> Range<usize> {
    let slice = &text[span.clone()];
    let leading = slice.len() - slice.trim_start().len();
    let trailing = slice.trim_start().len() - slice.trim().len();
    (span.start + leading)..(span.end - trailing)
}

fn fits(text: &str, span: &Range<usize>, budget: usize) -> bool {
    char_len(text[span.clone()].trim()) <= budget
}

fn push_trimmed(text: &str, span: Range<usize>, out: &mut Vec<Range<usize>>) {
    let span = trimmed(text, span);
    if !span.is_empty() {
        out.push(span);
    }
}

/// Append budget-sized, trimmed spans of `span` to `out`, cutting at boundary `level` or finer.
fn split_span(
    text: &str,
    span: Range<usize>,
    budget: usize,
    level: usize,
    out: &mut Vec<Range<usize>>,
) {
    let span = trimmed(text, span);
    if span.is_empty() {
        return;
    }
    if fits(text, &span, budget) {
        out.push(span);
        return;
    }
    let Some(boundary) = BOUNDARIES.get(level) else {
        split_chars(text, span, budget, out);
        return;
    };

    let breaks: Vec<usize> = boundary
        .find_iter(&text[span.clone()])
        .map(|found| span.start + found.end())
        .filter(|&offset| offset < span.end)
        .collect();
    if breaks.is_empty() {
        split_span(text, span, budget, level + 1, out);
        return;
    }

    let mut piece_start = span.start;
    let mut open: Option<Range<usize>> = None;
    for piece_end in breaks.into_iter().chain(std::iter::once(span.end)) {
        let piece = piece_start..piece_end;
        piece_start = piece_end;

        if !fits(text, &piece, budget) {
            if let Some(pending) = open.take() {
                push_trimmed(text, pending, out);
            }
            split_span(text, piece, budget, level + 1, out);
            continue;
        }
        open = match open.take() {
            Some(pending) if fits(text, &(pending.start..piece.end), budget) => {
                Some(pending.start..piece.end)
            }
            Some(pending) => {
                push_trimmed(text, pending, out);
                Some(piece)
            }
            None => Some(piece),
        };
    }
    if let Some(pending) = open {
        push_trimmed(text, pending, out);
    }
}

/// Last resort for unbroken runs: cut every `budget` characters.
fn split_chars(text: &str, span: Range<usize>, budget: usize, out: &mut Vec<Range<usize>>) {
    let mut start = span.start;
    for (count, (offset, _)) in text[span.clone()].char_indices().enumerate() {
        if count > 0 && count % budget == 0 {
            push_trimmed(text, start..span.start + offset, out);
            start = span.start + offset;
        }
    }
    push_trimmed(text, start..span.end, out);
}

/// Byte offset where `current` should start so that it repeats up to `overlap` characters from
/// the end of `previous`, beginning on a word boundary.
fn overlap_start(
    text: &str,
    previous: &Range<usize>,
    current: &Range<usize>,
    overlap: usize,
) -> usize {
    let candidate = text[..current.start]
        .char_indices()
        .rev()
        .nth(overlap - 1)
        .map_or(0, |(offset, _)| offset)
        .max(previous.start);

    let mut start = candidate;
    let mid_word = start > previous.start
        && !text[..start].ends_with(char::is_whitespace)
        && !text[start..].starts_with(char::is_whitespace);
    if mid_word {
        start += text[start..]
            .find(char::is_whitespace)
            .unwrap_or(text.len() - start);
    }
    start += text[start..].len() - text[start..].trim_start().len();

    if start >= current.start {
        current.start
    } else {
        start
    }
}

/// Chunk every non-empty page and attach `(doc_id, page, chunk)` provenance.
///
/// Chunk indices restart at zero on each page.
pub fn chunk_pages(
    doc_id: &str,
    pages: &[PageText],
    profile: ChunkProfile,
) -> Result<Vec<ChunkRecord>, ChunkingError> {
    let mut records = Vec::new();
    for page in pages {
        if page.text.trim().is_empty() {
            continue;
        }
        for (index, chunk) in profile.split(&page.text)?.into_iter().enumerate() {
            records.push(ChunkRecord {
                text: chunk,
                metadata: ChunkMetadata {
                    doc_id: doc_id.to_string(),
                    page: page.page_number,
                    chunk: Some(index as u32),
                },
            });
        }
    }
    Ok(records)
}
