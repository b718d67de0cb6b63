#![deny(missing_docs)]

//! Core library for offline PDF question answering and summarization.

/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Page extraction and OCR backfill seams.
pub mod extract;
/// Per-document vector index lifecycle.
pub mod index;
/// Chat-completion client for the local language model.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Speech and video collaborators.
pub mod media;
/// Pipeline activity counters.
pub mod metrics;
/// Staged document processing and query entry points.
pub mod pipeline;
/// Text hygiene, chunking, and token counting.
pub mod processing;
/// Retrieval, citations, and grounded answering.
pub mod rag;
/// Persisted document artifacts.
pub mod storage;
/// Map-reduce summarization.
pub mod summarize;
