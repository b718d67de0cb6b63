use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdf_rag::{
    config, embedding,
    extract::{OcrBackfill, PagesFileExtractor},
    llm::OllamaChatClient,
    logging,
    pipeline::DocumentPipeline,
    processing::SummaryMode,
    storage::{FsDocumentStore, document_id_from_bytes},
};
use serde_json::json;

#[derive(Parser)]
#[command(
    name = "pdf-rag",
    about = "Ask questions about and summarize documents with a local Ollama model"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, index, and summarize a document from a `{"pages": [...]}` file.
    Process {
        #[arg(long)]
        pages: PathBuf,
        #[arg(long)]
        filename: Option<String>,
        /// Defaults to the content hash of the pages file.
        #[arg(long)]
        doc_id: Option<String>,
    },
    /// Answer a question grounded in a processed document.
    Ask {
        #[arg(long = "doc")]
        doc_id: String,
        question: String,
    },
    /// Print (and cache) the summary of a processed document.
    Summary {
        #[arg(long = "doc")]
        doc_id: String,
        #[arg(long, default_value_t = SummaryMode::Detailed)]
        mode: SummaryMode,
    },
    /// Print the processing status of a document.
    Status {
        #[arg(long = "doc")]
        doc_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::init_config().context("Failed to load configuration")?;
    logging::init_tracing();
    let cli = Cli::parse();

    let chat = Arc::new(OllamaChatClient::new(&config.llm));
    let embedder = embedding::build_embedding_client(&config.embedding);
    let repository = Arc::new(FsDocumentStore::new(config.storage.docs_dir()));
    // No OCR engine is linked into the CLI; empty pages stay empty.
    let extractor = Arc::new(OcrBackfill::new(
        PagesFileExtractor::new(),
        None,
        config.extraction.ocr_empty_pages,
    ));
    let pipeline = DocumentPipeline::new(config, repository, extractor, chat, embedder);

    match cli.command {
        Command::Process {
            pages,
            filename,
            doc_id,
        } => {
            let doc_id = match doc_id {
                Some(doc_id) => doc_id,
                None => {
                    let bytes = tokio::fs::read(&pages)
                        .await
                        .with_context(|| format!("Failed to read {}", pages.display()))?;
                    document_id_from_bytes(&bytes)
                }
            };
            let filename = filename.or_else(|| {
                pages
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            });
            let status = pipeline
                .process(&doc_id, &pages, filename)
                .await
                .with_context(|| format!("Failed to process document {doc_id}"))?;
            print_json(&json!({ "doc_id": doc_id, "status": status }))?;
        }
        Command::Ask { doc_id, question } => {
            let answer = pipeline.ask(&doc_id, &question).await?;
            print_json(&json!({ "answer": answer.text, "sources": answer.citations }))?;
        }
        Command::Summary { doc_id, mode } => {
            let summary = pipeline.summary(&doc_id, mode).await?;
            print_json(&json!({ "doc_id": doc_id, "mode": mode, "summary": summary }))?;
        }
        Command::Status { doc_id } => {
            let status = pipeline.status(&doc_id).await?;
            print_json(&status)?;
        }
    }

    tracing::debug!(metrics = ?pipeline.metrics_snapshot(), "Command finished");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{rendered}");
    Ok(())
}
