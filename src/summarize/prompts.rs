//! Instructions sent to the chat backend during map and reduce phases.

use crate::processing::types::SummaryMode;

const PLAIN_TEXT_RULE: &str =
    "Write plain text only: no markdown, no headings, no bullet points, no bold or italics.";

pub(super) fn map_system(mode: SummaryMode) -> String {
    let role = match mode {
        SummaryMode::Brief => "You write brief, concise summaries of document sections.",
        SummaryMode::Detailed => "You write detailed summaries of document sections.",
    };
    format!("{role} {PLAIN_TEXT_RULE}")
}

pub(super) fn map_prompt(mode: SummaryMode, chunk: &str) -> String {
    let shape = match mode {
        SummaryMode::Brief => "a single paragraph of 3 to 5 sentences",
        SummaryMode::Detailed => {
            "flowing prose of one or more paragraphs that keeps the key points and important details"
        }
    };
    format!("Summarize the following section as {shape}.\n\nSection:\n{chunk}")
}

pub(super) fn reduce_system() -> String {
    format!("You combine partial summaries of one document into a coherent whole. {PLAIN_TEXT_RULE}")
}

pub(super) fn reduce_prompt(mode: SummaryMode, summaries: &[String]) -> String {
    let shape = match mode {
        SummaryMode::Brief => "one brief, coherent paragraph of 3 to 5 sentences",
        SummaryMode::Detailed => {
            "one detailed, coherent summary in flowing paragraphs that keeps every key point"
        }
    };
    let parts = summaries
        .iter()
        .enumerate()
        .map(|(index, summary)| format!("[Part {}]\n{}", index + 1, summary.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "The following are summaries of consecutive sections of a document. \
         Combine them into {shape}.\n\n{parts}"
    )
}
