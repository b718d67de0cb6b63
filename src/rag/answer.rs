use serde::Serialize;

use super::{Evidence, build_citations};
use crate::llm::SharedChatClient;
use crate::processing::tokens::TokenCounter;

/// Reply used when no evidence was retrieved for a question.
pub const NOT_FOUND_ANSWER: &str = "I could not find the answer to this question in the document.";

const ANSWER_TEMPERATURE: f32 = 0.2;

const GROUNDING_INSTRUCTION: &str = "You answer questions about a single document. \
Use ONLY the evidence passages provided in the prompt. \
If the evidence does not contain the answer, say explicitly that the document does not contain it. \
Tag every claim with the label of the passage that supports it, written in square brackets, \
for example [p3:c1]. Do not invent labels and do not use outside knowledge.";

/// Answer text and the citations of the evidence it was grounded on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    /// Model reply, the not-found sentinel, or a soft-failure message.
    pub text: String,
    /// Deduplicated citation tags in evidence order.
    pub citations: Vec<String>,
}

/// Builds context-bounded prompts from evidence and asks the chat backend for a grounded answer.
pub struct GroundedAnswerer {
    chat: SharedChatClient,
    token_counter: TokenCounter,
    context_budget: usize,
    max_citations: Option<usize>,
}

impl GroundedAnswerer {
    /// Create an answerer whose evidence block stays within `context_budget` tokens.
    pub fn new(chat: SharedChatClient, token_counter: TokenCounter, context_budget: usize) -> Self {
        Self {
            chat,
            token_counter,
            context_budget,
            max_citations: None,
        }
    }

    /// Cap the number of citations returned with each answer.
    pub fn with_max_citations(mut self, max_citations: Option<usize>) -> Self {
        self.max_citations = max_citations;
        self
    }

    /// Answer `question` from `evidence` only.
    ///
    /// Empty evidence short-circuits to [`NOT_FOUND_ANSWER`] without contacting the backend.
    /// Backend failures are reported in the answer text rather than as an error.
    pub async fn answer(&self, question: &str, evidence: &[Evidence]) -> Answer {
        if evidence.is_empty() {
            tracing::info!("No evidence retrieved; returning not-found answer");
            return Answer {
                text: NOT_FOUND_ANSWER.to_string(),
                citations: Vec::new(),
            };
        }

        let (context, included) = self.build_context(evidence);
        let citations = build_citations(&evidence[..included], self.max_citations);
        let prompt = format!(
            "Evidence:\n\n{context}\n\nQuestion: {question}\n\n\
             Answer using only the evidence above and cite passage labels in square brackets."
        );

        tracing::debug!(
            evidence = evidence.len(),
            included,
            citations = citations.len(),
            "Requesting grounded answer"
        );

        match self
            .chat
            .chat(&prompt, Some(GROUNDING_INSTRUCTION), ANSWER_TEMPERATURE)
            .await
        {
            Ok(text) => Answer { text, citations },
            Err(error) => {
                tracing::warn!(error = %error, "Grounded answer generation failed");
                Answer {
                    text: format!("Unable to generate an answer: {error}"),
                    citations,
                }
            }
        }
    }

    /// Label passages and keep as many as fit the token budget. The first always fits.
    fn build_context(&self, evidence: &[Evidence]) -> (String, usize) {
        let mut blocks: Vec<String> = Vec::with_capacity(evidence.len());
        let mut used = 0;

        for (position, item) in evidence.iter().enumerate() {
            let block = format!(
                "[Source {} | {}]\n{}",
                position + 1,
                item.citation(),
                item.text.trim()
            );
            let cost = (self.token_counter)(&block);
            if !blocks.is_empty() && used + cost > self.context_budget {
                tracing::debug!(
                    dropped = evidence.len() - position,
                    budget = self.context_budget,
                    "Evidence truncated to fit context budget"
                );
                break;
            }
            used += cost;
            blocks.push(block);
        }

        let included = blocks.len();
        (blocks.join("\n\n"), included)
    }
}
