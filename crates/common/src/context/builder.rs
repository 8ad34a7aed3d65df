//! Renders retrieval results into a cited, budgeted context block

use super::pack_joined;
use crate::metrics;
use crate::models::RetrievalResult;
use crate::tokens::Tokenizer;
use std::sync::Arc;

/// Entities listed per result
const MAX_LISTED_ENTITIES: usize = 5;

/// Context builder for LLM prompts
pub struct ContextBuilder {
    tokenizer: Arc<dyn Tokenizer>,
    min_truncation: usize,
}

impl ContextBuilder {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, min_truncation: usize) -> Self {
        Self {
            tokenizer,
            min_truncation,
        }
    }

    /// Render results, best first, into at most `budget` tokens
    pub fn build(&self, results: &[RetrievalResult], budget: usize) -> String {
        let mut sorted: Vec<&RetrievalResult> = results.iter().collect();
        sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

        let formatted = sorted
            .into_iter()
            .enumerate()
            .map(|(i, result)| format_result(result, i + 1));

        let context = pack_joined(
            self.tokenizer.as_ref(),
            formatted,
            "\n\n",
            budget,
            self.min_truncation,
        );

        let tokens = self.tokenizer.count_tokens(&context);
        metrics::record_context_tokens("retrieval", tokens);
        tracing::debug!(results = results.len(), tokens, budget, "context built");

        context
    }
}

fn format_result(result: &RetrievalResult, citation: usize) -> String {
    let mut block = format!("[Source {}: {}]\n{}", citation, result.source, result.text);
    if !result.entities.is_empty() {
        let listed: Vec<&str> = result
            .entities
            .iter()
            .take(MAX_LISTED_ENTITIES)
            .map(String::as_str)
            .collect();
        block.push_str("\n\nEntities: ");
        block.push_str(&listed.join(", "));
    }
    block
}
