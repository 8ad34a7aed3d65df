//! Full LLM context: one budgeted system message plus pruned history

use super::pack_joined;
use crate::config::TokenBudget;
use crate::metrics;
use crate::models::{ChatMessage, RetrievalResult, Session};
use crate::tokens::{fit_to_budget, Fit, Tokenizer};
use std::sync::Arc;

/// Assembles the message list sent to the answering model
pub struct ContextManager {
    tokenizer: Arc<dyn Tokenizer>,
    budget: TokenBudget,
    min_truncation: usize,
}

impl ContextManager {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, budget: TokenBudget, min_truncation: usize) -> Self {
        Self {
            tokenizer,
            budget,
            min_truncation,
        }
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    /// System message followed by the history that fits its budget
    pub fn build_context(
        &self,
        session: &Session,
        retrieval_results: &[RetrievalResult],
        profile: &str,
        system_prompt: &str,
    ) -> Vec<ChatMessage> {
        let system = self.system_content(system_prompt, profile, retrieval_results);
        let history = self.prune_history(&session.messages, self.budget.conversation_history);

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(system));
        messages.extend(history);
        messages
    }

    fn system_content(
        &self,
        base_prompt: &str,
        profile: &str,
        retrieval_results: &[RetrievalResult],
    ) -> String {
        let mut parts = vec![base_prompt.to_string()];

        if !profile.is_empty() {
            let profile = self.tokenizer.truncate(profile, self.budget.student_profile);
            parts.push(format!("## Student Profile\n{}", profile));
        }

        if !retrieval_results.is_empty() {
            let retrieval = pack_joined(
                self.tokenizer.as_ref(),
                retrieval_results.iter().map(|r| r.text.clone()),
                "\n\n",
                self.budget.retrieval_context,
                self.min_truncation,
            );
            if !retrieval.is_empty() {
                parts.push(format!("## Relevant Course Content\n{}", retrieval));
            }
        }

        let full = parts.join("\n\n");
        let content = self.tokenizer.truncate(&full, self.budget.system_message());

        metrics::record_context_tokens("system", self.tokenizer.count_tokens(&content));
        content
    }

    /// Keep the newest messages that fit in `max_tokens`.
    ///
    /// The oldest kept message may be truncated; everything older is dropped.
    /// Chronological order is preserved.
    pub fn prune_history(&self, messages: &[ChatMessage], max_tokens: usize) -> Vec<ChatMessage> {
        let mut kept = Vec::new();
        let mut used = 0usize;

        for message in messages.iter().rev() {
            let remaining = max_tokens.saturating_sub(used);
            match fit_to_budget(
                self.tokenizer.as_ref(),
                &message.content,
                remaining,
                self.min_truncation,
            ) {
                Ok(Fit::Whole(content)) => {
                    used += self.tokenizer.count_tokens(&content);
                    kept.push(ChatMessage::new(message.role, content));
                }
                Ok(Fit::Truncated(content)) => {
                    used += self.tokenizer.count_tokens(&content);
                    kept.push(ChatMessage::new(message.role, content));
                    break;
                }
                Err(e) => {
                    tracing::debug!(kept = kept.len(), error = %e, "history pruned");
                    break;
                }
            }
        }

        kept.reverse();
        metrics::record_context_tokens("history", used);
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::tokens::{TiktokenTokenizer, MIN_TRUNCATION_TOKENS};

    fn manager(budget: TokenBudget) -> (ContextManager, Arc<TiktokenTokenizer>) {
        let tok = Arc::new(TiktokenTokenizer::cl100k().unwrap());
        (ContextManager::new(tok.clone(), budget, MIN_TRUNCATION_TOKENS), tok)
    }

    /// Roughly 50 tokens: "alpha" plus a space is a single cl100k token
    fn message(role: Role, tag: &str) -> ChatMessage {
        ChatMessage::new(role, format!("{}{}", tag, " alpha".repeat(49)))
    }

    #[test]
    fn test_three_messages_under_120_tokens_keep_two_newest() {
        let (manager, tok) = manager(TokenBudget::default());
        let history = vec![
            message(Role::User, "first"),
            message(Role::Assistant, "second"),
            message(Role::User, "third"),
        ];
        for m in &history {
            let count = tok.count_tokens(&m.content);
            assert!((45..=55).contains(&count), "message has {} tokens", count);
        }

        let pruned = manager.prune_history(&history, 120);
        assert_eq!(pruned.len(), 2);
        assert!(pruned[0].content.starts_with("second"));
        assert!(pruned[1].content.starts_with("third"));
    }

    #[test]
    fn test_oldest_kept_message_is_truncated_when_room_allows() {
        let (manager, tok) = manager(TokenBudget::default());
        let history = vec![
            ChatMessage::user("old ".repeat(400)),
            ChatMessage::assistant("recent answer"),
        ];
        let pruned = manager.prune_history(&history, 300);
        assert_eq!(pruned.len(), 2);
        assert_eq!(pruned[1].content, "recent answer");
        let total: usize = pruned.iter().map(|m| tok.count_tokens(&m.content)).sum();
        assert!(total <= 300);
    }

    #[test]
    fn test_empty_history() {
        let (manager, _) = manager(TokenBudget::default());
        assert!(manager.prune_history(&[], 8000).is_empty());
    }

    #[test]
    fn test_system_message_sections() {
        let (manager, _) = manager(TokenBudget::default());
        let session = Session {
            messages: vec![ChatMessage::user("What is Raft?")],
        };
        let results = vec![RetrievalResult::new("Raft is a consensus protocol.", 0.9, "graph")];

        let messages = manager.build_context(&session, &results, "Prefers examples.", "You are TAi.");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(
            messages[0].content,
            "You are TAi.\n\n## Student Profile\nPrefers examples.\n\n## Relevant Course Content\nRaft is a consensus protocol."
        );
        assert_eq!(messages[1].content, "What is Raft?");
    }

    #[test]
    fn test_profile_and_system_caps_hold() {
        let budget = TokenBudget {
            system_prompt: 50,
            student_profile: 20,
            retrieval_context: 150,
            ..Default::default()
        };
        let (manager, tok) = manager(budget);
        let results = vec![
            RetrievalResult::new("gossip ".repeat(100), 0.9, "graph"),
            RetrievalResult::new("vector clocks ".repeat(300), 0.8, "graph"),
        ];
        let messages = manager.build_context(
            &Session::default(),
            &results,
            &"likes diagrams ".repeat(100),
            &"Be concise. ".repeat(100),
        );
        assert_eq!(messages.len(), 1);
        assert!(tok.count_tokens(&messages[0].content) <= budget.system_message());
    }
}
