//! Request-scoped data shared by search and context assembly

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One retrieved piece of course material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Formatted text handed to the context builder
    pub text: String,

    /// Relevance score, higher is better
    pub score: f32,

    /// Provenance label (e.g. "graph", "vector", "community_summaries")
    pub source: String,

    /// Entity names involved; the first one is the primary entity
    pub entities: Vec<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RetrievalResult {
    pub fn new(text: impl Into<String>, score: f32, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            score,
            source: source.into(),
            entities: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_entities(mut self, entities: Vec<String>) -> Self {
        self.entities = entities;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// The entity a result is about, if any
    pub fn primary_entity(&self) -> Option<&str> {
        self.entities.first().map(String::as_str)
    }
}

/// Sort results by score, highest first, keeping input order for ties
pub fn sort_by_score_desc(results: &mut [RetrievalResult]) {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in an LLM conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Conversation state handed in by the session store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_is_stable_and_descending() {
        let mut results = vec![
            RetrievalResult::new("a", 0.5, "graph"),
            RetrievalResult::new("b", 0.9, "graph"),
            RetrievalResult::new("c", 0.5, "graph"),
        ];
        sort_by_score_desc(&mut results);
        let order: Vec<_> = results.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
