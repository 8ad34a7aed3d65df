//! Query routing
//!
//! Classifies a question into a retrieval strategy with an ordered rule list
//! (first match wins) and extracts the known entities it mentions.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tai_common::cancel::{guarded, CancellationToken};
use tai_common::llm::LlmClient;
use tai_common::metrics;

/// Available search strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    Local,
    Global,
    Prerequisite,
    Hybrid,
}

impl SearchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStrategy::Local => "local",
            SearchStrategy::Global => "global",
            SearchStrategy::Prerequisite => "prerequisite",
            SearchStrategy::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classification rule: any cue present selects the strategy
#[derive(Debug, Clone)]
pub struct RoutingRule {
    pub cues: Vec<String>,
    pub strategy: SearchStrategy,
    pub query_type: String,
}

impl RoutingRule {
    pub fn new(cues: &[&str], strategy: SearchStrategy, query_type: &str) -> Self {
        Self {
            cues: cues.iter().map(|c| c.to_lowercase()).collect(),
            strategy,
            query_type: query_type.to_string(),
        }
    }

    fn matches(&self, query_lower: &str) -> bool {
        self.cues.iter().any(|cue| query_lower.contains(cue.as_str()))
    }
}

/// Rules in precedence order: global, prerequisite, code, relationship
pub fn default_rules() -> Vec<RoutingRule> {
    vec![
        RoutingRule::new(
            &["what are the main", "summarize", "compare all", "overview", "themes"],
            SearchStrategy::Global,
            "global",
        ),
        RoutingRule::new(
            &["what before", "prerequisite", "need to know", "what do i need"],
            SearchStrategy::Prerequisite,
            "prerequisite",
        ),
        RoutingRule::new(
            &["implement", "code", "debug", "write", "function", "algorithm"],
            SearchStrategy::Hybrid,
            "code",
        ),
        RoutingRule::new(
            &["how does", "relate", "compare", "difference between"],
            SearchStrategy::Local,
            "relationship",
        ),
    ]
}

/// Routing decision for one question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingResult {
    pub strategy: SearchStrategy,
    pub entities: Vec<String>,
    pub query_type: String,
}

/// Routes questions to a search strategy
pub struct QueryRouter {
    rules: Vec<RoutingRule>,
    known_entities: Vec<String>,
    llm: Option<Arc<dyn LlmClient>>,
}

impl QueryRouter {
    /// Router with the default rules; `llm` backs entity extraction when keywords find none
    pub fn new(known_entities: Vec<String>, llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self::with_rules(default_rules(), known_entities, llm)
    }

    pub fn with_rules(
        rules: Vec<RoutingRule>,
        known_entities: Vec<String>,
        llm: Option<Arc<dyn LlmClient>>,
    ) -> Self {
        Self {
            rules,
            known_entities,
            llm,
        }
    }

    /// Classify `query` and extract entities. Never fails.
    #[tracing::instrument(skip_all)]
    pub async fn route(&self, query: &str, cancel: &CancellationToken) -> RoutingResult {
        let (strategy, query_type) = self.classify(query);
        let mut entities = self.keyword_entities(query);

        if strategy == SearchStrategy::Local && entities.is_empty() {
            entities = self.llm_entities(query, cancel).await;
        }

        metrics::record_route(strategy.as_str(), &query_type);
        tracing::info!(
            strategy = %strategy,
            query_type = %query_type,
            entities = entities.len(),
            "query routed"
        );

        RoutingResult {
            strategy,
            entities,
            query_type,
        }
    }

    /// First matching rule wins; LOCAL/"local" otherwise
    pub fn classify(&self, query: &str) -> (SearchStrategy, String) {
        let query_lower = query.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&query_lower))
            .map(|rule| (rule.strategy, rule.query_type.clone()))
            .unwrap_or((SearchStrategy::Local, "local".to_string()))
    }

    /// Known entities mentioned in `query`, in vocabulary order
    pub fn keyword_entities(&self, query: &str) -> Vec<String> {
        let query_lower = query.to_lowercase();
        let mut found: Vec<String> = Vec::new();
        for entity in &self.known_entities {
            if query_lower.contains(&entity.to_lowercase()) && !found.contains(entity) {
                found.push(entity.clone());
            }
        }
        found
    }

    async fn llm_entities(&self, query: &str, cancel: &CancellationToken) -> Vec<String> {
        let Some(llm) = &self.llm else {
            return Vec::new();
        };

        let prompt = format!(
            "Extract entity/concept names from this query about distributed systems:\n\n\
             Query: {}\n\n\
             Return a JSON array of entity names found in the query. If none found, return empty array [].",
            query
        );

        match guarded(cancel, llm.get_structured_completion(&prompt, &entities_schema(), None)).await {
            Ok(value) => value
                .get("entities")
                .and_then(Value::as_array)
                .map(|names| {
                    names
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "LLM entity extraction failed");
                Vec::new()
            }
        }
    }
}

fn entities_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "entities": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["entities"],
        "additionalProperties": false
    })
}
