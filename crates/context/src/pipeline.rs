//! Question-to-context pipeline
//!
//! Provides:
//! - Routing and strategy dispatch for one question
//! - The cited retrieval block and the budgeted message list
//! - An explicit "no information" context when nothing is retrieved

use serde::Serialize;
use std::sync::Arc;
use tai_common::cancel::{ensure_active, CancellationToken};
use tai_common::config::{AppConfig, TokenBudget};
use tai_common::context::{ContextBuilder, ContextManager};
use tai_common::embeddings::Embedder;
use tai_common::errors::Result;
use tai_common::graph::GraphClient;
use tai_common::llm::LlmClient;
use tai_common::models::{ChatMessage, RetrievalResult, Session};
use tai_common::tokens::Tokenizer;
use tai_search::{QueryRouter, RoutingResult, SearchEngines, VectorIndex};

/// Context line used when retrieval finds nothing
pub const NO_RELEVANT_MATERIAL: &str = "No relevant course material was found for this question.";

/// Everything the answering model needs for one question
#[derive(Debug, Clone, Serialize)]
pub struct PreparedContext {
    pub routing: RoutingResult,
    pub results: Vec<RetrievalResult>,
    /// Cited retrieval block, within the retrieval budget
    pub context_text: String,
    /// System message, pruned history, then the question itself
    pub messages: Vec<ChatMessage>,
}

/// Router, searches, and context assembly wired together
pub struct RetrievalPipeline {
    router: QueryRouter,
    engines: SearchEngines,
    tokenizer: Arc<dyn Tokenizer>,
    builder: ContextBuilder,
    manager: ContextManager,
    budget: TokenBudget,
}

impl RetrievalPipeline {
    pub fn new(
        router: QueryRouter,
        engines: SearchEngines,
        tokenizer: Arc<dyn Tokenizer>,
        budget: TokenBudget,
        min_truncation: usize,
    ) -> Self {
        Self {
            router,
            engines,
            builder: ContextBuilder::new(tokenizer.clone(), min_truncation),
            manager: ContextManager::new(tokenizer.clone(), budget, min_truncation),
            tokenizer,
            budget,
        }
    }

    /// Wire a pipeline from configuration and collaborator clients
    pub fn from_config(
        config: &AppConfig,
        graph: Arc<dyn GraphClient>,
        embedder: Arc<dyn Embedder>,
        extraction_llm: Arc<dyn LlmClient>,
        reasoning_llm: Arc<dyn LlmClient>,
        tokenizer: Arc<dyn Tokenizer>,
        vector_index: Option<Arc<dyn VectorIndex>>,
    ) -> Self {
        let retrieval = &config.retrieval;
        let router = QueryRouter::new(retrieval.known_entities.clone(), Some(extraction_llm));
        let engines = SearchEngines::new(
            graph,
            embedder,
            reasoning_llm,
            tokenizer.clone(),
            vector_index,
            retrieval,
        );
        Self::new(
            router,
            engines,
            tokenizer,
            config.budget,
            retrieval.min_truncation_tokens,
        )
    }

    #[tracing::instrument(skip_all)]
    pub async fn prepare(
        &self,
        question: &str,
        session: &Session,
        profile: &str,
        system_prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<PreparedContext> {
        let routing = self.router.route(question, cancel).await;
        ensure_active(cancel)?;

        let search = self.engines.get_search_instance(routing.strategy);
        let results = search.retrieve(question, None, cancel).await?;

        let context_text = if results.is_empty() {
            tracing::info!(strategy = %routing.strategy, "no course material retrieved");
            NO_RELEVANT_MATERIAL.to_string()
        } else {
            self.builder.build(&results, self.budget.retrieval_context)
        };

        // The cited block goes into the system message as a single item
        let cited = [RetrievalResult::new(context_text.clone(), 1.0, "context")];
        let mut messages = self
            .manager
            .build_context(session, &cited, profile, system_prompt);
        messages.push(ChatMessage::user(
            self.tokenizer.truncate(question, self.budget.current_turn),
        ));

        tracing::info!(
            strategy = %routing.strategy,
            search = search.name(),
            results = results.len(),
            messages = messages.len(),
            "context prepared"
        );

        Ok(PreparedContext {
            routing,
            results,
            context_text,
            messages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tai_common::errors::AppError;
    use tai_common::models::Role;
    use tai_common::testing::{InMemoryGraph, ScriptedLlm, StaticEmbedder};
    use tai_common::tokens::TiktokenTokenizer;
    use tai_search::SearchStrategy;

    const QUESTION: &str = "How does Raft relate to Paxos?";

    fn pipeline(graph: InMemoryGraph, llm: ScriptedLlm) -> RetrievalPipeline {
        let embedder = StaticEmbedder::new(2)
            .with(QUESTION, vec![1.0, 0.0])
            .with("Raft Leader-based consensus", vec![0.9, 0.435_889_9])
            .with("Paxos Quorum-based consensus", vec![0.8, 0.6]);
        let config = AppConfig::default();
        let llm: Arc<dyn LlmClient> = Arc::new(llm);
        RetrievalPipeline::from_config(
            &config,
            Arc::new(graph),
            Arc::new(embedder),
            llm.clone(),
            llm,
            Arc::new(TiktokenTokenizer::cl100k().unwrap()),
            None,
        )
    }

    fn course_graph() -> InMemoryGraph {
        InMemoryGraph::new()
            .concept("c1", "Raft", "Leader-based consensus")
            .concept("c2", "Paxos", "Quorum-based consensus")
            .edge("c1", "Paxos", "ALTERNATIVE_TO")
    }

    #[tokio::test]
    async fn test_local_question_end_to_end() {
        let session = Session {
            messages: vec![
                ChatMessage::user("What is consensus?"),
                ChatMessage::assistant("Agreement among nodes."),
            ],
        };
        let prepared = pipeline(course_graph(), ScriptedLlm::new())
            .prepare(QUESTION, &session, "Knows basic networking.", "You are TAi.", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(prepared.routing.strategy, SearchStrategy::Local);
        assert_eq!(prepared.routing.query_type, "relationship");
        assert_eq!(prepared.results.len(), 2);
        assert!(prepared.context_text.starts_with("[Source 1: graph]\n**Raft**"));

        let system = &prepared.messages[0];
        assert_eq!(system.role, Role::System);
        assert!(system.content.contains("## Student Profile\nKnows basic networking."));
        assert!(system
            .content
            .contains("## Relevant Course Content\n[Source 1: graph]\n**Raft**"));
        assert!(system.content.contains("[Source 2: graph]\n**Paxos**"));
        assert_eq!(prepared.messages.len(), 4);
        assert_eq!(prepared.messages[3], ChatMessage::user(QUESTION));
    }

    #[tokio::test]
    async fn test_system_message_carries_source_labels() {
        let graph = InMemoryGraph::new().concept("c1", "Raft", "Leader-based consensus");
        let prepared = pipeline(graph, ScriptedLlm::new())
            .prepare(QUESTION, &Session::default(), "", "You are TAi.", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            prepared.context_text,
            "[Source 1: graph]\n**Raft**: Leader-based consensus\n\nEntities: Raft"
        );
        assert_eq!(
            prepared.messages[0].content,
            format!("You are TAi.\n\n## Relevant Course Content\n{}", prepared.context_text)
        );
    }

    #[tokio::test]
    async fn test_nothing_retrieved_is_explicit() {
        let prepared = pipeline(InMemoryGraph::new(), ScriptedLlm::new())
            .prepare(QUESTION, &Session::default(), "", "You are TAi.", &CancellationToken::new())
            .await
            .unwrap();

        assert!(prepared.results.is_empty());
        assert_eq!(prepared.context_text, NO_RELEVANT_MATERIAL);
        assert!(prepared.messages[0].content.ends_with(NO_RELEVANT_MATERIAL));
    }

    #[tokio::test]
    async fn test_global_question_uses_communities() {
        let graph = course_graph().community("comm-1", "Raft and Paxos reach consensus.", 4);
        let llm = ScriptedLlm::new()
            .on("Synthesize", "Consensus protocols agree on a log.")
            .on("Raft and Paxos", "They replicate logs. Relevance: 0.9");
        let prepared = pipeline(graph, llm)
            .prepare("Summarize the main themes", &Session::default(), "", "You are TAi.", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(prepared.routing.strategy, SearchStrategy::Global);
        assert_eq!(
            prepared.context_text,
            "[Source 1: community_summaries]\nConsensus protocols agree on a log."
        );
    }

    #[tokio::test]
    async fn test_graph_failure_propagates() {
        let err = pipeline(course_graph().unavailable(), ScriptedLlm::new())
            .prepare(QUESTION, &Session::default(), "", "You are TAi.", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Graph { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_request() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = pipeline(course_graph(), ScriptedLlm::new())
            .prepare(QUESTION, &Session::default(), "", "You are TAi.", &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
