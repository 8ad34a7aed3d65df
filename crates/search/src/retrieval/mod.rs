//! Retrieval strategies
//!
//! Provides three search implementations behind a strategy-keyed factory:
//! - Local search (entity-seeded graph neighborhoods)
//! - Global search (map-reduce over community summaries)
//! - Hybrid search (weighted fusion of local + vector)

mod fusion;
mod global;
mod hybrid;
mod local;
mod vector;

pub use fusion::WeightedFusion;
pub use global::{
    extract_relevance_score, GlobalSearch, GlobalSearchResult, MapPhaseStats, NO_COMMUNITY_DATA,
    NO_INFORMATION_ANSWER,
};
pub use hybrid::HybridSearch;
pub use local::LocalSearch;
pub use vector::VectorIndex;

use crate::router::SearchStrategy;
use serde_json::json;
use std::sync::Arc;
use tai_common::cancel::CancellationToken;
use tai_common::config::RetrievalConfig;
use tai_common::embeddings::Embedder;
use tai_common::errors::Result;
use tai_common::graph::GraphClient;
use tai_common::llm::LlmClient;
use tai_common::models::RetrievalResult;
use tai_common::tokens::Tokenizer;

/// Source label for global answers
pub const COMMUNITY_SOURCE: &str = "community_summaries";

/// The search implementation chosen for one question
#[derive(Clone)]
pub enum SearchInstance {
    Local(Arc<LocalSearch>),
    Global(Arc<GlobalSearch>),
    Hybrid(Arc<HybridSearch>),
}

impl SearchInstance {
    pub fn name(&self) -> &'static str {
        match self {
            SearchInstance::Local(_) => "local",
            SearchInstance::Global(_) => "global",
            SearchInstance::Hybrid(_) => "hybrid",
        }
    }

    /// Run the search and normalize its output to ranked results.
    ///
    /// A global answer becomes a single result citing its communities.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievalResult>> {
        match self {
            SearchInstance::Local(search) => search.search(query, top_k, cancel).await,
            SearchInstance::Hybrid(search) => search.search(query, top_k, cancel).await,
            SearchInstance::Global(search) => {
                let global = search.search(query, cancel).await?;
                if global.synthesized_answer.is_empty() {
                    return Ok(Vec::new());
                }
                Ok(vec![RetrievalResult::new(
                    global.synthesized_answer,
                    1.0,
                    COMMUNITY_SOURCE,
                )
                .with_metadata("communities_used", json!(global.communities_used))
                .with_metadata("relevance_scores", json!(global.relevance_scores))])
            }
        }
    }
}

/// Owns one instance of each search and hands them out by strategy
pub struct SearchEngines {
    local: Arc<LocalSearch>,
    global: Arc<GlobalSearch>,
    hybrid: Arc<HybridSearch>,
}

impl SearchEngines {
    /// `llm` serves the map-reduce phases; `vector_index` opts the hybrid
    /// search into a real semantic branch
    pub fn new(
        graph: Arc<dyn GraphClient>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LlmClient>,
        tokenizer: Arc<dyn Tokenizer>,
        vector_index: Option<Arc<dyn VectorIndex>>,
        config: &RetrievalConfig,
    ) -> Self {
        let local = Arc::new(LocalSearch::new(
            graph.clone(),
            embedder.clone(),
            tokenizer,
            config.clone(),
        ));
        let global = Arc::new(GlobalSearch::new(graph, llm, config.clone()));
        let hybrid = Arc::new(HybridSearch::new(
            local.clone(),
            embedder,
            vector_index,
            WeightedFusion::new(config.hybrid_graph_weight, config.hybrid_vector_weight),
            config.top_k,
        ));

        Self {
            local,
            global,
            hybrid,
        }
    }

    /// Prerequisite questions are served by local search
    pub fn get_search_instance(&self, strategy: SearchStrategy) -> SearchInstance {
        match strategy {
            SearchStrategy::Global => SearchInstance::Global(self.global.clone()),
            SearchStrategy::Hybrid => SearchInstance::Hybrid(self.hybrid.clone()),
            SearchStrategy::Local | SearchStrategy::Prerequisite => {
                SearchInstance::Local(self.local.clone())
            }
        }
    }
}
