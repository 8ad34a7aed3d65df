//! Hybrid retrieval combining graph and vector search
//!
//! Runs both branches concurrently, then merges them with weighted fusion.

use super::fusion::WeightedFusion;
use super::local::LocalSearch;
use super::vector::VectorIndex;
use std::sync::Arc;
use tai_common::cancel::{guarded, CancellationToken};
use tai_common::embeddings::Embedder;
use tai_common::errors::Result;
use tai_common::metrics::SearchTimer;
use tai_common::models::RetrievalResult;

/// Hybrid retriever combining local graph search and a vector index
pub struct HybridSearch {
    local: Arc<LocalSearch>,
    embedder: Arc<dyn Embedder>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    fusion: WeightedFusion,
    default_top_k: usize,
}

impl HybridSearch {
    /// Without a vector index the semantic branch contributes nothing and
    /// output equals graph-only results.
    pub fn new(
        local: Arc<LocalSearch>,
        embedder: Arc<dyn Embedder>,
        vector_index: Option<Arc<dyn VectorIndex>>,
        fusion: WeightedFusion,
        default_top_k: usize,
    ) -> Self {
        Self {
            local,
            embedder,
            vector_index,
            fusion,
            default_top_k,
        }
    }

    #[tracing::instrument(skip_all, fields(top_k = tracing::field::Empty))]
    pub async fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievalResult>> {
        let top_k = top_k.unwrap_or(self.default_top_k);
        tracing::Span::current().record("top_k", top_k);
        let timer = SearchTimer::start("hybrid");

        // Fetch more results from each branch for better fusion
        let expanded = top_k.saturating_mul(2);

        let (graph_results, vector_results) = tokio::join!(
            self.local.search(query, Some(expanded), cancel),
            self.vector_search(query, expanded, cancel)
        );

        let (graph_results, vector_results) = match (graph_results, vector_results) {
            (Err(e), _) | (_, Err(e)) if e.is_cancelled() => return Err(e),
            (Err(graph_err), Err(vector_err)) => {
                tracing::warn!(error = %vector_err, "vector branch failed");
                return Err(graph_err);
            }
            (Ok(graph), Ok(vector)) => (graph, vector),
            (Err(e), Ok(vector)) => {
                tracing::warn!(error = %e, "graph branch failed, using vector results only");
                (Vec::new(), vector)
            }
            (Ok(graph), Err(e)) => {
                tracing::warn!(error = %e, "vector branch failed, using graph results only");
                (graph, Vec::new())
            }
        };

        let graph_count = graph_results.len();
        let vector_count = vector_results.len();
        let fused = self.fusion.fuse(graph_results, vector_results, top_k);

        timer.finish(fused.len());
        tracing::info!(
            graph = graph_count,
            vector = vector_count,
            results = fused.len(),
            "hybrid search complete"
        );
        Ok(fused)
    }

    async fn vector_search(
        &self,
        query: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievalResult>> {
        let Some(index) = &self.vector_index else {
            return Ok(Vec::new());
        };

        let embedding = guarded(cancel, self.embedder.embed(query)).await?;
        guarded(cancel, index.search(&embedding, limit)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::vector::StaticVectorIndex;
    use tai_common::config::RetrievalConfig;
    use tai_common::errors::AppError;
    use tai_common::testing::{InMemoryGraph, StaticEmbedder};
    use tai_common::tokens::TiktokenTokenizer;

    const QUERY: &str = "How do I implement leader election?";

    fn local(graph: InMemoryGraph) -> (Arc<LocalSearch>, Arc<StaticEmbedder>) {
        let embedder = Arc::new(
            StaticEmbedder::new(2)
                .with(QUERY, vec![1.0, 0.0])
                .with("Raft Consensus via leader election", vec![0.8, 0.6])
                .with("Paxos Consensus via proposals", vec![0.7, 0.714_142_8]),
        );
        let local = LocalSearch::new(
            Arc::new(graph),
            embedder.clone(),
            Arc::new(TiktokenTokenizer::cl100k().unwrap()),
            RetrievalConfig::default(),
        );
        (Arc::new(local), embedder)
    }

    fn graph() -> InMemoryGraph {
        InMemoryGraph::new()
            .concept("c1", "Raft", "Consensus via leader election")
            .concept("c2", "Paxos", "Consensus via proposals")
    }

    fn vector_hit(entity: &str, score: f32) -> RetrievalResult {
        RetrievalResult::new(format!("{} snippet", entity), score, "vector")
            .with_entities(vec![entity.to_string()])
    }

    fn hybrid(graph: InMemoryGraph, index: Option<Arc<dyn VectorIndex>>) -> HybridSearch {
        let (local, embedder) = local(graph);
        HybridSearch::new(local, embedder, index, WeightedFusion::default(), 5)
    }

    #[tokio::test]
    async fn test_without_index_matches_graph_only() {
        let hybrid = hybrid(graph(), None);
        let cancel = CancellationToken::new();
        let results = hybrid.search(QUERY, Some(5), &cancel).await.unwrap();
        let graph_only = hybrid.local.search(QUERY, Some(10), &cancel).await.unwrap();
        assert_eq!(results, graph_only);
    }

    #[tokio::test]
    async fn test_scores_fused_for_shared_entities() {
        let index = StaticVectorIndex::new(vec![vector_hit("raft", 0.5), vector_hit("Gossip", 0.95)]);
        let results = hybrid(graph(), Some(Arc::new(index)))
            .search(QUERY, Some(5), &CancellationToken::new())
            .await
            .unwrap();

        let entities: Vec<_> = results.iter().map(|r| r.primary_entity().unwrap()).collect();
        assert_eq!(entities, vec!["Gossip", "Paxos", "Raft"]);
        let raft = &results[2];
        assert!((raft.score - (0.4 * 0.8 + 0.6 * 0.5)).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_top_k_caps_fused_results() {
        let index = StaticVectorIndex::new(vec![vector_hit("Gossip", 0.95), vector_hit("CRDT", 0.9)]);
        let results = hybrid(graph(), Some(Arc::new(index)))
            .search(QUERY, Some(2), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_huge_top_k_returns_everything() {
        let index = StaticVectorIndex::new(vec![vector_hit("Gossip", 0.95)]);
        let results = hybrid(graph(), Some(Arc::new(index)))
            .search(QUERY, Some(usize::MAX), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_vector_branch_degrades_to_graph() {
        let results = hybrid(graph(), Some(Arc::new(StaticVectorIndex::failing())))
            .search(QUERY, None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.source == "graph"));
    }

    #[tokio::test]
    async fn test_failed_graph_branch_degrades_to_vector() {
        let index = StaticVectorIndex::new(vec![vector_hit("Gossip", 0.9)]);
        let results = hybrid(graph().unavailable(), Some(Arc::new(index)))
            .search(QUERY, None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, "vector");
    }

    #[tokio::test]
    async fn test_both_branches_failing_propagates_graph_error() {
        let err = hybrid(graph().unavailable(), Some(Arc::new(StaticVectorIndex::failing())))
            .search(QUERY, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Graph { .. }));
    }

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = hybrid(graph(), None).search(QUERY, None, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
