//! Entity-seeded neighborhood search
//!
//! Ranks concept nodes by embedding similarity to the query, then renders each
//! retained concept together with its 1-hop neighborhood.

use serde_json::json;
use std::sync::Arc;
use tai_common::cancel::{guarded, CancellationToken};
use tai_common::config::RetrievalConfig;
use tai_common::embeddings::{cosine_similarity, Embedder};
use tai_common::errors::{AppError, Result};
use tai_common::graph::{ConceptNode, GraphClient, Neighbor};
use tai_common::metrics::SearchTimer;
use tai_common::models::RetrievalResult;
use tai_common::tokens::{fit_to_budget, Fit, Tokenizer};

/// Local graph search
pub struct LocalSearch {
    graph: Arc<dyn GraphClient>,
    embedder: Arc<dyn Embedder>,
    tokenizer: Arc<dyn Tokenizer>,
    config: RetrievalConfig,
}

impl LocalSearch {
    pub fn new(
        graph: Arc<dyn GraphClient>,
        embedder: Arc<dyn Embedder>,
        tokenizer: Arc<dyn Tokenizer>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            graph,
            embedder,
            tokenizer,
            config,
        }
    }

    /// Best-matching concepts with their neighborhoods.
    ///
    /// Returns at most `top_k` results (configured default when `None`), sorted
    /// by similarity, whose texts together stay within `max_context_tokens`.
    #[tracing::instrument(skip_all, fields(top_k = tracing::field::Empty))]
    pub async fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievalResult>> {
        let top_k = top_k.unwrap_or(self.config.top_k);
        tracing::Span::current().record("top_k", top_k);
        let timer = SearchTimer::start("local");

        let matches = self.match_concepts(query, top_k, cancel).await?;

        let mut results = Vec::with_capacity(matches.len());
        let mut used = 0usize;

        for (concept, similarity) in matches {
            let neighbors = self.neighborhood(&concept, cancel).await?;
            let text = render(
                &concept,
                &neighbors,
                self.config.max_relationships,
                self.config.max_see_also,
            );

            let remaining = self.config.max_context_tokens.saturating_sub(used);
            let (text, stop) = match fit_to_budget(
                self.tokenizer.as_ref(),
                &text,
                remaining,
                self.config.min_truncation_tokens,
            ) {
                Ok(Fit::Whole(text)) => (text, false),
                Ok(Fit::Truncated(text)) => (text, true),
                Err(e) => {
                    tracing::debug!(entity = %concept.name, error = %e, "local search budget reached");
                    break;
                }
            };
            used += self.tokenizer.count_tokens(&text);

            results.push(to_result(&concept, &neighbors, similarity, text));
            if stop {
                break;
            }
        }

        timer.finish(results.len());
        tracing::info!(results = results.len(), tokens = used, "local search complete");
        Ok(results)
    }

    /// Candidates above the similarity threshold, best first, ties in storage order
    async fn match_concepts(
        &self,
        query: &str,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<(ConceptNode, f32)>> {
        let query_embedding = guarded(cancel, self.embedder.embed(query)).await?;

        let candidates = guarded(
            cancel,
            self.graph.concept_candidates(self.config.candidate_limit),
        )
        .await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = candidates.iter().map(ConceptNode::embedding_text).collect();
        let embeddings = guarded(cancel, self.embedder.embed_batch(&texts)).await?;
        if embeddings.len() != candidates.len() {
            return Err(AppError::MalformedResponse {
                message: format!(
                    "Expected {} candidate embeddings, received {}",
                    candidates.len(),
                    embeddings.len()
                ),
            });
        }

        let mut matches: Vec<(ConceptNode, f32)> = candidates
            .into_iter()
            .zip(embeddings.iter())
            .map(|(concept, embedding)| {
                let similarity = cosine_similarity(&query_embedding, embedding);
                (concept, similarity)
            })
            .filter(|(_, similarity)| *similarity > self.config.similarity_threshold)
            .collect();

        matches.sort_by(|a, b| b.1.total_cmp(&a.1));
        matches.truncate(top_k);
        Ok(matches)
    }

    /// 1-hop neighbors; a failed read degrades to the concept alone
    async fn neighborhood(
        &self,
        concept: &ConceptNode,
        cancel: &CancellationToken,
    ) -> Result<Vec<Neighbor>> {
        match guarded(
            cancel,
            self.graph
                .concept_neighbors(&concept.id, self.config.neighbor_limit),
        )
        .await
        {
            Ok(neighbors) => Ok(neighbors),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                tracing::warn!(entity = %concept.name, error = %e, "neighborhood expansion failed");
                Ok(Vec::new())
            }
        }
    }
}

fn render(
    concept: &ConceptNode,
    neighbors: &[Neighbor],
    max_relationships: usize,
    max_see_also: usize,
) -> String {
    let mut parts = Vec::new();

    if concept.description.is_empty() {
        parts.push(format!("**{}**", concept.name));
    } else {
        parts.push(format!("**{}**: {}", concept.name, concept.description));
    }

    if !neighbors.is_empty() {
        parts.push("\n**Related concepts:**".to_string());
        for neighbor in neighbors.iter().take(max_relationships) {
            match &neighbor.relationship_description {
                Some(desc) if !desc.is_empty() => parts.push(format!(
                    "- {} {}: {}",
                    neighbor.relationship_type, neighbor.name, desc
                )),
                _ => parts.push(format!("- {} {}", neighbor.relationship_type, neighbor.name)),
            }
        }

        let see_also: Vec<&str> = neighbors
            .iter()
            .take(max_see_also)
            .map(|n| n.name.as_str())
            .collect();
        parts.push(format!("\n**See also:** {}", see_also.join(", ")));
    }

    parts.join("\n")
}

fn to_result(
    concept: &ConceptNode,
    neighbors: &[Neighbor],
    similarity: f32,
    text: String,
) -> RetrievalResult {
    let mut entities = Vec::with_capacity(neighbors.len() + 1);
    entities.push(concept.name.clone());
    entities.extend(neighbors.iter().map(|n| n.name.clone()));

    let relationships: Vec<_> = neighbors
        .iter()
        .map(|n| {
            json!({
                "type": n.relationship_type,
                "target": n.name,
                "description": n.relationship_description,
            })
        })
        .collect();

    RetrievalResult::new(text, similarity, "graph")
        .with_entities(entities)
        .with_metadata("entity_id", json!(concept.id))
        .with_metadata("relationships", json!(relationships))
        .with_metadata("similarity", json!(similarity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tai_common::testing::{InMemoryGraph, StaticEmbedder};
    use tai_common::tokens::TiktokenTokenizer;

    const QUERY: &str = "How do nodes agree on a value?";

    fn tokenizer() -> Arc<TiktokenTokenizer> {
        Arc::new(TiktokenTokenizer::cl100k().unwrap())
    }

    fn course_graph() -> InMemoryGraph {
        InMemoryGraph::new()
            .concept("c1", "Raft", "Understandable consensus protocol")
            .concept("c2", "Paxos", "Classic consensus protocol")
            .concept("c3", "DHT", "Distributed hash table")
            .concept("c4", "Multi-Paxos", "Paxos with a stable leader")
            .edge("c1", "Leader election", "PART_OF")
            .edge("c1", "Paxos", "ALTERNATIVE_TO")
            .edge("c2", "Raft", "ALTERNATIVE_TO")
    }

    /// Query on the x axis; similarities Raft 0.9, Paxos 0.8, DHT 0.1, Multi-Paxos 0.8
    fn course_embedder() -> StaticEmbedder {
        let at = |cos: f32| vec![cos, (1.0 - cos * cos).sqrt()];
        StaticEmbedder::new(2)
            .with(QUERY, vec![1.0, 0.0])
            .with("Raft Understandable consensus protocol", at(0.9))
            .with("Paxos Classic consensus protocol", at(0.8))
            .with("DHT Distributed hash table", at(0.1))
            .with("Multi-Paxos Paxos with a stable leader", at(0.8))
    }

    fn search_with(graph: InMemoryGraph, embedder: StaticEmbedder, config: RetrievalConfig) -> LocalSearch {
        LocalSearch::new(Arc::new(graph), Arc::new(embedder), tokenizer(), config)
    }

    #[tokio::test]
    async fn test_results_sorted_and_thresholded() {
        let search = search_with(course_graph(), course_embedder(), RetrievalConfig::default());
        let results = search.search(QUERY, Some(10), &CancellationToken::new()).await.unwrap();

        let names: Vec<_> = results.iter().map(|r| r.primary_entity().unwrap()).collect();
        // DHT is under the threshold; Paxos precedes Multi-Paxos on a tie
        assert_eq!(names, vec!["Raft", "Paxos", "Multi-Paxos"]);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(results.iter().all(|r| r.source == "graph"));
    }

    #[tokio::test]
    async fn test_top_k_caps_results() {
        let search = search_with(course_graph(), course_embedder(), RetrievalConfig::default());
        let results = search.search(QUERY, Some(1), &CancellationToken::new()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entities, vec!["Raft", "Leader election", "Paxos"]);
        assert_eq!(results[0].metadata["entity_id"], json!("c1"));
    }

    #[tokio::test]
    async fn test_repeated_search_is_identical() {
        let search = search_with(course_graph(), course_embedder(), RetrievalConfig::default());
        let cancel = CancellationToken::new();
        let first = search.search(QUERY, None, &cancel).await.unwrap();
        let second = search.search(QUERY, None, &cancel).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_candidates_embedded_in_one_batch() {
        let embedder = Arc::new(course_embedder());
        let search = LocalSearch::new(
            Arc::new(course_graph()),
            embedder.clone(),
            tokenizer(),
            RetrievalConfig::default(),
        );
        search.search(QUERY, None, &CancellationToken::new()).await.unwrap();
        assert_eq!(embedder.batch_calls(), 1);
    }

    #[tokio::test]
    async fn test_rendered_neighborhood() {
        let search = search_with(course_graph(), course_embedder(), RetrievalConfig::default());
        let results = search.search(QUERY, Some(1), &CancellationToken::new()).await.unwrap();
        let text = &results[0].text;
        assert!(text.starts_with("**Raft**: Understandable consensus protocol"));
        assert!(text.contains("- PART_OF Leader election"));
        assert!(text.contains("**See also:** Leader election, Paxos"));
    }

    #[tokio::test]
    async fn test_failed_neighborhood_degrades_to_description() {
        let graph = course_graph().break_neighborhood("c1");
        let search = search_with(graph, course_embedder(), RetrievalConfig::default());
        let results = search.search(QUERY, None, &CancellationToken::new()).await.unwrap();
        assert_eq!(results[0].text, "**Raft**: Understandable consensus protocol");
        assert_eq!(results[0].entities, vec!["Raft"]);
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_token_budget_truncates_and_stops() {
        let long = "log replication keeps followers consistent ".repeat(45);
        let graph = InMemoryGraph::new()
            .concept("c1", "Raft", &long)
            .concept("c2", "Paxos", &long);
        let embedder = StaticEmbedder::new(2)
            .with(QUERY, vec![1.0, 0.0])
            .with(format!("Raft {}", long), vec![1.0, 0.0])
            .with(format!("Paxos {}", long), vec![0.9, 0.1]);
        let config = RetrievalConfig {
            max_context_tokens: 400,
            ..Default::default()
        };
        let tok = tokenizer();
        let search = LocalSearch::new(Arc::new(graph), Arc::new(embedder), tok.clone(), config);

        let results = search.search(QUERY, None, &CancellationToken::new()).await.unwrap();
        let total: usize = results.iter().map(|r| tok.count_tokens(&r.text)).sum();
        assert_eq!(results.len(), 2);
        assert!(total <= 400, "total tokens {}", total);
        assert!(results[1].text.ends_with("..."));
    }

    #[tokio::test]
    async fn test_unreachable_graph_propagates() {
        let search = search_with(course_graph().unavailable(), course_embedder(), RetrievalConfig::default());
        let err = search.search(QUERY, None, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Graph { .. }));
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let search = search_with(course_graph(), course_embedder().failing(), RetrievalConfig::default());
        let err = search.search(QUERY, None, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Embedding { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let search = search_with(course_graph(), course_embedder(), RetrievalConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = search.search(QUERY, None, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
