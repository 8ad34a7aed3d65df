//! Map-reduce search over community summaries
//!
//! Map: ask the model, once per community, for a short answer grounded in that
//! community's summary. Reduce: synthesize the relevant partial answers into
//! one response.

use futures::future::join_all;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tai_common::cancel::{guarded, CancellationToken};
use tai_common::config::RetrievalConfig;
use tai_common::errors::Result;
use tai_common::graph::{Community, GraphClient};
use tai_common::llm::LlmClient;
use tai_common::metrics::{self, SearchTimer};

/// Answer when the graph holds no communities
pub const NO_COMMUNITY_DATA: &str = "No community data available.";

/// Answer when no community is relevant enough
pub const NO_INFORMATION_ANSWER: &str =
    "I don't have enough information to answer this question comprehensively.";

const NOT_RELEVANT: &str = "NOT_RELEVANT";

/// Synthesized answer with its supporting communities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSearchResult {
    pub synthesized_answer: String,
    /// Community ids, most relevant first
    pub communities_used: Vec<String>,
    pub relevance_scores: HashMap<String, f32>,
    pub map_stats: MapPhaseStats,
}

impl GlobalSearchResult {
    fn without_sources(answer: &str, map_stats: MapPhaseStats) -> Self {
        Self {
            synthesized_answer: answer.to_string(),
            communities_used: Vec::new(),
            relevance_scores: HashMap::new(),
            map_stats,
        }
    }
}

/// Per-community outcome counts of one map phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapPhaseStats {
    pub succeeded: usize,
    pub not_relevant: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
struct IntermediateAnswer {
    community_id: String,
    answer: String,
    relevance: f32,
}

enum MapOutcome {
    Answer(IntermediateAnswer),
    NotRelevant,
    Failed,
}

/// Global community search
pub struct GlobalSearch {
    graph: Arc<dyn GraphClient>,
    llm: Arc<dyn LlmClient>,
    config: RetrievalConfig,
}

impl GlobalSearch {
    pub fn new(graph: Arc<dyn GraphClient>, llm: Arc<dyn LlmClient>, config: RetrievalConfig) -> Self {
        Self { graph, llm, config }
    }

    #[tracing::instrument(skip_all)]
    pub async fn search(&self, query: &str, cancel: &CancellationToken) -> Result<GlobalSearchResult> {
        let timer = SearchTimer::start("global");

        let communities =
            guarded(cancel, self.graph.top_communities(self.config.community_limit)).await?;
        if communities.is_empty() {
            timer.finish(0);
            return Ok(GlobalSearchResult::without_sources(
                NO_COMMUNITY_DATA,
                MapPhaseStats::default(),
            ));
        }

        let (answers, stats) = self.map_phase(query, &communities, cancel).await?;
        let relevant = self.filter_by_relevance(answers);

        let Some(best) = relevant.first() else {
            timer.finish(0);
            tracing::info!(?stats, "no relevant communities");
            return Ok(GlobalSearchResult::without_sources(NO_INFORMATION_ANSWER, stats));
        };
        let fallback = best.answer.clone();

        let synthesized_answer = match self.reduce_phase(query, &relevant, cancel).await {
            Ok(answer) => answer,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                tracing::error!(error = %e, "reduce phase failed, using best intermediate answer");
                fallback
            }
        };

        timer.finish(relevant.len());
        tracing::info!(communities = relevant.len(), ?stats, "global search complete");

        Ok(GlobalSearchResult {
            synthesized_answer,
            communities_used: relevant.iter().map(|a| a.community_id.clone()).collect(),
            relevance_scores: relevant
                .iter()
                .map(|a| (a.community_id.clone(), a.relevance))
                .collect(),
            map_stats: stats,
        })
    }

    /// One call per community, run concurrently, consumed in community order.
    ///
    /// Cancellation drops every in-flight call and discards partial answers.
    async fn map_phase(
        &self,
        query: &str,
        communities: &[Community],
        cancel: &CancellationToken,
    ) -> Result<(Vec<IntermediateAnswer>, MapPhaseStats)> {
        let calls = communities.iter().map(|c| self.map_community(query, c));
        let outcomes = guarded(cancel, async { Ok(join_all(calls).await) }).await?;

        let mut stats = MapPhaseStats::default();
        let mut answers = Vec::new();
        for outcome in outcomes {
            match outcome {
                MapOutcome::Answer(answer) => {
                    stats.succeeded += 1;
                    answers.push(answer);
                }
                MapOutcome::NotRelevant => stats.not_relevant += 1,
                MapOutcome::Failed => stats.failed += 1,
            }
        }

        metrics::record_map_phase(stats.succeeded, stats.not_relevant, stats.failed);
        Ok((answers, stats))
    }

    async fn map_community(&self, query: &str, community: &Community) -> MapOutcome {
        let prompt = format!(
            "Given this community summary about distributed systems concepts:\n\n\
             {summary}\n\n\
             Question: {query}\n\n\
             Provide a brief answer (2-3 sentences) based on this community's concepts. \
             If not relevant, respond \"{NOT_RELEVANT}\".\n\n\
             Also provide a relevance score (0.0 to 1.0) for how well this community answers the question.",
            summary = community.summary,
        );

        match self
            .llm
            .get_completion(&prompt, None, Some(self.config.map_max_tokens))
            .await
        {
            Ok(response) if is_not_relevant(&response) => MapOutcome::NotRelevant,
            Ok(response) => MapOutcome::Answer(IntermediateAnswer {
                community_id: community.id.clone(),
                relevance: extract_relevance_score(&response),
                answer: response,
            }),
            Err(e) => {
                tracing::warn!(community_id = %community.id, error = %e, "map phase failed for community");
                MapOutcome::Failed
            }
        }
    }

    /// Keep answers at or above the threshold, most relevant first, capped
    fn filter_by_relevance(&self, answers: Vec<IntermediateAnswer>) -> Vec<IntermediateAnswer> {
        let mut relevant: Vec<_> = answers
            .into_iter()
            .filter(|a| a.relevance >= self.config.relevance_threshold)
            .collect();
        relevant.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        relevant.truncate(self.config.max_map_results);
        relevant
    }

    async fn reduce_phase(
        &self,
        query: &str,
        relevant: &[IntermediateAnswer],
        cancel: &CancellationToken,
    ) -> Result<String> {
        let combined = relevant
            .iter()
            .enumerate()
            .map(|(i, a)| format!("Community {} ({}): {}", i + 1, a.community_id, a.answer))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "Synthesize a comprehensive answer from these community-based responses:\n\n\
             Question: {query}\n\n\
             Community Answers:\n{combined}\n\n\
             Provide a unified, coherent answer that integrates insights from all relevant communities.\n\
             Cite which communities contributed to different aspects of the answer."
        );

        guarded(
            cancel,
            self.llm
                .get_completion(&prompt, None, Some(self.config.reduce_max_tokens)),
        )
        .await
    }
}

fn is_not_relevant(response: &str) -> bool {
    response.to_uppercase().contains(NOT_RELEVANT)
}

fn relevance_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)relevance[:\s]+([0-9.]+)").ok())
        .as_ref()
}

/// Relevance from an explicit "relevance: X" marker, else a length heuristic
pub fn extract_relevance_score(response: &str) -> f32 {
    let explicit = relevance_pattern()
        .and_then(|re| re.captures(response))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().trim_end_matches('.').parse::<f32>().ok())
        .filter(|score| score.is_finite());

    if let Some(score) = explicit {
        return score.clamp(0.0, 1.0);
    }

    if response.chars().count() > 50 && !is_not_relevant(response) {
        0.6
    } else {
        0.3
    }
}
