//! Weighted score fusion for graph and vector results
//!
//! Results are keyed by primary entity (case-insensitive):
//! - Graph-only entities keep their graph score
//! - Entities seen by both get `graph_weight * graph + vector_weight * vector`
//! - Vector-only entities are added with their vector score

use std::collections::HashMap;
use tai_common::models::{sort_by_score_desc, RetrievalResult};

/// Fusion weights
#[derive(Debug, Clone, Copy)]
pub struct WeightedFusion {
    pub graph_weight: f32,
    pub vector_weight: f32,
}

impl Default for WeightedFusion {
    fn default() -> Self {
        Self {
            graph_weight: 0.4,
            vector_weight: 0.6,
        }
    }
}

impl WeightedFusion {
    pub fn new(graph_weight: f32, vector_weight: f32) -> Self {
        Self {
            graph_weight,
            vector_weight,
        }
    }

    /// Combined score for an entity found by both branches
    pub fn combine(&self, graph_score: f32, vector_score: f32) -> f32 {
        self.graph_weight * graph_score + self.vector_weight * vector_score
    }

    /// Merge both branches, rerank by score, and keep `limit`.
    ///
    /// Keys keep first-seen order (graph first) and the sort is stable, so
    /// equal scores keep graph order. Results without an entity are never merged.
    pub fn fuse(
        &self,
        graph_results: Vec<RetrievalResult>,
        vector_results: Vec<RetrievalResult>,
        limit: usize,
    ) -> Vec<RetrievalResult> {
        let mut merged: Vec<RetrievalResult> = Vec::new();
        let mut by_entity: HashMap<String, usize> = HashMap::new();
        let mut from_graph: Vec<bool> = Vec::new();

        for result in graph_results {
            match entity_key(&result).and_then(|key| by_entity.get(&key).copied()) {
                // Duplicate graph entity: keep the higher-scored copy
                Some(idx) => {
                    if result.score > merged[idx].score {
                        merged[idx] = result;
                    }
                }
                None => {
                    if let Some(key) = entity_key(&result) {
                        by_entity.insert(key, merged.len());
                    }
                    merged.push(result);
                    from_graph.push(true);
                }
            }
        }

        for result in vector_results {
            match entity_key(&result).and_then(|key| by_entity.get(&key).copied()) {
                Some(idx) if from_graph[idx] => {
                    merged[idx].score = self.combine(merged[idx].score, result.score);
                    merged[idx].metadata.insert("vector_score".to_string(), result.score.into());
                }
                Some(idx) => {
                    if result.score > merged[idx].score {
                        merged[idx] = result;
                    }
                }
                None => {
                    if let Some(key) = entity_key(&result) {
                        by_entity.insert(key, merged.len());
                    }
                    merged.push(result);
                    from_graph.push(false);
                }
            }
        }

        sort_by_score_desc(&mut merged);
        merged.truncate(limit);
        merged
    }
}

fn entity_key(result: &RetrievalResult) -> Option<String> {
    result.primary_entity().map(str::to_lowercase)
}
