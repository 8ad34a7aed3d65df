//! Knowledge graph access
//!
//! Provides:
//! - Read-only records for concept nodes, neighbors, and communities
//! - The `GraphClient` seam consumed by local and global search
//! - A Neo4j client over the HTTP transactional endpoint

mod neo4j;

pub use neo4j::Neo4jHttpClient;

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A taught idea, protocol, or algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptNode {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl ConceptNode {
    /// Text embedded for similarity ranking
    pub fn embedding_text(&self) -> String {
        format!("{} {}", self.name, self.description)
    }
}

/// One edge out of a concept's 1-hop neighborhood
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub name: String,
    pub relationship_type: String,
    #[serde(default)]
    pub relationship_description: Option<String>,
}

/// Precomputed cluster of related concepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Community {
    pub id: String,
    pub summary: String,
    pub member_count: u64,
}

/// Trait for graph reads
#[async_trait]
pub trait GraphClient: Send + Sync {
    /// Concept nodes in storage order, at most `limit`
    async fn concept_candidates(&self, limit: usize) -> Result<Vec<ConceptNode>>;

    /// 1-hop neighbors of a concept, at most `limit` edges
    async fn concept_neighbors(&self, concept_id: &str, limit: usize) -> Result<Vec<Neighbor>>;

    /// Communities with a summary, largest first, at most `limit`
    async fn top_communities(&self, limit: usize) -> Result<Vec<Community>>;
}
