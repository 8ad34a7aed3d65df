//! Deterministic in-memory collaborators for tests

use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use crate::graph::{Community, ConceptNode, GraphClient, Neighbor};
use crate::llm::{parse_structured, LlmClient};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Embedder returning fixed vectors per exact text; unknown text maps to zeros
pub struct StaticEmbedder {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
    failing: bool,
    batch_calls: AtomicUsize,
}

impl StaticEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: HashMap::new(),
            failing: false,
            batch_calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }

    /// Every call fails with an embedding error
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, text: &str) -> Result<Vec<f32>> {
        if self.failing {
            return Err(AppError::Embedding {
                message: "embedding service unavailable".to_string(),
            });
        }
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.dimension]))
    }
}

#[async_trait]
impl Embedder for StaticEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.lookup(text)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        texts.iter().map(|t| self.lookup(t)).collect()
    }

    fn model_name(&self) -> &str {
        "static"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail,
    Hang,
}

/// LLM whose replies are chosen by the first rule whose needle occurs in the prompt
pub struct ScriptedLlm {
    rules: Vec<(String, Reply)>,
    fallback: Reply,
    structured: Option<Value>,
    prompts: Mutex<Vec<String>>,
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLlm {
    /// Unmatched prompts fail
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: Reply::Fail,
            structured: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Text(reply.into())));
        self
    }

    pub fn fail_on(mut self, needle: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Fail));
        self
    }

    /// Matching prompts never complete
    pub fn hang_on(mut self, needle: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Hang));
        self
    }

    pub fn otherwise(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Reply::Text(reply.into());
        self
    }

    /// Value returned by every structured completion
    pub fn with_structured(mut self, value: Value) -> Self {
        self.structured = Some(value);
        self
    }

    /// Prompts received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn reply_for(&self, prompt: &str) -> Reply {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn get_completion(
        &self,
        prompt: &str,
        _system_prompt: Option<&str>,
        _max_tokens: Option<usize>,
    ) -> Result<String> {
        match self.reply_for(prompt) {
            Reply::Text(text) => Ok(text),
            Reply::Fail => Err(AppError::Llm {
                message: "scripted failure".to_string(),
            }),
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn get_structured_completion(
        &self,
        prompt: &str,
        schema: &Value,
        _system_prompt: Option<&str>,
    ) -> Result<Value> {
        if let Reply::Hang = self.reply_for(prompt) {
            return std::future::pending().await;
        }
        match &self.structured {
            Some(value) => parse_structured(&value.to_string(), schema),
            None => Err(AppError::Llm {
                message: "no structured reply scripted".to_string(),
            }),
        }
    }
}

/// Graph held in memory
#[derive(Default)]
pub struct InMemoryGraph {
    concepts: Vec<ConceptNode>,
    neighbors: HashMap<String, Vec<Neighbor>>,
    communities: Vec<Community>,
    broken_neighborhoods: HashSet<String>,
    unavailable: bool,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn concept(mut self, id: &str, name: &str, description: &str) -> Self {
        self.concepts.push(ConceptNode {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
        });
        self
    }

    pub fn edge(mut self, from_id: &str, to_name: &str, relationship_type: &str) -> Self {
        self.neighbors
            .entry(from_id.to_string())
            .or_default()
            .push(Neighbor {
                name: to_name.to_string(),
                relationship_type: relationship_type.to_string(),
                relationship_description: None,
            });
        self
    }

    pub fn community(mut self, id: &str, summary: &str, member_count: u64) -> Self {
        self.communities.push(Community {
            id: id.to_string(),
            summary: summary.to_string(),
            member_count,
        });
        self
    }

    /// Neighborhood reads for this concept fail
    pub fn break_neighborhood(mut self, concept_id: &str) -> Self {
        self.broken_neighborhoods.insert(concept_id.to_string());
        self
    }

    /// Every read fails
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    fn check(&self) -> Result<()> {
        if self.unavailable {
            return Err(AppError::Graph {
                message: "graph unreachable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl GraphClient for InMemoryGraph {
    async fn concept_candidates(&self, limit: usize) -> Result<Vec<ConceptNode>> {
        self.check()?;
        Ok(self.concepts.iter().take(limit).cloned().collect())
    }

    async fn concept_neighbors(&self, concept_id: &str, limit: usize) -> Result<Vec<Neighbor>> {
        self.check()?;
        if self.broken_neighborhoods.contains(concept_id) {
            return Err(AppError::Graph {
                message: format!("neighborhood read failed for {}", concept_id),
            });
        }
        Ok(self
            .neighbors
            .get(concept_id)
            .map(|n| n.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn top_communities(&self, limit: usize) -> Result<Vec<Community>> {
        self.check()?;
        let mut communities = self.communities.clone();
        communities.sort_by(|a, b| b.member_count.cmp(&a.member_count));
        communities.truncate(limit);
        Ok(communities)
    }
}
