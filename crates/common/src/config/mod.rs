//! Configuration management for TAi retrieval
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with TAI__)
//! - Configuration files (config/default, config/{env}, config/local)
//! - Default values

use crate::errors::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// LLM provider configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Graph database configuration
    #[serde(default)]
    pub graph: GraphConfig,

    /// Retrieval tuning
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Token budget per context segment
    #[serde(default)]
    pub budget: TokenBudget,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// LLM provider: openai
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// API key for the provider
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Model for entity extraction (router fallback)
    #[serde(default = "default_llm_model")]
    pub extraction_model: String,

    /// Model for map-reduce synthesis
    #[serde(default = "default_reasoning_model")]
    pub reasoning_model: String,

    #[serde(default)]
    pub temperature: f32,

    /// Default completion length
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: usize,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Upper bound on time spent retrying one call
    #[serde(default = "default_retry_elapsed")]
    pub max_retry_elapsed_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphConfig {
    /// Neo4j HTTP endpoint
    #[serde(default = "default_graph_uri")]
    pub uri: String,

    #[serde(default = "default_graph_database")]
    pub database: String,

    #[serde(default = "default_graph_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Query timeout in seconds
    #[serde(default = "default_graph_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Results returned per search
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Token cap for packed local search output
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Minimum cosine similarity for an entity seed (exclusive)
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f32,

    /// Minimum map-phase relevance kept for the reduce phase (inclusive)
    #[serde(default = "default_threshold")]
    pub relevance_threshold: f32,

    /// Concept nodes scanned per local search
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,

    /// Relationship edges fetched per seed entity
    #[serde(default = "default_neighbor_limit")]
    pub neighbor_limit: usize,

    #[serde(default = "default_render_limit")]
    pub max_relationships: usize,

    #[serde(default = "default_render_limit")]
    pub max_see_also: usize,

    /// Communities loaded for the map phase
    #[serde(default = "default_community_limit")]
    pub community_limit: usize,

    /// Intermediate answers passed to the reduce phase
    #[serde(default = "default_max_map_results")]
    pub max_map_results: usize,

    #[serde(default = "default_map_max_tokens")]
    pub map_max_tokens: usize,

    #[serde(default = "default_reduce_max_tokens")]
    pub reduce_max_tokens: usize,

    #[serde(default = "default_graph_weight")]
    pub hybrid_graph_weight: f32,

    #[serde(default = "default_vector_weight")]
    pub hybrid_vector_weight: f32,

    /// Below this many remaining tokens an overflowing item is dropped, not truncated
    #[serde(default = "default_min_truncation_tokens")]
    pub min_truncation_tokens: usize,

    /// Ordered vocabulary matched against queries by the router
    #[serde(default = "default_known_entities")]
    pub known_entities: Vec<String>,
}

/// Token caps for each named context segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenBudget {
    #[serde(default = "default_system_prompt_budget")]
    pub system_prompt: usize,
    #[serde(default = "default_profile_budget")]
    pub student_profile: usize,
    #[serde(default = "default_retrieval_budget")]
    pub retrieval_context: usize,
    #[serde(default = "default_history_budget")]
    pub conversation_history: usize,
    #[serde(default = "default_current_turn_budget")]
    pub current_turn: usize,
    #[serde(default = "default_response_reserve")]
    pub response_reserve: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_llm_provider() -> String { "openai".to_string() }
fn default_api_base() -> String { "https://api.openai.com/v1".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_reasoning_model() -> String { "gpt-4-turbo".to_string() }
fn default_llm_max_tokens() -> usize { 2000 }
fn default_llm_timeout() -> u64 { 60 }
fn default_retry_elapsed() -> u64 { 30 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dimension() -> usize { 1536 }
fn default_batch_size() -> usize { 100 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_graph_uri() -> String { "http://localhost:7474".to_string() }
fn default_graph_database() -> String { "neo4j".to_string() }
fn default_graph_user() -> String { "neo4j".to_string() }
fn default_graph_timeout() -> u64 { 30 }
fn default_top_k() -> usize { 5 }
fn default_max_context_tokens() -> usize { 4000 }
fn default_threshold() -> f32 { 0.5 }
fn default_candidate_limit() -> usize { 100 }
fn default_neighbor_limit() -> usize { 10 }
fn default_render_limit() -> usize { 5 }
fn default_community_limit() -> usize { 20 }
fn default_max_map_results() -> usize { 10 }
fn default_map_max_tokens() -> usize { 200 }
fn default_reduce_max_tokens() -> usize { 1000 }
fn default_graph_weight() -> f32 { 0.4 }
fn default_vector_weight() -> f32 { 0.6 }
fn default_min_truncation_tokens() -> usize { 100 }
fn default_system_prompt_budget() -> usize { 3000 }
fn default_profile_budget() -> usize { 1000 }
fn default_retrieval_budget() -> usize { 4000 }
fn default_history_budget() -> usize { 8000 }
fn default_current_turn_budget() -> usize { 500 }
fn default_response_reserve() -> usize { 4000 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "tai-context".to_string() }

fn default_known_entities() -> Vec<String> {
    [
        "Raft",
        "Paxos",
        "MapReduce",
        "DHT",
        "consensus",
        "CAP theorem",
        "leader election",
        "log replication",
        "distributed hash table",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self> {
        let env = std::env::var("TAI_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., TAI__RETRIEVAL__TOP_K=8
            .add_source(
                Environment::with_prefix("TAI")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific file, still honouring environment overrides
    pub fn from_file(path: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("TAI")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the retrieval engine cannot run with
    pub fn validate(&self) -> Result<()> {
        self.retrieval.validate()?;
        self.budget.validate()
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(AppError::Configuration { message });

        if self.top_k == 0 {
            return invalid("retrieval.top_k must be at least 1".into());
        }
        for (name, value) in [
            ("similarity_threshold", self.similarity_threshold),
            ("relevance_threshold", self.relevance_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("retrieval.{name} must be within [0, 1], got {value}"));
            }
        }
        let (g, v) = (self.hybrid_graph_weight, self.hybrid_vector_weight);
        if !g.is_finite() || !v.is_finite() || g < 0.0 || v < 0.0 || g + v <= 0.0 {
            return invalid(format!(
                "hybrid weights must be non-negative with a positive sum, got graph={g} vector={v}"
            ));
        }
        Ok(())
    }
}

impl TokenBudget {
    /// Sum of all segment caps
    pub fn total(&self) -> usize {
        self.system_prompt
            + self.student_profile
            + self.retrieval_context
            + self.conversation_history
            + self.current_turn
            + self.response_reserve
    }

    /// Cap for the assembled system message (prompt + profile + retrieval)
    pub fn system_message(&self) -> usize {
        self.system_prompt + self.student_profile + self.retrieval_context
    }

    pub fn validate(&self) -> Result<()> {
        if self.retrieval_context == 0 || self.conversation_history == 0 {
            return Err(AppError::Configuration {
                message: "budget.retrieval_context and budget.conversation_history must be non-zero"
                    .into(),
            });
        }
        Ok(())
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: None,
            api_base: default_api_base(),
            extraction_model: default_llm_model(),
            reasoning_model: default_reasoning_model(),
            temperature: 0.0,
            max_tokens: default_llm_max_tokens(),
            timeout_secs: default_llm_timeout(),
            max_retry_elapsed_secs: default_retry_elapsed(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: default_graph_uri(),
            database: default_graph_database(),
            user: default_graph_user(),
            password: String::new(),
            timeout_secs: default_graph_timeout(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_context_tokens: default_max_context_tokens(),
            similarity_threshold: default_threshold(),
            relevance_threshold: default_threshold(),
            candidate_limit: default_candidate_limit(),
            neighbor_limit: default_neighbor_limit(),
            max_relationships: default_render_limit(),
            max_see_also: default_render_limit(),
            community_limit: default_community_limit(),
            max_map_results: default_max_map_results(),
            map_max_tokens: default_map_max_tokens(),
            reduce_max_tokens: default_reduce_max_tokens(),
            hybrid_graph_weight: default_graph_weight(),
            hybrid_vector_weight: default_vector_weight(),
            min_truncation_tokens: default_min_truncation_tokens(),
            known_entities: default_known_entities(),
        }
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt_budget(),
            student_profile: default_profile_budget(),
            retrieval_context: default_retrieval_budget(),
            conversation_history: default_history_budget(),
            current_turn: default_current_turn_budget(),
            response_reserve: default_response_reserve(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}
