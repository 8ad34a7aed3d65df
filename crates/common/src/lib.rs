//! TAi Common Library
//!
//! Shared code for the retrieval and context crates including:
//! - Error types and handling
//! - Configuration management
//! - Collaborator seams (graph, embeddings, LLM, tokenizer) and their clients
//! - Context assembly under token budgets
//! - Metrics and cancellation helpers

pub mod cancel;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod errors;
pub mod graph;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod tokens;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use config::{AppConfig, RetrievalConfig, TokenBudget};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use graph::GraphClient;
pub use llm::LlmClient;
pub use models::{ChatMessage, RetrievalResult, Role, Session};
pub use tokens::Tokenizer;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
