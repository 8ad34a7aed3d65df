//! Error types for TAi retrieval
//!
//! Provides a single error enum for the retrieval core with:
//! - A coarse taxonomy (client / data / budget / cancelled / internal)
//! - Stable machine-readable error codes
//! - Retry classification for transient upstream failures

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Coarse failure category used for propagation decisions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// An embedding, LLM, or graph call failed
    Client,
    /// A collaborator answered with something we could not use
    Data,
    /// Content could not be fitted into a token budget
    Budget,
    /// The caller's cancellation signal fired
    Cancelled,
    /// Misconfiguration or a bug
    Internal,
}

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Client errors (1xxx)
    EmbeddingError,
    LlmError,
    GraphError,
    UpstreamError,

    // Data errors (2xxx)
    MalformedResponse,
    SerializationError,

    // Budget errors (3xxx)
    BudgetExceeded,

    // Cancellation (4xxx)
    Cancelled,

    // Internal errors (9xxx)
    ConfigurationError,
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::EmbeddingError => 1001,
            ErrorCode::LlmError => 1002,
            ErrorCode::GraphError => 1003,
            ErrorCode::UpstreamError => 1004,

            ErrorCode::MalformedResponse => 2001,
            ErrorCode::SerializationError => 2002,

            ErrorCode::BudgetExceeded => 3001,

            ErrorCode::Cancelled => 4001,

            ErrorCode::ConfigurationError => 9001,
            ErrorCode::InternalError => 9002,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Client errors
    #[error("Embedding service error: {message}")]
    Embedding { message: String },

    #[error("LLM error: {message}")]
    Llm { message: String },

    #[error("Graph query error: {message}")]
    Graph { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Data errors
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Budget errors
    #[error("Token budget exceeded: {required} tokens needed, {remaining} remaining")]
    BudgetExceeded { required: usize, remaining: usize },

    #[error("Operation cancelled")]
    Cancelled,

    // Internal errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Embedding { .. } => ErrorCode::EmbeddingError,
            AppError::Llm { .. } => ErrorCode::LlmError,
            AppError::Graph { .. } => ErrorCode::GraphError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::MalformedResponse { .. } => ErrorCode::MalformedResponse,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::BudgetExceeded { .. } => ErrorCode::BudgetExceeded,
            AppError::Cancelled => ErrorCode::Cancelled,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Internal { .. } | AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the failure category for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Embedding { .. }
            | AppError::Llm { .. }
            | AppError::Graph { .. }
            | AppError::HttpClient(_) => ErrorKind::Client,

            AppError::MalformedResponse { .. } | AppError::Serialization(_) => ErrorKind::Data,

            AppError::BudgetExceeded { .. } => ErrorKind::Budget,

            AppError::Cancelled => ErrorKind::Cancelled,

            AppError::Configuration { .. } | AppError::Internal { .. } | AppError::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether the caller's cancellation signal caused this error
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }

    /// Check if a retry could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::HttpClient(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.as_u16() == 429 || s.is_server_error())
            }
            _ => false,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}
