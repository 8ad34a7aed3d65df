//! Vector index seam for the hybrid search's semantic branch

use async_trait::async_trait;
use tai_common::errors::Result;
use tai_common::models::RetrievalResult;

/// Nearest-neighbor lookup over embedded course material
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// At most `limit` results, best first, scored by similarity
    async fn search(&self, embedding: &[f32], limit: usize) -> Result<Vec<RetrievalResult>>;
}

/// Index returning a fixed result list
#[cfg(test)]
pub struct StaticVectorIndex {
    results: Vec<RetrievalResult>,
    failing: bool,
}

#[cfg(test)]
impl StaticVectorIndex {
    pub fn new(results: Vec<RetrievalResult>) -> Self {
        Self {
            results,
            failing: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            results: Vec::new(),
            failing: true,
        }
    }
}

#[cfg(test)]
#[async_trait]
impl VectorIndex for StaticVectorIndex {
    async fn search(&self, _embedding: &[f32], limit: usize) -> Result<Vec<RetrievalResult>> {
        if self.failing {
            return Err(tai_common::errors::AppError::Internal {
                message: "vector index offline".to_string(),
            });
        }
        Ok(self.results.iter().take(limit).cloned().collect())
    }
}
