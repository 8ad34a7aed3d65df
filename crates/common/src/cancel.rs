//! Cooperative cancellation for collaborator calls
//!
//! Every embedding, LLM, and graph call is raced against the caller's
//! `CancellationToken` so a cancelled request stops at its next suspension point.

use crate::errors::{AppError, Result};
use std::future::Future;

pub use tokio_util::sync::CancellationToken;

/// Run `fut` unless `cancel` fires first
pub async fn guarded<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(AppError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        result = fut => result,
    }
}

/// Fail fast between steps that do not themselves await a collaborator
pub fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(AppError::Cancelled)
    } else {
        Ok(())
    }
}
