//! Token counting and budget-constrained truncation
//!
//! Provides:
//! - The `Tokenizer` seam used by every packer
//! - A tiktoken (`cl100k_base`) implementation
//! - The shared "fit or truncate or stop" packing rule

use crate::errors::{AppError, Result};
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

/// Appended to truncated text
pub const DEFAULT_TRUNCATION_SUFFIX: &str = "...";

/// Remaining budget at or below which an overflowing item is dropped instead of truncated
pub const MIN_TRUNCATION_TOKENS: usize = 100;

/// Token counting interface
pub trait Tokenizer: Send + Sync {
    /// Count tokens in text
    fn count_tokens(&self, text: &str) -> usize;

    /// Truncate text so that the result, suffix included, is at most `max_tokens`
    fn truncate_to_tokens(&self, text: &str, max_tokens: usize, suffix: &str) -> String;

    /// Truncate with the default `...` suffix
    fn truncate(&self, text: &str, max_tokens: usize) -> String {
        self.truncate_to_tokens(text, max_tokens, DEFAULT_TRUNCATION_SUFFIX)
    }
}

/// Outcome of fitting one item into the remaining budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fit {
    /// The item fits unchanged
    Whole(String),
    /// The item was cut down to the remaining budget; packing should stop after it
    Truncated(String),
}

impl Fit {
    pub fn into_text(self) -> String {
        match self {
            Fit::Whole(text) | Fit::Truncated(text) => text,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, Fit::Truncated(_))
    }
}

/// Fit `text` into `remaining` tokens.
///
/// Returns the text unchanged when it fits, a truncated copy when it overflows
/// and more than `min_truncation` tokens remain, and `BudgetExceeded` otherwise.
pub fn fit_to_budget(
    tokenizer: &dyn Tokenizer,
    text: &str,
    remaining: usize,
    min_truncation: usize,
) -> Result<Fit> {
    let required = tokenizer.count_tokens(text);
    if required <= remaining {
        return Ok(Fit::Whole(text.to_string()));
    }
    if remaining > min_truncation {
        return Ok(Fit::Truncated(tokenizer.truncate(text, remaining)));
    }
    Err(AppError::BudgetExceeded {
        required,
        remaining,
    })
}

/// Exact token counter wrapping tiktoken's cl100k_base encoding
#[derive(Clone)]
pub struct TiktokenTokenizer {
    bpe: Arc<CoreBPE>,
}

impl TiktokenTokenizer {
    /// Load the cl100k_base encoding
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| AppError::Configuration {
            message: format!("Failed to load cl100k_base tokenizer: {}", e),
        })?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    fn truncate_to_tokens(&self, text: &str, max_tokens: usize, suffix: &str) -> String {
        let tokens = self.bpe.encode_ordinary(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }
        if max_tokens == 0 {
            return String::new();
        }

        // Drop the suffix when it alone would consume the whole budget
        let suffix_tokens = self.count_tokens(suffix);
        let (suffix, mut keep) = if suffix_tokens < max_tokens {
            (suffix, max_tokens - suffix_tokens)
        } else {
            ("", max_tokens)
        };

        // Decoding a prefix can split a multi-byte character or re-merge
        // differently, so every candidate is re-counted before it is accepted.
        while keep > 0 {
            if let Ok(head) = self.bpe.decode(tokens[..keep].to_vec()) {
                let candidate = format!("{}{}", head, suffix);
                if self.count_tokens(&candidate) <= max_tokens {
                    return candidate;
                }
            }
            keep -= 1;
        }

        if !suffix.is_empty() && self.count_tokens(suffix) <= max_tokens {
            suffix.to_string()
        } else {
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer() -> TiktokenTokenizer {
        TiktokenTokenizer::cl100k().unwrap()
    }

    #[test]
    fn test_count_empty_is_zero() {
        assert_eq!(tokenizer().count_tokens(""), 0);
    }

    #[test]
    fn test_count_simple_text() {
        let count = tokenizer().count_tokens("Raft elects a leader");
        assert!(count > 0 && count < 10, "got {}", count);
    }

    #[test]
    fn test_short_text_is_not_truncated() {
        let text = "Paxos reaches consensus.";
        assert_eq!(tokenizer().truncate(text, 50), text);
    }

    #[test]
    fn test_truncation_respects_cap_including_suffix() {
        let tok = tokenizer();
        let text = "log replication ".repeat(200);
        for max in [1, 2, 3, 10, 57, 150] {
            let truncated = tok.truncate(&text, max);
            assert!(
                tok.count_tokens(&truncated) <= max,
                "cap {} exceeded: {}",
                max,
                tok.count_tokens(&truncated)
            );
        }
        assert!(tok.truncate(&text, 20).ends_with(DEFAULT_TRUNCATION_SUFFIX));
    }

    #[test]
    fn test_zero_budget_yields_empty() {
        assert_eq!(tokenizer().truncate("anything at all", 0), "");
    }

    #[test]
    fn test_multibyte_text_truncates_cleanly() {
        let tok = tokenizer();
        let text = "分布式系统 共识算法 ".repeat(60);
        let truncated = tok.truncate(&text, 25);
        assert!(tok.count_tokens(&truncated) <= 25);
        assert!(!truncated.contains('\u{FFFD}'));
    }

    #[test]
    fn test_fit_whole() {
        let tok = tokenizer();
        let fit = fit_to_budget(&tok, "short text", 500, MIN_TRUNCATION_TOKENS).unwrap();
        assert_eq!(fit, Fit::Whole("short text".into()));
    }

    #[test]
    fn test_fit_truncates_with_room_left() {
        let tok = tokenizer();
        let text = "consensus ".repeat(400);
        let fit = fit_to_budget(&tok, &text, 150, MIN_TRUNCATION_TOKENS).unwrap();
        assert!(fit.is_truncated());
        assert!(tok.count_tokens(&fit.into_text()) <= 150);
    }

    #[test]
    fn test_fit_stops_when_little_room_left() {
        let tok = tokenizer();
        let text = "consensus ".repeat(400);
        let err = fit_to_budget(&tok, &text, 100, MIN_TRUNCATION_TOKENS).unwrap_err();
        assert!(matches!(err, AppError::BudgetExceeded { remaining: 100, .. }));
    }
}
