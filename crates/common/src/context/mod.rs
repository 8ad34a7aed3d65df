//! Context assembly under token budgets
//!
//! Provides:
//! - `ContextBuilder` for rendering retrieval results into one cited block
//! - `ContextManager` for the full system message plus pruned history
//! - The shared packing loop both rely on

mod builder;
mod manager;

pub use builder::ContextBuilder;
pub use manager::ContextManager;

use crate::tokens::{fit_to_budget, Fit, Tokenizer};

/// Join items with `separator`, never letting the joined text exceed `budget` tokens.
///
/// Items are taken in order while they fit. The first item that overflows is
/// truncated into the remaining space when more than `min_truncation` tokens
/// remain, and packing stops after it either way.
pub(crate) fn pack_joined<I>(
    tokenizer: &dyn Tokenizer,
    items: I,
    separator: &str,
    budget: usize,
    min_truncation: usize,
) -> String
where
    I: IntoIterator<Item = String>,
{
    let mut packed = String::new();

    for (idx, item) in items.into_iter().enumerate() {
        let prefix = if idx == 0 {
            String::new()
        } else {
            format!("{}{}", packed, separator)
        };
        let remaining = budget.saturating_sub(tokenizer.count_tokens(&prefix));

        match fit_to_budget(tokenizer, &item, remaining, min_truncation) {
            Ok(Fit::Whole(text)) => {
                let candidate = format!("{}{}", prefix, text);
                if tokenizer.count_tokens(&candidate) <= budget {
                    packed = candidate;
                    continue;
                }
                // Tokens merged across the seam; treat as an overflow
                if remaining > min_truncation {
                    if let Some(settled) = settle(tokenizer, &prefix, &item, remaining, budget) {
                        packed = settled;
                    }
                }
                break;
            }
            Ok(Fit::Truncated(_)) => {
                if let Some(settled) = settle(tokenizer, &prefix, &item, remaining, budget) {
                    packed = settled;
                }
                break;
            }
            Err(e) => {
                tracing::debug!(item = idx, error = %e, "context packing stopped");
                break;
            }
        }
    }

    packed
}

/// Truncate `item` until `prefix + item` fits in `budget`
fn settle(
    tokenizer: &dyn Tokenizer,
    prefix: &str,
    item: &str,
    mut allowance: usize,
    budget: usize,
) -> Option<String> {
    while allowance > 0 {
        let candidate = format!("{}{}", prefix, tokenizer.truncate(item, allowance));
        let used = tokenizer.count_tokens(&candidate);
        if used <= budget {
            tracing::debug!(tokens = used, budget, "context item truncated to fit");
            return Some(candidate);
        }
        allowance = allowance.saturating_sub((used - budget).max(1));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::{TiktokenTokenizer, MIN_TRUNCATION_TOKENS};

    fn tok() -> TiktokenTokenizer {
        TiktokenTokenizer::cl100k().unwrap()
    }

    #[test]
    fn test_everything_fits() {
        let tok = tok();
        let items = vec!["Raft".to_string(), "Paxos".to_string()];
        let packed = pack_joined(&tok, items, "\n\n", 1000, MIN_TRUNCATION_TOKENS);
        assert_eq!(packed, "Raft\n\nPaxos");
    }

    #[test]
    fn test_overflow_truncates_and_stops() {
        let tok = tok();
        let items = vec![
            "leader election ".repeat(50),
            "log replication ".repeat(400),
            "never reached".to_string(),
        ];
        let packed = pack_joined(&tok, items, "\n\n", 400, MIN_TRUNCATION_TOKENS);
        assert!(tok.count_tokens(&packed) <= 400);
        assert!(packed.contains("log replication"));
        assert!(!packed.contains("never reached"));
    }

    #[test]
    fn test_small_remainder_drops_item() {
        let tok = tok();
        let first = "quorum ".repeat(150);
        let first_tokens = tok.count_tokens(&first);
        let items = vec![first.clone(), "term ".repeat(300)];
        let packed = pack_joined(&tok, items, "\n\n", first_tokens + 50, MIN_TRUNCATION_TOKENS);
        assert_eq!(packed, first);
    }

    #[test]
    fn test_zero_budget_is_empty() {
        let packed = pack_joined(&tok(), vec!["anything".to_string()], "\n\n", 0, 100);
        assert!(packed.is_empty());
    }
}
