//! Token counting.
//!
//! The assembler and prompt formats only need an estimate of how many
//! tokens a piece of text costs. The app crate provides a BPE counter;
//! this module provides the trait and a character heuristic.

/// Approximate characters-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimates the token cost of text for a particular model family.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// `ceil(chars / 4)` over the trimmed text. Blank text costs nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str) -> usize {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return 0;
        }
        trimmed.chars().count().div_ceil(CHARS_PER_TOKEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_is_zero() {
        assert_eq!(HeuristicCounter.count(""), 0);
        assert_eq!(HeuristicCounter.count(" \n\t "), 0);
    }

    #[test]
    fn test_rounds_up() {
        assert_eq!(HeuristicCounter.count("abcd"), 1);
        assert_eq!(HeuristicCounter.count("abcde"), 2);
        assert_eq!(HeuristicCounter.count(&"x".repeat(400)), 100);
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        assert_eq!(HeuristicCounter.count("éééé"), 1);
    }
}
