//! Sentence parsing.
//!
//! Search prompts are split into sentences before encoding so each
//! sentence gets its own query vector. Remote parsers implement
//! [`SentenceParser`]; [`PunctuationSentenceParser`] is the built-in one.

use anyhow::Result;
use async_trait::async_trait;

/// Default upper bound on sentence length, in characters.
pub const DEFAULT_MAX_SENTENCE_LENGTH: usize = 10_000;

/// Splits text into sentences.
#[async_trait]
pub trait SentenceParser: Send + Sync {
    async fn split(&self, text: &str) -> Result<Vec<String>>;
}

/// Splits on `.`, `!` or `?` followed by whitespace.
///
/// Line breaks are folded into spaces first. Sentences at or above
/// `max_sentence_length` characters are discarded.
#[derive(Debug, Clone)]
pub struct PunctuationSentenceParser {
    pub max_sentence_length: usize,
}

impl Default for PunctuationSentenceParser {
    fn default() -> Self {
        Self {
            max_sentence_length: DEFAULT_MAX_SENTENCE_LENGTH,
        }
    }
}

impl PunctuationSentenceParser {
    pub fn new(max_sentence_length: usize) -> Self {
        Self {
            max_sentence_length,
        }
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        let folded = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut sentences = Vec::new();
        let mut current = String::new();
        let mut chars = folded.chars().peekable();

        while let Some(c) = chars.next() {
            current.push(c);
            let boundary = matches!(c, '.' | '!' | '?')
                && chars.peek().map_or(true, |next| next.is_whitespace());
            if boundary {
                self.push_sentence(&mut sentences, &current);
                current.clear();
            }
        }
        self.push_sentence(&mut sentences, &current);
        sentences
    }

    fn push_sentence(&self, sentences: &mut Vec<String>, raw: &str) {
        let sentence = raw.trim();
        if !sentence.is_empty() && sentence.chars().count() < self.max_sentence_length {
            sentences.push(sentence.to_string());
        }
    }
}

#[async_trait]
impl SentenceParser for PunctuationSentenceParser {
    async fn split(&self, text: &str) -> Result<Vec<String>> {
        Ok(self.split_text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_on_terminal_punctuation() {
        let parser = PunctuationSentenceParser::default();
        assert_eq!(
            parser.split_text("What changed? Rates rose.\nMarkets fell! Trailing"),
            vec!["What changed?", "Rates rose.", "Markets fell!", "Trailing"]
        );
    }

    #[test]
    fn test_keeps_decimals_and_abbreviated_numbers() {
        let parser = PunctuationSentenceParser::default();
        assert_eq!(
            parser.split_text("Growth was 3.5 percent. Done."),
            vec!["Growth was 3.5 percent.", "Done."]
        );
    }

    #[test]
    fn test_discards_long_sentences() {
        let parser = PunctuationSentenceParser::new(10);
        assert_eq!(
            parser.split_text("Short. This one is far too long."),
            vec!["Short."]
        );
    }

    #[tokio::test]
    async fn test_blank_text() {
        let parser = PunctuationSentenceParser::default();
        assert!(parser.split("  \n ").await.unwrap().is_empty());
    }
}
