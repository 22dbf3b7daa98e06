//! Token counters selectable per summarizer.

use std::sync::Arc;

use anyhow::Result;
use summary_harness_core::tokens::{HeuristicCounter, TokenCounter};
use tiktoken_rs::CoreBPE;

use crate::config::TokenizerKind;

/// BPE token counter using the `cl100k_base` vocabulary.
pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl TiktokenCounter {
    pub fn cl100k() -> Result<Self> {
        Ok(Self {
            bpe: tiktoken_rs::cl100k_base()?,
        })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

pub fn create_counter(kind: TokenizerKind) -> Result<Arc<dyn TokenCounter>> {
    Ok(match kind {
        TokenizerKind::Heuristic => Arc::new(HeuristicCounter),
        TokenizerKind::Cl100k => Arc::new(TiktokenCounter::cl100k()?),
    })
}
