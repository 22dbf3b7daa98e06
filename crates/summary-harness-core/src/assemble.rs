//! Token-budgeted chunk assembler.
//!
//! Packs text sections and ranked passage excerpts into the fewest
//! [`Chunk`]s whose estimated prompt size fits the summarizer's window.
//!
//! # Algorithm
//!
//! 1. Walk candidates in order, skipping blank ones.
//! 2. Append a candidate to the open chunk (joined by `\n\n`) while
//!    `prompt_overhead + tokens(chunk + "\n\n" + candidate) <= max_tokens`.
//! 3. Otherwise close the open chunk and open a new one with the candidate.
//!    A candidate that alone exceeds the budget still gets its own chunk.
//! 4. Stop once `max_chunks` chunks exist (`0` = unlimited). Remaining
//!    candidates are dropped.
//!
//! The fit check counts the joined text, separators included, so a packed
//! chunk never estimates above the budget. A chunk takes the source of its
//! first candidate.
//!
//! # Example
//!
//! ```rust
//! use summary_harness_core::assemble::{assemble, Candidate, ChunkBudget};
//! use summary_harness_core::tokens::HeuristicCounter;
//!
//! let candidates = vec![Candidate::text("a".repeat(40)), Candidate::text("b".repeat(40))];
//! let budget = ChunkBudget { max_tokens: 15, prompt_overhead: 0, max_chunks: 0 };
//! let chunks = assemble(&candidates, &budget, &HeuristicCounter);
//! assert_eq!(chunks.len(), 2);
//! ```

use crate::models::{Chunk, RankedPassage, SourceType};
use crate::tokens::TokenCounter;

const CHUNK_SEPARATOR: &str = "\n\n";

/// A piece of content waiting to be packed.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub text: String,
    pub source_type: SourceType,
    pub source_id: Option<String>,
}

impl Candidate {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_type: SourceType::Text,
            source_id: None,
        }
    }

    pub fn excerpt(document_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_type: SourceType::DocumentExcerpt,
            source_id: Some(document_id.into()),
        }
    }
}

/// One candidate per excerpt, in passage order.
pub fn passage_candidates(passages: &[RankedPassage]) -> Vec<Candidate> {
    passages
        .iter()
        .flat_map(|p| {
            p.excerpts
                .iter()
                .map(move |excerpt| Candidate::excerpt(p.document_id.clone(), excerpt.clone()))
        })
        .collect()
}

/// Limits applied while packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkBudget {
    /// Token window available to one prompt.
    pub max_tokens: usize,
    /// Tokens consumed by the prompt's fixed instruction, persona and format.
    pub prompt_overhead: usize,
    /// Upper bound on the number of chunks, `0` for none.
    pub max_chunks: usize,
}

struct OpenChunk {
    text: String,
    source_type: SourceType,
    source_id: Option<String>,
}

impl OpenChunk {
    fn start(candidate: &Candidate) -> Self {
        Self {
            text: candidate.text.trim().to_string(),
            source_type: candidate.source_type,
            source_id: candidate.source_id.clone(),
        }
    }

    fn close(self, index: usize) -> Chunk {
        Chunk {
            index,
            text: self.text,
            source_type: self.source_type,
            source_id: self.source_id,
        }
    }
}

/// Greedily pack `candidates` into chunks under `budget`.
///
/// Chunk indices are contiguous from 0. No chunk is empty.
pub fn assemble(
    candidates: &[Candidate],
    budget: &ChunkBudget,
    counter: &dyn TokenCounter,
) -> Vec<Chunk> {
    let at_capacity = |count: usize| budget.max_chunks > 0 && count >= budget.max_chunks;
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut open: Option<OpenChunk> = None;

    for candidate in candidates {
        let text = candidate.text.trim();
        if text.is_empty() {
            continue;
        }
        if let Some(chunk) = open.as_mut() {
            let joined = format!("{}{}{}", chunk.text, CHUNK_SEPARATOR, text);
            if budget.prompt_overhead + counter.count(&joined) <= budget.max_tokens {
                chunk.text = joined;
                continue;
            }
        }
        if let Some(full) = open.take() {
            chunks.push(full.close(chunks.len()));
            if at_capacity(chunks.len()) {
                return chunks;
            }
        }
        open = Some(OpenChunk::start(candidate));
    }

    if let Some(last) = open {
        if !at_capacity(chunks.len()) {
            chunks.push(last.close(chunks.len()));
        }
    }
    chunks
}
