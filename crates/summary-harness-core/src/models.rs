//! Core data models for Summary Harness.
//!
//! These types flow between the provider allocator, the passage ranker,
//! the chunk assembler and the map-reduce orchestrator. They carry no
//! behavior beyond small accounting helpers, so every backend (SQLite,
//! Qdrant, in-memory) can share them.
//!
//! # Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Role`] | Kind of inference service a request needs |
//! | [`DeviceLimit`] / [`ProviderSpec`] | Declared capacity of a provider |
//! | [`Chunk`] | One unit of LLM input produced by the assembler |
//! | [`RankedPassage`] | A document's relevant sentences and their score |
//! | [`Usage`] / [`SummaryResult`] | Token and cost accounting |

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of inference service leased for a summary request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SentenceParser,
    Encoder,
    Summarizer,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::SentenceParser, Role::Encoder, Role::Summarizer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SentenceParser => "sentence_parser",
            Role::Encoder => "encoder",
            Role::Summarizer => "summarizer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concurrency limit for one device of a provider.
///
/// `max_concurrent == 0` means the device is unlimited and the allocator
/// never counts its leases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLimit {
    pub index: u32,
    pub max_concurrent: u32,
}

impl DeviceLimit {
    pub fn unlimited(index: u32) -> Self {
        Self {
            index,
            max_concurrent: 0,
        }
    }

    pub fn is_limited(&self) -> bool {
        self.max_concurrent > 0
    }
}

/// A named provider and the devices it may be placed on, in preference order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub name: String,
    pub device_limits: Vec<DeviceLimit>,
}

impl ProviderSpec {
    /// A provider with a single unlimited device at index 0.
    pub fn unlimited(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device_limits: vec![DeviceLimit::unlimited(0)],
        }
    }
}

/// Build the lease key `"{role}.{provider}.{device}"`.
pub fn lease_key(role: Role, provider: &str, device: &str) -> String {
    format!("{}.{}.{}", role, provider, device)
}

/// Which collection restricts a document-scoped request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "ids")]
pub enum DocumentScope {
    /// Search every document in the index.
    All,
    /// Search only these documents. An empty list matches nothing.
    Only(Vec<String>),
}

impl DocumentScope {
    pub fn admits(&self, document_id: &str) -> bool {
        match self {
            DocumentScope::All => true,
            DocumentScope::Only(ids) => ids.iter().any(|id| id == document_id),
        }
    }
}

/// Where a chunk's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Text,
    DocumentExcerpt,
}

/// A unit of LLM input. Indices are contiguous from 0 and define the order
/// in which extraction outputs are concatenated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub source_type: SourceType,
    pub source_id: Option<String>,
}

/// One sentence hit returned by a vector index for a single query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct SentenceHit {
    pub document_id: String,
    pub sentence_index: usize,
    pub sentence: String,
    pub score: f32,
}

/// All sentences of one document in index order.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSentences {
    pub id: String,
    pub title: Option<String>,
    pub sentences: Vec<String>,
}

/// Inclusive range of sentence indices rendered as one excerpt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PassageWindow {
    pub start: usize,
    pub end: usize,
}

/// A document's hit sentences, their excerpt windows and aggregate score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedPassage {
    pub document_id: String,
    pub title: Option<String>,
    pub score: f64,
    pub sentence_indices: BTreeSet<usize>,
    pub windows: Vec<PassageWindow>,
    /// Rendered excerpt text, one entry per window.
    pub excerpts: Vec<String>,
}

/// Token and cost usage of one or more inference calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, other: Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.output_tokens += other.output_tokens;
        self.cost += other.cost;
    }
}

/// Final answer of a summary request plus the usage of every call made for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub text: String,
    pub prompt_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

impl SummaryResult {
    pub fn new(text: impl Into<String>, usage: Usage) -> Self {
        Self {
            text: text.into(),
            prompt_tokens: usage.prompt_tokens,
            output_tokens: usage.output_tokens,
            cost: usage.cost,
        }
    }

    pub fn usage(&self) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens,
            output_tokens: self.output_tokens,
            cost: self.cost,
        }
    }
}

/// SHA-256 over the request text and its serialized configuration.
///
/// Used as the summary cache key, so identical requests with identical
/// settings map to the same entry.
pub fn content_key(text: &str, config: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update([0u8]);
    hasher.update(config.as_bytes());
    format!("{:x}", hasher.finalize())
}
