//! Storage abstractions for Summary Harness.
//!
//! The orchestrator and allocator talk to four external stores through
//! these traits, which keeps the ranking and allocation logic free of
//! database and HTTP dependencies:
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`LeaseStore`] | Shared key → requester-set map backing provider leases |
//! | [`VectorIndex`] | Sentence-level similarity search |
//! | [`DocumentSource`] | Full sentence lists of indexed documents |
//! | [`SummaryCache`] | Previously computed summaries by content key |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//! In-memory versions of all four live in [`memory`].

pub mod memory;

use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{DocumentScope, DocumentSentences, SentenceHit, SummaryResult};

/// Shared key-value map from lease key to the set of requester identities
/// holding it.
///
/// Read-modify-write sequences are not atomic at this level. Callers
/// serialize them with a named mutex.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Current holders of `key`. Missing keys have no holders.
    async fn holders(&self, key: &str) -> Result<BTreeSet<String>>;

    /// Replace the holders of `key`. An empty set removes the key.
    async fn set_holders(&self, key: &str, holders: &BTreeSet<String>) -> Result<()>;

    /// Every key with at least one holder, ordered by key.
    async fn entries(&self) -> Result<Vec<(String, BTreeSet<String>)>>;
}

/// Batched sentence-level similarity search.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Run one search per query vector.
    ///
    /// Result `i` holds the hits for `vectors[i]`, at most `limit` of them,
    /// each scoring at least `min_score` and belonging to a document
    /// admitted by `scope`.
    async fn search(
        &self,
        vectors: &[Vec<f32>],
        limit: usize,
        scope: &DocumentScope,
        min_score: f32,
    ) -> Result<Vec<Vec<SentenceHit>>>;
}

/// Lookup of a document's sentences in index order.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn document(&self, id: &str) -> Result<Option<DocumentSentences>>;
}

/// A cached summary and the request it answered.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub text: String,
    pub config: String,
    pub result: SummaryResult,
}

/// Previously computed summaries keyed by [`content_key`](crate::models::content_key).
#[async_trait]
pub trait SummaryCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    async fn put(&self, key: &str, entry: &CacheEntry) -> Result<()>;
}
