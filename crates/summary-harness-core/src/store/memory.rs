//! In-memory store implementations for tests and single-process use.
//!
//! Uses `HashMap`/`BTreeMap` and `Vec` behind `std::sync::RwLock` for
//! thread safety. Vector search is brute-force cosine similarity over all
//! stored sentence vectors.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{DocumentScope, DocumentSentences, SentenceHit};

use super::{CacheEntry, DocumentSource, LeaseStore, SummaryCache, VectorIndex};

/// In-memory lease map.
#[derive(Default)]
pub struct InMemoryLeaseStore {
    leases: RwLock<BTreeMap<String, BTreeSet<String>>>,
}

impl InMemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn holders(&self, key: &str) -> Result<BTreeSet<String>> {
        let leases = self.leases.read().unwrap();
        Ok(leases.get(key).cloned().unwrap_or_default())
    }

    async fn set_holders(&self, key: &str, holders: &BTreeSet<String>) -> Result<()> {
        let mut leases = self.leases.write().unwrap();
        if holders.is_empty() {
            leases.remove(key);
        } else {
            leases.insert(key.to_string(), holders.clone());
        }
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<(String, BTreeSet<String>)>> {
        let leases = self.leases.read().unwrap();
        Ok(leases
            .iter()
            .map(|(key, holders)| (key.clone(), holders.clone()))
            .collect())
    }
}

struct StoredDocument {
    title: Option<String>,
    sentences: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

/// In-memory sentence index that is both a [`VectorIndex`] and a
/// [`DocumentSource`].
#[derive(Default)]
pub struct InMemoryIndex {
    docs: RwLock<BTreeMap<String, StoredDocument>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document. `vectors[i]` embeds `sentences[i]`.
    pub fn insert(
        &self,
        id: &str,
        title: Option<&str>,
        sentences: Vec<String>,
        vectors: Vec<Vec<f32>>,
    ) {
        let mut docs = self.docs.write().unwrap();
        docs.insert(
            id.to_string(),
            StoredDocument {
                title: title.map(str::to_string),
                sentences,
                vectors,
            },
        );
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn search(
        &self,
        vectors: &[Vec<f32>],
        limit: usize,
        scope: &DocumentScope,
        min_score: f32,
    ) -> Result<Vec<Vec<SentenceHit>>> {
        let docs = self.docs.read().unwrap();
        let mut rankings = Vec::with_capacity(vectors.len());

        for query in vectors {
            let mut hits: Vec<SentenceHit> = docs
                .iter()
                .filter(|(id, _)| scope.admits(id))
                .flat_map(|(id, doc)| {
                    doc.vectors
                        .iter()
                        .zip(doc.sentences.iter())
                        .enumerate()
                        .map(move |(index, (vector, sentence))| SentenceHit {
                            document_id: id.clone(),
                            sentence_index: index,
                            sentence: sentence.clone(),
                            score: cosine_similarity(query, vector),
                        })
                })
                .filter(|hit| hit.score >= min_score)
                .collect();

            hits.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.document_id.cmp(&b.document_id))
                    .then_with(|| a.sentence_index.cmp(&b.sentence_index))
            });
            hits.truncate(limit);
            rankings.push(hits);
        }
        Ok(rankings)
    }
}

#[async_trait]
impl DocumentSource for InMemoryIndex {
    async fn document(&self, id: &str) -> Result<Option<DocumentSentences>> {
        let docs = self.docs.read().unwrap();
        Ok(docs.get(id).map(|doc| DocumentSentences {
            id: id.to_string(),
            title: doc.title.clone(),
            sentences: doc.sentences.clone(),
        }))
    }
}

/// In-memory summary cache.
#[derive(Default)]
pub struct InMemorySummaryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemorySummaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SummaryCache for InMemorySummaryCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), entry.clone());
        Ok(())
    }
}
