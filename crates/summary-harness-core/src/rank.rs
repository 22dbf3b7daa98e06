//! Passage ranker over sentence-level vector search.
//!
//! The ranker operates entirely through the [`VectorIndex`] and
//! [`DocumentSource`] traits. The caller splits and encodes the search
//! prompt; this module turns the resulting sentence hits into ordered,
//! excerpted passages ready for the chunk assembler.
//!
//! # Algorithm
//!
//! 1. Search the index once per query vector, restricted to the document
//!    scope and the `min_score` floor.
//! 2. Aggregate hits by document. A sentence hit by several query vectors
//!    counts once, with the score of its first hit.
//! 3. Score each document with a [`PassageScorer`]. Documents scoring zero
//!    or less are dropped.
//! 4. Expand every hit sentence into a window of neighbouring sentences,
//!    at most `window_tokens / 2` tokens on each side, and merge windows
//!    that overlap or are separated by a single sentence.
//! 5. Sort by score (desc), then document id (asc).
//!
//! # Default score
//!
//! [`DensityScorer`] computes
//! `sum(hit scores) × (doc hits / total hits) × (1 + topic_weight × overlap)`,
//! where `overlap` is the fraction of the document's hit sentences sharing a
//! topic word with the search prompt.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;

use crate::models::{DocumentScope, DocumentSentences, PassageWindow, RankedPassage, SentenceHit};
use crate::store::{DocumentSource, VectorIndex};
use crate::tokens::TokenCounter;

/// Default weight of topic overlap in [`DensityScorer`].
pub const DEFAULT_TOPIC_WEIGHT: f64 = 0.5;

/// Words ignored when extracting topics.
const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "also", "because", "been", "before", "being",
    "below", "between", "both", "could", "does", "doing", "down", "during", "each", "from",
    "further", "have", "having", "here", "into", "itself", "just", "more", "most", "only",
    "other", "over", "same", "should", "some", "such", "than", "that", "their", "them", "then",
    "there", "these", "they", "this", "those", "through", "under", "until", "very", "were",
    "what", "when", "where", "which", "while", "will", "with", "would", "your",
];

/// Retrieval tuning for one ranking call.
#[derive(Debug, Clone)]
pub struct RankOptions {
    /// Maximum hits per query vector.
    pub limit: usize,
    /// Similarity floor for a hit to count.
    pub min_score: f32,
    /// Token budget of an excerpt window around each hit sentence.
    pub window_tokens: usize,
}

/// Hits of one document, deduplicated by sentence index.
#[derive(Debug, Clone, Default)]
pub struct DocumentHits {
    pub document_id: String,
    pub score_sum: f64,
    pub sentences: BTreeMap<usize, String>,
}

impl DocumentHits {
    pub fn hit_count(&self) -> usize {
        self.sentences.len()
    }
}

/// Scores a document's hits for passage ordering.
pub trait PassageScorer: Send + Sync {
    fn score(&self, hits: &DocumentHits, total_hits: usize, query_topics: &BTreeSet<String>)
        -> f64;
}

/// Hit-density score boosted by topic overlap with the search prompt.
#[derive(Debug, Clone, Copy)]
pub struct DensityScorer {
    pub topic_weight: f64,
}

impl Default for DensityScorer {
    fn default() -> Self {
        Self {
            topic_weight: DEFAULT_TOPIC_WEIGHT,
        }
    }
}

impl PassageScorer for DensityScorer {
    fn score(
        &self,
        hits: &DocumentHits,
        total_hits: usize,
        query_topics: &BTreeSet<String>,
    ) -> f64 {
        if total_hits == 0 || hits.hit_count() == 0 {
            return 0.0;
        }
        let density = hits.hit_count() as f64 / total_hits as f64;
        hits.score_sum * density * (1.0 + self.topic_weight * topic_overlap(hits, query_topics))
    }
}

fn topic_overlap(hits: &DocumentHits, query_topics: &BTreeSet<String>) -> f64 {
    if query_topics.is_empty() || hits.sentences.is_empty() {
        return 0.0;
    }
    let matching = hits
        .sentences
        .values()
        .filter(|sentence| !topics(sentence).is_disjoint(query_topics))
        .count();
    matching as f64 / hits.sentences.len() as f64
}

/// Lowercased content words of at least four letters, minus stop words.
pub fn topics(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= 4)
        .filter(|word| !word.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_lowercase)
        .filter(|word| !STOP_WORDS.contains(&word.as_str()))
        .collect()
}

/// Group hits by document, counting each sentence once.
pub fn aggregate_hits(rankings: &[Vec<SentenceHit>], min_score: f32) -> Vec<DocumentHits> {
    let mut by_document: BTreeMap<String, DocumentHits> = BTreeMap::new();

    for hit in rankings.iter().flatten() {
        if hit.score < min_score {
            continue;
        }
        let entry = by_document
            .entry(hit.document_id.clone())
            .or_insert_with(|| DocumentHits {
                document_id: hit.document_id.clone(),
                ..Default::default()
            });
        if entry.sentences.contains_key(&hit.sentence_index) {
            continue;
        }
        entry
            .sentences
            .insert(hit.sentence_index, hit.sentence.clone());
        entry.score_sum += hit.score as f64;
    }
    by_document.into_values().collect()
}

/// Rank documents in `scope` against the encoded search prompt.
#[allow(clippy::too_many_arguments)]
pub async fn rank(
    index: &dyn VectorIndex,
    documents: &dyn DocumentSource,
    vectors: &[Vec<f32>],
    scope: &DocumentScope,
    query_topics: &BTreeSet<String>,
    options: &RankOptions,
    scorer: &dyn PassageScorer,
    counter: &dyn TokenCounter,
) -> Result<Vec<RankedPassage>> {
    if vectors.is_empty() || options.limit == 0 {
        return Ok(Vec::new());
    }

    let rankings = index
        .search(vectors, options.limit, scope, options.min_score)
        .await?;
    let aggregated = aggregate_hits(&rankings, options.min_score);
    let total_hits: usize = aggregated.iter().map(DocumentHits::hit_count).sum();

    let mut passages = Vec::new();
    for hits in aggregated {
        let score = scorer.score(&hits, total_hits, query_topics);
        if score.is_nan() || score <= 0.0 {
            continue;
        }
        let Some(document) = documents.document(&hits.document_id).await? else {
            continue;
        };
        let sentence_indices: BTreeSet<usize> = hits
            .sentences
            .keys()
            .copied()
            .filter(|i| *i < document.sentences.len())
            .collect();
        if sentence_indices.is_empty() {
            continue;
        }

        let windows = build_windows(
            &sentence_indices,
            &document.sentences,
            counter,
            options.window_tokens,
        );
        let excerpts = render_excerpts(&document, &windows);
        passages.push(RankedPassage {
            document_id: hits.document_id,
            title: document.title,
            score,
            sentence_indices,
            windows,
            excerpts,
        });
    }

    passages.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    Ok(passages)
}

/// Expand each hit into a window and merge windows at most one sentence apart.
pub fn build_windows(
    hits: &BTreeSet<usize>,
    sentences: &[String],
    counter: &dyn TokenCounter,
    window_tokens: usize,
) -> Vec<PassageWindow> {
    let side_budget = window_tokens / 2;
    let mut windows: Vec<PassageWindow> = hits
        .iter()
        .filter(|&&hit| hit < sentences.len())
        .map(|&hit| {
            let mut start = hit;
            let mut used = 0;
            while start > 0 {
                let cost = counter.count(&sentences[start - 1]);
                if used + cost > side_budget {
                    break;
                }
                used += cost;
                start -= 1;
            }

            let mut end = hit;
            used = 0;
            while end + 1 < sentences.len() {
                let cost = counter.count(&sentences[end + 1]);
                if used + cost > side_budget {
                    break;
                }
                used += cost;
                end += 1;
            }
            PassageWindow { start, end }
        })
        .collect();

    windows.sort_by_key(|w| (w.start, w.end));
    let mut merged: Vec<PassageWindow> = Vec::with_capacity(windows.len());
    for window in windows {
        match merged.last_mut() {
            Some(last) if window.start <= last.end + 2 => {
                last.end = last.end.max(window.end);
            }
            _ => merged.push(window),
        }
    }
    merged
}

/// Render each window as `Excerpt from <title or id>:` followed by its sentences.
pub fn render_excerpts(document: &DocumentSentences, windows: &[PassageWindow]) -> Vec<String> {
    let label = document.title.as_deref().unwrap_or(&document.id);
    windows
        .iter()
        .map(|w| {
            let end = w.end.min(document.sentences.len().saturating_sub(1));
            let body = document.sentences[w.start..=end].join(" ");
            format!("Excerpt from {}:\n{}", label, body)
        })
        .collect()
}
