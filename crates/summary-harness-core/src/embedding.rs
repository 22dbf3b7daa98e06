//! Encoder trait and vector utilities.
//!
//! Defines the [`Encoder`] trait that sentence-embedding backends
//! implement. The HTTP implementation lives in the `summary-harness`
//! app crate; tests use in-memory encoders.

use anyhow::Result;
use async_trait::async_trait;

/// Turns sentences into embedding vectors, one per input, in input order.
///
/// Implementations handle batching above their per-call limit.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    async fn encode(&self, sentences: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors
/// of different lengths and zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
