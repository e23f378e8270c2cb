//! Embedding Service: turns chunk text into fixed-dimension vectors.
//!
//! Pluggable behind [`EmbeddingService`] so a real model-backed provider can
//! be swapped in later; the default is a deterministic seeded bag-of-hashed-
//! terms embedder with no network dependency, so indexing never blocks on an
//! external service and stays reproducible across runs.

use ahash::AHasher;
use std::hash::{Hash, Hasher};

use crate::error::EmbedError;

pub trait EmbeddingService: Send + Sync {
    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Hashes whitespace-delimited lowercase terms into buckets of a fixed-size
/// vector, accumulating a signed weight per bucket and L2-normalizing the
/// result. Two runs over identical text always produce identical vectors.
pub struct HashingEmbeddingService {
    dimensions: usize,
}

impl HashingEmbeddingService {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl EmbeddingService for HashingEmbeddingService {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if self.dimensions == 0 {
            return Err(EmbedError::DimensionMismatch {
                expected: 1,
                got: 0,
            });
        }

        let mut vector = vec![0f32; self.dimensions];
        for term in tokenize(text) {
            let mut hasher = AHasher::default();
            term.hash(&mut hasher);
            let code = hasher.finish();
            let bucket = (code as usize) % self.dimensions;
            let sign = if (code >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }

        Ok(vector)
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
}

/// Cosine similarity between two equal-length vectors, used by the default
/// vector store and by result-scoring in the retrieval engine. Returns 0.0
/// for mismatched lengths or zero-norm vectors rather than panicking.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
