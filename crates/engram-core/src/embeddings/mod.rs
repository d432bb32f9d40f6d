//! Embedding seam
//!
//! The embedding model is an external collaborator: this module defines
//! the trait the engine consumes plus the vector math used everywhere
//! similarity matters. Vectors are unit-norm, fixed dimension (384 in the
//! reference model), and deterministic for identical inputs.

use async_trait::async_trait;

use crate::error::Result;

/// Embedding dimension of the reference model
pub const EMBEDDING_DIMENSIONS: usize = 384;

// ============================================================================
// EMBEDDER TRAIT
// ============================================================================

/// Maps text into a fixed-length unit vector.
///
/// Failures surface as transient database errors so the retry wrapper may
/// retry them.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch; the default loops over [`Embedder::embed`]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Output dimension of this embedder
    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }
}

// ============================================================================
// VECTOR MATH
// ============================================================================

/// Cosine similarity between two vectors.
///
/// Symmetric, in [-1, 1]; returns 0.0 for mismatched or zero-norm inputs.
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
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Cosine distance (1 - similarity), the metric the vector store reports
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Scale a vector to unit length; zero vectors pass through unchanged
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

// ============================================================================
// TESTS
// ============================================================================
