//! Test doubles
//!
//! A deterministic bag-of-words embedder (identical inputs always produce
//! identical unit vectors, overlapping vocabulary produces high cosine
//! similarity) and a builder for a fully in-process memory store.

use async_trait::async_trait;
use std::sync::Arc;

use engram_core::embeddings::normalize;
use engram_core::retry::RetryPolicy;
use engram_core::{Embedder, InMemoryStore, MemoryStore, Result};

/// Dimension of the test embedding space
pub const TEST_DIMENSIONS: usize = 64;

/// Deterministic bag-of-words embedder
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicEmbedder;

#[async_trait]
impl Embedder for DeterministicEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; TEST_DIMENSIONS];
        for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if word.len() < 2 {
                continue;
            }
            v[(fnv(word) % TEST_DIMENSIONS as u32) as usize] += 1.0;
        }
        Ok(normalize(&v))
    }

    fn dimensions(&self) -> usize {
        TEST_DIMENSIONS
    }
}

fn fnv(word: &str) -> u32 {
    let mut h: u32 = 2166136261;
    for b in word.bytes() {
        h = (h ^ b as u32).wrapping_mul(16777619);
    }
    h
}

/// A memory store over the in-process vector store and the deterministic
/// embedder, with retries disabled
pub fn test_store() -> Arc<MemoryStore> {
    Arc::new(
        MemoryStore::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(DeterministicEmbedder),
        )
        .with_retry_policy(RetryPolicy::none()),
    )
}
