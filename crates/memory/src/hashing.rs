//! Feature-hashing embedder — deterministic, offline, dependency-free.
//!
//! Each lower-cased word is hashed (SHA-256) into one of `dimensions`
//! buckets with a hash-derived sign, and the resulting bag-of-words vector
//! is normalized. Texts that share vocabulary get a high cosine similarity.
//! This is not a semantic model; it stands in for one in tests and in
//! deployments without an embedding service.

use async_trait::async_trait;
use rustedrecall_core::embedding::EmbeddingProvider;
use rustedrecall_core::error::EmbeddingError;
use sha2::{Digest, Sha256};

use crate::vector::{cosine_similarity, normalize};

const DEFAULT_DIMENSIONS: usize = 256;

pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let words = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase);

        for word in words {
            let digest = Sha256::digest(word.as_bytes());
            let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
                % self.dimensions;
            let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        normalize(&mut vector);
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_sync(text))
    }

    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b)
    }
}
