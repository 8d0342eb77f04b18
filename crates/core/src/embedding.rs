//! Embedding capability — turns text into fixed-size vectors.
//!
//! Real providers (remote APIs, local models) live outside this workspace.
//! The pipeline only needs `embed` and a similarity measure.

use crate::error::EmbeddingError;
use async_trait::async_trait;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Cosine similarity between two vectors produced by this provider.
    fn similarity(&self, a: &[f32], b: &[f32]) -> f32;
}
