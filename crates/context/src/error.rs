//! Error types for the context pipeline.

use rustedrecall_core::{EmbeddingError, RepositoryError};

/// Errors raised inside the assembly pipeline.
///
/// None of these reach callers of `assemble_context`; the assembler turns
/// them into a fallback context. They are public so that individual stages
/// can be driven directly.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Candidate collection failed: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Pipeline panicked: {0}")]
    Panicked(String),
}

pub type Result<T> = std::result::Result<T, ContextError>;
