//! # RustedRecall Core
//!
//! Domain types, collaborator traits, and error definitions for the
//! RustedRecall context engine. This crate has **no pipeline logic**: it
//! defines the stored-conversation model and the seams (repositories,
//! embeddings) that the context pipeline is written against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping storage or embedding backends without touching the pipeline
//! - Easy testing with in-memory or failing stubs
//! - Clean dependency graph (all crates depend inward on core)

pub mod embedding;
pub mod error;
pub mod message;
pub mod repository;
pub mod summary;

// Re-export key types at crate root for ergonomics
pub use embedding::EmbeddingProvider;
pub use error::{EmbeddingError, RepositoryError};
pub use message::{Role, StoredMessage};
pub use repository::{MessageRepository, Page, SortDirection, SummaryRepository};
pub use summary::{Summary, SummaryLevel};
