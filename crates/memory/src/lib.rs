//! Storage and embedding implementations for RustedRecall.
//!
//! Persistent database backends are deliberately not part of this
//! workspace; the in-memory stores serve tests, demos and embedders that
//! keep history in process.

pub mod hashing;
pub mod in_memory;
pub mod noop;
pub mod vector;

pub use hashing::HashingEmbedder;
pub use in_memory::{InMemoryMessageStore, InMemorySummaryStore};
pub use noop::NoopStore;
pub use vector::cosine_similarity;
