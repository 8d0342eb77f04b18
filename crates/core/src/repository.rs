//! Repository traits — read access to persisted messages and summaries.
//!
//! The context engine never writes. It needs three kinds of lookup:
//! - most-recent-first across all conversations
//! - paginated, ordered lookup within one conversation
//! - embedding-bearing rows for vector-side consumers

use crate::error::RepositoryError;
use crate::message::StoredMessage;
use crate::summary::Summary;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Ordering by `created_at`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    /// Newest first (default)
    #[default]
    Desc,
}

/// A page request for conversation-scoped lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Maximum number of rows
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Rows to skip
    #[serde(default)]
    pub offset: usize,

    /// Ordering by creation time
    #[serde(default)]
    pub direction: SortDirection,
}

fn default_limit() -> usize {
    50
}

impl Page {
    /// Newest-first page of `limit` rows.
    pub fn newest(limit: usize) -> Self {
        Self {
            limit,
            offset: 0,
            direction: SortDirection::Desc,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::newest(default_limit())
    }
}

/// Read access to stored messages.
///
/// Implementations: in-memory (for testing), no-op; database backends live
/// outside this workspace.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// The backend name (e.g., "in_memory", "none").
    fn name(&self) -> &str;

    /// Most recent messages across all conversations, newest first.
    async fn find_recent(&self, limit: usize) -> Result<Vec<StoredMessage>, RepositoryError>;

    /// Messages of one conversation, ordered by `created_at`.
    async fn find_by_conversation(
        &self,
        conversation_id: &str,
        page: Page,
    ) -> Result<Vec<StoredMessage>, RepositoryError>;

    /// Messages that carry an embedding, optionally scoped to a conversation.
    async fn find_with_embeddings(
        &self,
        conversation_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StoredMessage>, RepositoryError>;
}

/// Read access to stored summaries.
#[async_trait]
pub trait SummaryRepository: Send + Sync {
    fn name(&self) -> &str;

    /// Most recent summaries whose quality is at least `min_quality`.
    async fn find_recent(
        &self,
        limit: usize,
        min_quality: f32,
    ) -> Result<Vec<Summary>, RepositoryError>;

    /// Summaries of one conversation, newest first.
    async fn find_by_conversation(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<Summary>, RepositoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_defaults() {
        let page = Page::default();
        assert_eq!(page.limit, 50);
        assert_eq!(page.offset, 0);
        assert_eq!(page.direction, SortDirection::Desc);
    }

    #[test]
    fn page_deserializes_with_defaults() {
        let page: Page = serde_json::from_str(r#"{"direction":"asc"}"#).unwrap();
        assert_eq!(page.limit, 50);
        assert_eq!(page.direction, SortDirection::Asc);
    }
}
