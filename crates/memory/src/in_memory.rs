//! In-memory stores — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use rustedrecall_core::error::RepositoryError;
use rustedrecall_core::message::StoredMessage;
use rustedrecall_core::repository::{MessageRepository, Page, SortDirection, SummaryRepository};
use rustedrecall_core::summary::Summary;
use std::sync::Arc;
use tokio::sync::RwLock;

/// An in-memory message store backed by a Vec.
pub struct InMemoryMessageStore {
    messages: Arc<RwLock<Vec<StoredMessage>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self {
            messages: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Build a store pre-populated with `messages`.
    pub fn with_messages(messages: Vec<StoredMessage>) -> Self {
        Self {
            messages: Arc::new(RwLock::new(messages)),
        }
    }

    pub async fn insert(&self, message: StoredMessage) {
        self.messages.write().await.push(message);
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(items: &mut [StoredMessage]) {
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[async_trait]
impl MessageRepository for InMemoryMessageStore {
    fn name(&self) -> &str { "in_memory" }

    async fn find_recent(&self, limit: usize) -> Result<Vec<StoredMessage>, RepositoryError> {
        let mut results = self.messages.read().await.clone();
        newest_first(&mut results);
        results.truncate(limit);
        Ok(results)
    }

    async fn find_by_conversation(
        &self,
        conversation_id: &str,
        page: Page,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let mut results: Vec<StoredMessage> = self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();

        match page.direction {
            SortDirection::Desc => newest_first(&mut results),
            SortDirection::Asc => results.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        }

        Ok(results
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }

    async fn find_with_embeddings(
        &self,
        conversation_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let mut results: Vec<StoredMessage> = self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| m.embedding.is_some())
            .filter(|m| conversation_id.is_none_or(|id| m.conversation_id == id))
            .cloned()
            .collect();
        newest_first(&mut results);
        Ok(results.into_iter().skip(offset).take(limit).collect())
    }
}

/// An in-memory summary store backed by a Vec.
pub struct InMemorySummaryStore {
    summaries: Arc<RwLock<Vec<Summary>>>,
}

impl InMemorySummaryStore {
    pub fn new() -> Self {
        Self {
            summaries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_summaries(summaries: Vec<Summary>) -> Self {
        Self {
            summaries: Arc::new(RwLock::new(summaries)),
        }
    }

    pub async fn insert(&self, summary: Summary) {
        self.summaries.write().await.push(summary);
    }
}

impl Default for InMemorySummaryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SummaryRepository for InMemorySummaryStore {
    fn name(&self) -> &str { "in_memory" }

    async fn find_recent(
        &self,
        limit: usize,
        min_quality: f32,
    ) -> Result<Vec<Summary>, RepositoryError> {
        let mut results: Vec<Summary> = self
            .summaries
            .read()
            .await
            .iter()
            .filter(|s| s.meets_quality(min_quality))
            .cloned()
            .collect();
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        results.truncate(limit);
        Ok(results)
    }

    async fn find_by_conversation(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<Summary>, RepositoryError> {
        let mut results: Vec<Summary> = self
            .summaries
            .read()
            .await
            .iter()
            .filter(|s| s.conversation_id == conversation_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        results.truncate(limit);
        Ok(results)
    }
}
