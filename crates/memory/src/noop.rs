//! No-op store — a repository with nothing in it.

use async_trait::async_trait;
use rustedrecall_core::error::RepositoryError;
use rustedrecall_core::message::StoredMessage;
use rustedrecall_core::repository::{MessageRepository, Page, SummaryRepository};
use rustedrecall_core::summary::Summary;

/// A repository that stores nothing. Useful when a deployment has no
/// summarizer and the assembler should work from messages alone.
pub struct NoopStore;

#[async_trait]
impl MessageRepository for NoopStore {
    fn name(&self) -> &str { "none" }

    async fn find_recent(&self, _limit: usize) -> Result<Vec<StoredMessage>, RepositoryError> {
        Ok(Vec::new())
    }

    async fn find_by_conversation(
        &self,
        _conversation_id: &str,
        _page: Page,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        Ok(Vec::new())
    }

    async fn find_with_embeddings(
        &self,
        _conversation_id: Option<&str>,
        _limit: usize,
        _offset: usize,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl SummaryRepository for NoopStore {
    fn name(&self) -> &str { "none" }

    async fn find_recent(&self, _limit: usize, _min_quality: f32) -> Result<Vec<Summary>, RepositoryError> {
        Ok(Vec::new())
    }

    async fn find_by_conversation(
        &self,
        _conversation_id: &str,
        _limit: usize,
    ) -> Result<Vec<Summary>, RepositoryError> {
        Ok(Vec::new())
    }
}
