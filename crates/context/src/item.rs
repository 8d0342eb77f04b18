//! Scored candidates flowing through the pipeline.

use chrono::{DateTime, Utc};
use rustedrecall_core::{Role, StoredMessage, Summary};
use serde::{Deserialize, Serialize};

/// Whether an item is a summary or a raw message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Summary,
    Message,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Summary => "summary",
            ItemKind::Message => "message",
        }
    }
}

/// The domain object a candidate was built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContextSource {
    Summary(Summary),
    Message(StoredMessage),
}

impl ContextSource {
    pub fn kind(&self) -> ItemKind {
        match self {
            ContextSource::Summary(_) => ItemKind::Summary,
            ContextSource::Message(_) => ItemKind::Message,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ContextSource::Summary(s) => &s.id,
            ContextSource::Message(m) => &m.id,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            ContextSource::Summary(s) => &s.summary_text,
            ContextSource::Message(m) => &m.content,
        }
    }

    pub fn conversation_id(&self) -> &str {
        match self {
            ContextSource::Summary(s) => &s.conversation_id,
            ContextSource::Message(m) => &m.conversation_id,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            ContextSource::Summary(s) => s.created_at,
            ContextSource::Message(m) => m.created_at,
        }
    }

    pub fn metadata(&self) -> &serde_json::Map<String, serde_json::Value> {
        match self {
            ContextSource::Summary(s) => &s.metadata,
            ContextSource::Message(m) => &m.metadata,
        }
    }

    /// Sender role; summaries have none.
    pub fn role(&self) -> Option<Role> {
        match self {
            ContextSource::Summary(_) => None,
            ContextSource::Message(m) => Some(m.role),
        }
    }
}

impl From<StoredMessage> for ContextSource {
    fn from(message: StoredMessage) -> Self {
        ContextSource::Message(message)
    }
}

impl From<Summary> for ContextSource {
    fn from(summary: Summary) -> Self {
        ContextSource::Summary(summary)
    }
}

/// A candidate with its relevance attached.
///
/// Stages never mutate an item in place; they derive new values through the
/// `with_*` builders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredItem {
    pub id: String,
    pub kind: ItemKind,
    pub content: String,
    /// Relevance in [0, 1]
    pub relevance: f32,
    /// Approximate tokens of `content`; 0 until the optimizer counts it
    pub token_count: usize,
    pub created_at: DateTime<Utc>,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub source: ContextSource,
    /// Recency sub-score written by the temporal strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_score: Option<f32>,
    /// Entity match sub-score written by the entity-centric strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_score: Option<f32>,
}

impl ScoredItem {
    pub fn new(source: impl Into<ContextSource>, relevance: f32) -> Self {
        let source = source.into();
        Self {
            id: source.id().to_string(),
            kind: source.kind(),
            content: source.content().to_string(),
            relevance: clamp_unit(relevance),
            token_count: 0,
            created_at: source.created_at(),
            conversation_id: source.conversation_id().to_string(),
            metadata: source.metadata().clone(),
            source,
            temporal_score: None,
            entity_score: None,
        }
    }

    pub fn with_relevance(mut self, relevance: f32) -> Self {
        self.relevance = clamp_unit(relevance);
        self
    }

    pub fn with_temporal_score(mut self, score: f32) -> Self {
        self.temporal_score = Some(clamp_unit(score));
        self
    }

    pub fn with_entity_score(mut self, score: f32) -> Self {
        self.entity_score = Some(clamp_unit(score));
        self
    }

    /// Replace the content and record its token count.
    pub fn with_content(mut self, content: impl Into<String>, token_count: usize) -> Self {
        self.content = content.into();
        self.token_count = token_count;
        self
    }

    pub fn with_token_count(mut self, token_count: usize) -> Self {
        self.token_count = token_count;
        self
    }

    pub fn is_summary(&self) -> bool {
        self.kind == ItemKind::Summary
    }

    pub fn role(&self) -> Option<Role> {
        self.source.role()
    }

    /// Age in fractional hours. Negative for future-dated items.
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_milliseconds() as f64 / 3_600_000.0
    }
}

/// Clamp into [0, 1], mapping NaN to 0.
pub(crate) fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn item_copies_source_fields() {
        let msg = StoredMessage::assistant("conv-1", "the fix landed")
            .with_id("m1")
            .with_metadata("channel", serde_json::json!("cli"));
        let item = ScoredItem::new(msg, 0.4);
        assert_eq!(item.id, "m1");
        assert_eq!(item.kind, ItemKind::Message);
        assert_eq!(item.conversation_id, "conv-1");
        assert_eq!(item.content, "the fix landed");
        assert_eq!(item.role(), Some(Role::Assistant));
        assert_eq!(item.token_count, 0);
        assert!(!item.metadata.is_empty());
    }

    #[test]
    fn relevance_is_clamped() {
        let item = ScoredItem::new(Summary::new("c", "s"), 1.8);
        assert_eq!(item.relevance, 1.0);
        assert_eq!(item.clone().with_relevance(-0.2).relevance, 0.0);
        assert_eq!(item.with_relevance(f32::NAN).relevance, 0.0);
    }

    #[test]
    fn with_builders_leave_original_untouched() {
        let item = ScoredItem::new(Summary::new("c", "s"), 0.5);
        let blended = item.clone().with_relevance(0.9).with_temporal_score(0.7);
        assert_eq!(item.relevance, 0.5);
        assert!(item.temporal_score.is_none());
        assert_eq!(blended.temporal_score, Some(0.7));
    }

    #[test]
    fn age_in_hours() {
        let now = Utc::now();
        let item = ScoredItem::new(StoredMessage::user("c", "x").at(now - Duration::hours(30)), 0.5);
        assert!((item.age_hours(now) - 30.0).abs() < 1e-6);
    }

    #[test]
    fn source_serializes_with_type_tag() {
        let item = ScoredItem::new(Summary::new("c", "s"), 0.5);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kind"], "summary");
        assert_eq!(json["source"]["type"], "summary");
    }
}
