//! Hierarchical conversation summaries.
//!
//! Summaries are produced by a separate summarization subsystem. The
//! context engine only reads them back and treats them as dense,
//! high-value candidates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Granularity of a stored summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryLevel {
    Brief,
    #[default]
    Standard,
    Detailed,
}

impl SummaryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryLevel::Brief => "brief",
            SummaryLevel::Standard => "standard",
            SummaryLevel::Detailed => "detailed",
        }
    }
}

/// A summary covering a span of one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub level: SummaryLevel,
    pub summary_text: String,
    /// Number of messages the summary covers
    #[serde(default)]
    pub message_count: usize,
    /// Quality score assigned by the summarizer (0.0–1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f32>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Summary {
    pub fn new(conversation_id: impl Into<String>, summary_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            level: SummaryLevel::default(),
            summary_text: summary_text.into(),
            message_count: 0,
            quality_score: None,
            created_at: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_level(mut self, level: SummaryLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality_score = Some(quality.clamp(0.0, 1.0));
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Whether the summary clears a quality floor. Summaries the validator
    /// has not scored yet are not held back.
    pub fn meets_quality(&self, min_quality: f32) -> bool {
        self.quality_score.is_none_or(|q| q >= min_quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_is_clamped() {
        let s = Summary::new("c", "text").with_quality(1.7);
        assert_eq!(s.quality_score, Some(1.0));
        assert!(Summary::new("c", "text").meets_quality(0.9));
        assert!(!Summary::new("c", "text").with_quality(0.2).meets_quality(0.5));
    }

    #[test]
    fn level_roundtrip() {
        let s = Summary::new("c", "text").with_level(SummaryLevel::Detailed);
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"detailed\""));
        let back: Summary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.level, SummaryLevel::Detailed);
    }
}
