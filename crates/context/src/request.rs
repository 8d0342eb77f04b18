//! Context requests and their normalization.

use rustedrecall_config::RecallConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ContextError;

/// Which selection strategy the assembler dispatches to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Temporal,
    Topical,
    EntityCentric,
    #[default]
    Hybrid,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Temporal => "temporal",
            StrategyKind::Topical => "topical",
            StrategyKind::EntityCentric => "entity-centric",
            StrategyKind::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "temporal" => Ok(Self::Temporal),
            "topical" => Ok(Self::Topical),
            "entity-centric" | "entity_centric" | "entity" => Ok(Self::EntityCentric),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(ContextError::InvalidRequest(format!(
                "unknown strategy '{other}'"
            ))),
        }
    }
}

/// A request for assembled context, as received from a caller.
///
/// Optional fields fall back to [`RecallConfig`] defaults during
/// [`ContextRequest::normalize`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextRequest {
    pub query: String,

    /// Restrict candidates to one conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,

    #[serde(default)]
    pub strategy: StrategyKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_relevance: Option<f32>,

    #[serde(default)]
    pub include_recent: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub focus_entities: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window_ms: Option<u64>,

    /// Model identifier used for token accounting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ContextRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_min_relevance(mut self, min_relevance: f32) -> Self {
        self.min_relevance = Some(min_relevance);
        self
    }

    pub fn with_focus_entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.focus_entities = entities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_time_window_ms(mut self, window_ms: u64) -> Self {
        self.time_window_ms = Some(window_ms);
        self
    }

    pub fn with_include_recent(mut self, include_recent: bool) -> Self {
        self.include_recent = include_recent;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Fill defaults and clean up caller input.
    ///
    /// Fails only when the query is empty after trimming.
    pub fn normalize(&self, config: &RecallConfig) -> Result<NormalizedRequest, ContextError> {
        let query = self.query.trim();
        if query.is_empty() {
            return Err(ContextError::InvalidRequest("query must not be empty".into()));
        }

        let conversation_id = self
            .conversation_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        let max_tokens = self
            .max_tokens
            .filter(|n| *n > 0)
            .unwrap_or(config.assembly.default_max_tokens);

        let min_relevance = self
            .min_relevance
            .filter(|r| r.is_finite())
            .unwrap_or(config.assembly.default_min_relevance)
            .clamp(0.0, 1.0);

        let time_window_ms = self
            .time_window_ms
            .filter(|w| *w > 0)
            .unwrap_or(config.assembly.default_time_window_ms);

        let model = self
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&config.default_model)
            .to_string();

        let mut seen = HashSet::new();
        let focus_entities = self
            .focus_entities
            .iter()
            .map(|e| e.trim())
            .filter(|e| !e.is_empty())
            .filter(|e| seen.insert(e.to_lowercase()))
            .map(str::to_string)
            .collect();

        Ok(NormalizedRequest {
            query: query.to_string(),
            conversation_id,
            max_tokens,
            strategy: self.strategy,
            min_relevance,
            include_recent: self.include_recent,
            focus_entities,
            time_window_ms,
            model,
        })
    }
}

/// A request with every default applied. All pipeline stages take this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRequest {
    pub query: String,
    pub conversation_id: Option<String>,
    pub max_tokens: usize,
    pub strategy: StrategyKind,
    pub min_relevance: f32,
    pub include_recent: bool,
    pub focus_entities: Vec<String>,
    pub time_window_ms: u64,
    pub model: String,
}

impl NormalizedRequest {
    /// Window length in days.
    pub fn time_window_days(&self) -> f64 {
        self.time_window_ms as f64 / 86_400_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_applied() {
        let config = RecallConfig::default();
        let req = ContextRequest::new("  what did we decide?  ")
            .normalize(&config)
            .unwrap();
        assert_eq!(req.query, "what did we decide?");
        assert_eq!(req.max_tokens, 4000);
        assert_eq!(req.strategy, StrategyKind::Hybrid);
        assert_eq!(req.min_relevance, 0.3);
        assert_eq!(req.time_window_ms, 7 * 24 * 60 * 60 * 1000);
        assert_eq!(req.model, "gpt-4");
        assert!(req.conversation_id.is_none());
        assert!(!req.include_recent);
    }

    #[test]
    fn empty_query_rejected() {
        let config = RecallConfig::default();
        let err = ContextRequest::new("   ").normalize(&config).unwrap_err();
        assert!(matches!(err, ContextError::InvalidRequest(_)));
    }

    #[test]
    fn inputs_cleaned() {
        let config = RecallConfig::default();
        let req = ContextRequest::new("q")
            .with_conversation("  ")
            .with_min_relevance(1.5)
            .with_max_tokens(0)
            .with_time_window_ms(0)
            .with_model(" claude-3 ")
            .with_focus_entities(["Acme Corp", " acme corp ", "", "Bob"])
            .normalize(&config)
            .unwrap();
        assert!(req.conversation_id.is_none());
        assert_eq!(req.min_relevance, 1.0);
        assert_eq!(req.max_tokens, 4000);
        assert_eq!(req.time_window_ms, config.assembly.default_time_window_ms);
        assert_eq!(req.model, "claude-3");
        assert_eq!(req.focus_entities, vec!["Acme Corp", "Bob"]);
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!("temporal".parse::<StrategyKind>().unwrap(), StrategyKind::Temporal);
        assert_eq!(
            "Entity-Centric".parse::<StrategyKind>().unwrap(),
            StrategyKind::EntityCentric
        );
        assert!("random".parse::<StrategyKind>().is_err());
        let json = serde_json::to_string(&StrategyKind::EntityCentric).unwrap();
        assert_eq!(json, "\"entity-centric\"");
    }

    #[test]
    fn request_deserializes_from_minimal_json() {
        let req: ContextRequest =
            serde_json::from_str(r#"{"query":"deploy issues","strategy":"topical"}"#).unwrap();
        assert_eq!(req.strategy, StrategyKind::Topical);
        assert!(req.focus_entities.is_empty());
    }
}
