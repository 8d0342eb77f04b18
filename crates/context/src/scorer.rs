//! Multi-signal relevance scoring.
//!
//! A candidate's relevance is a weighted sum of four signals in [0, 1]:
//!
//! 1. **Semantic** — cosine similarity of query and content embeddings
//! 2. **Temporal** — exponential decay by age against a half-life
//! 3. **Entity** — Jaccard overlap of extracted entities
//! 4. **Structural** — item kind, conversation scope, metadata, role
//!
//! Query-specific multiplicative boosts are applied afterwards and the
//! result is clamped into [0, 1]. Scoring fails soft: any error yields 0 for
//! that candidate only.

use chrono::{DateTime, Utc};
use lru::LruCache;
use regex_lite::Regex;
use rustedrecall_config::ScorerConfig;
use rustedrecall_core::{EmbeddingError, EmbeddingProvider, Role};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, LazyLock, Mutex};

use crate::entities::EntityPatterns;
use crate::error::ContextError;
use crate::item::{ContextSource, ItemKind, clamp_unit};
use crate::request::NormalizedRequest;

const MS_PER_DAY: f64 = 86_400_000.0;

const QUESTION_ANSWER_BOOST: f32 = 1.15;
const CODE_BOOST: f32 = 1.20;
const ERROR_BOOST: f32 = 1.25;
const RECENCY_BOOST: f32 = 1.10;

fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("built-in scorer pattern compiles")
}

static QUESTION: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\b(?:what|why|how|when|where|who|which|whose|explain)\b|\?")
});
static ANSWER: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\b(?:because|therefore|thus|hence|result|resulted|due to|so that|answer|solution|solved|means|caused by)\b")
});
static CODE_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\b(?:code|function|method|class|struct|implement|implementation|compile|syntax|api|script|snippet|refactor|module|variable)\b")
});
static CODE_CONTENT: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"```|`[^`\n]+`|\b(?:fn|def|function|class|impl|let|const|return|import|struct|async|await)\b|\b[A-Za-z_][A-Za-z0-9_]*\([^)\n]*\)")
});
static ERROR_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\b(?:error|errors|exception|fail|fails|failed|failure|crash|crashed|bug|bugs|broken|traceback|panic|stacktrace)\b")
});
static ERROR_CONTENT: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\b(?:error|exception|traceback|failed|failure|panic|panicked|stack trace)\b|\b[45]\d\d\b|\bline \d+\b")
});
static TIME_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\b(?:recent|recently|latest|today|yesterday|now|current|currently|new|newest|last)\b")
});

// --- Embedding cache ---

/// Query text to embedding, least recently used evicted first. `None` when
/// the configured capacity is zero.
type EmbeddingCache = Option<LruCache<String, Vec<f32>>>;

fn embedding_cache(capacity: usize) -> EmbeddingCache {
    NonZeroUsize::new(capacity).map(LruCache::new)
}

// --- Scorer ---

/// Per-signal view of one score, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub semantic: f32,
    pub temporal: f32,
    pub entity: f32,
    pub structural: f32,
    /// Weighted sum before boosts
    pub weighted: f32,
    /// Product of the boosts that fired
    pub boost: f32,
    /// Final clamped relevance
    pub score: f32,
}

/// Scores candidates against a request.
///
/// Shareable across tasks; the only mutable state is the query embedding
/// cache, which is never locked across an `.await`.
pub struct RelevanceScorer {
    embedder: Arc<dyn EmbeddingProvider>,
    config: ScorerConfig,
    patterns: Arc<EntityPatterns>,
    cache: Mutex<EmbeddingCache>,
}

impl RelevanceScorer {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, config: ScorerConfig) -> Self {
        if !config.weights_balanced() {
            tracing::warn!(
                sum = config.weight_sum(),
                "Scorer weights do not sum to 1.0; relevance will be skewed"
            );
        }
        let cache = Mutex::new(embedding_cache(config.embedding_cache_capacity));
        Self {
            embedder,
            config,
            patterns: EntityPatterns::shared(),
            cache,
        }
    }

    /// Swap the entity pattern policy.
    pub fn with_patterns(mut self, patterns: Arc<EntityPatterns>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Relevance of one candidate, in [0, 1]. Errors are logged and scored 0.
    pub async fn score(
        &self,
        candidate: &ContextSource,
        request: &NormalizedRequest,
        now: DateTime<Utc>,
    ) -> f32 {
        match self.score_breakdown(candidate, request, now).await {
            Ok(breakdown) => breakdown.score,
            Err(e) => {
                tracing::warn!(item = candidate.id(), error = %e, "Scoring failed; using 0");
                0.0
            }
        }
    }

    /// All four signals plus the boost factor.
    pub async fn score_breakdown(
        &self,
        candidate: &ContextSource,
        request: &NormalizedRequest,
        now: DateTime<Utc>,
    ) -> Result<ScoreBreakdown, ContextError> {
        let content = candidate.content();

        let semantic = self.semantic_score(candidate, &request.query).await?;
        let temporal = temporal_decay(candidate.created_at(), now, self.config.half_life_days);
        let entity = self.entity_score(content, request);
        let structural = structural_score(candidate, request.conversation_id.as_deref());

        let c = &self.config;
        let weighted = c.semantic_weight * semantic
            + c.temporal_weight * temporal
            + c.entity_weight * entity
            + c.structural_weight * structural;

        let age_hours = (now - candidate.created_at()).num_milliseconds() as f64 / 3_600_000.0;
        let boost = query_boost(&request.query, content, request.include_recent, age_hours);

        Ok(ScoreBreakdown {
            semantic,
            temporal,
            entity,
            structural,
            weighted,
            boost,
            score: clamp_unit(weighted * boost),
        })
    }

    /// Drop all memoized query embeddings.
    pub fn clear_cache(&self) {
        if let Some(cache) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).as_mut() {
            cache.clear();
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(0, LruCache::len)
    }

    async fn query_embedding(&self, query: &str) -> Result<Vec<f32>, EmbeddingError> {
        let cached = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_mut()
            .and_then(|cache| cache.get(query).cloned());
        if let Some(vector) = cached {
            return Ok(vector);
        }
        let vector = self.embedder.embed(query).await?;
        if let Some(cache) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).as_mut() {
            cache.put(query.to_string(), vector.clone());
        }
        Ok(vector)
    }

    async fn semantic_score(
        &self,
        candidate: &ContextSource,
        query: &str,
    ) -> Result<f32, EmbeddingError> {
        let query_vec = self.query_embedding(query).await?;
        let content_vec = match candidate {
            ContextSource::Message(m) if m.embedding.as_ref().is_some_and(|e| !e.is_empty()) => {
                m.embedding.clone().unwrap_or_default()
            }
            _ => self.embedder.embed(candidate.content()).await?,
        };
        if query_vec.len() != content_vec.len() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: query_vec.len(),
                actual: content_vec.len(),
            });
        }

        let similarity = self.embedder.similarity(&query_vec, &content_vec);
        if !similarity.is_finite() || similarity < self.config.min_similarity {
            return Ok(0.0);
        }
        Ok(clamp_unit(similarity))
    }

    fn entity_score(&self, content: &str, request: &NormalizedRequest) -> f32 {
        let mut query_entities = self.patterns.extract(&request.query);
        query_entities.extend(request.focus_entities.iter().map(|e| e.to_lowercase()));
        if query_entities.is_empty() {
            return 0.5;
        }

        let lowered = content.to_lowercase();
        let mut item_entities: BTreeSet<String> = self.patterns.extract(content);
        let mut exact_matches = 0usize;
        for entity in &query_entities {
            if lowered.contains(entity.as_str()) {
                exact_matches += 1;
                item_entities.insert(entity.clone());
            }
        }

        let intersection = query_entities.intersection(&item_entities).count();
        let union = query_entities.union(&item_entities).count();
        if union == 0 {
            return 0.0;
        }
        let jaccard = intersection as f32 / union as f32;
        clamp_unit(jaccard * (1.0 + 0.1 * exact_matches as f32))
    }
}

/// `exp(-ln2 / half_life * age)` in days, boosted ×1.2 inside the first day.
/// Future-dated items score 1.0.
pub fn temporal_decay(created_at: DateTime<Utc>, now: DateTime<Utc>, half_life_days: f64) -> f32 {
    let age_days = (now - created_at).num_milliseconds() as f64 / MS_PER_DAY;
    if age_days < 0.0 {
        return 1.0;
    }
    let half_life = if half_life_days > 0.0 { half_life_days } else { 7.0 };
    let mut score = (-std::f64::consts::LN_2 / half_life * age_days).exp();
    if age_days < 1.0 {
        score *= 1.2;
    }
    clamp_unit(score as f32)
}

fn structural_score(candidate: &ContextSource, target_conversation: Option<&str>) -> f32 {
    let mut score = 0.5;
    if candidate.kind() == ItemKind::Summary {
        score += 0.2;
    }
    if target_conversation.is_some_and(|id| id == candidate.conversation_id()) {
        score += 0.3;
    }
    if !candidate.metadata().is_empty() {
        score += 0.1;
    }
    match candidate.role() {
        Some(Role::Assistant) => score += 0.1,
        Some(Role::System) => score += 0.05,
        _ => {}
    }
    clamp_unit(score)
}

fn query_boost(query: &str, content: &str, include_recent: bool, age_hours: f64) -> f32 {
    let mut boost = 1.0;
    if QUESTION.is_match(query) && ANSWER.is_match(content) {
        boost *= QUESTION_ANSWER_BOOST;
    }
    if CODE_QUERY.is_match(query) && CODE_CONTENT.is_match(content) {
        boost *= CODE_BOOST;
    }
    if ERROR_QUERY.is_match(query) && ERROR_CONTENT.is_match(content) {
        boost *= ERROR_BOOST;
    }
    if include_recent && TIME_QUERY.is_match(query) && (0.0..24.0).contains(&age_hours) {
        boost *= RECENCY_BOOST;
    }
    boost
}
