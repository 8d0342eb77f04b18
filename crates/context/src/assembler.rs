//! Context assembly pipeline.
//!
//! Turns a [`ContextRequest`] into an [`AssembledContext`] in fixed order:
//!
//! 1. **Normalize** the request against configured defaults
//! 2. **Count** with the token profile of the requested model
//! 3. **Budget** the total across query, summaries, messages, metadata, buffer
//! 4. **Collect** summaries and messages from the repositories
//! 5. **Score** every candidate, dropping those below the threshold
//! 6. **Select** with the requested strategy
//! 7. **Optimize** the selection into the category budgets
//! 8. **Render** the final text
//! 9. **Measure** tokens, timing and efficiency
//!
//! # Failure
//!
//! Assembly never fails the caller. Any error, including a panic inside the
//! pipeline, is logged and replaced with a fallback context that carries
//! only the query.

use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use rustedrecall_config::RecallConfig;
use rustedrecall_core::{EmbeddingProvider, MessageRepository, Page, SummaryRepository};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use crate::budget::TokenBudget;
use crate::entities::EntityPatterns;
use crate::error::ContextError;
use crate::item::{ContextSource, ItemKind, ScoredItem};
use crate::optimizer::{Modification, TokenOptimizer};
use crate::request::{ContextRequest, NormalizedRequest, StrategyKind};
use crate::scorer::RelevanceScorer;
use crate::strategy::{SelectionContext, SelectionStrategy, Strategy, common};
use crate::token::TokenCounter;

// ── Types ─────────────────────────────────────────────────────────────────

/// The assembled context returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledContext {
    /// Rendered context text, starting with the query.
    pub text: String,
    /// Tokens of the rendered text.
    pub total_tokens: usize,
    /// Per-category token use.
    pub token_breakdown: TokenBreakdown,
    /// Included items in selection order.
    pub included_items: Vec<IncludedItem>,
    /// Strategy the request asked for.
    pub strategy: StrategyKind,
    pub metrics: AssemblyMetrics,
    /// Optimizer decisions for every selected item.
    #[serde(default)]
    pub modifications: Vec<Modification>,
    /// True when the pipeline failed and this is the query-only fallback.
    #[serde(default)]
    pub fallback: bool,
}

/// Token use per category. Sums to the budget total unless the rendered
/// text overran it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBreakdown {
    pub query: usize,
    pub summaries: usize,
    pub messages: usize,
    /// Headers and per-line formatting
    pub metadata: usize,
    /// Unused budget
    pub buffer: usize,
}

impl TokenBreakdown {
    pub fn sum(&self) -> usize {
        self.query + self.summaries + self.messages + self.metadata + self.buffer
    }
}

/// One item that made it into the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncludedItem {
    pub kind: ItemKind,
    pub id: String,
    pub conversation_id: String,
    pub relevance: f32,
    pub token_count: usize,
    /// Zero-based rank in the selection
    pub position: usize,
}

/// Quality and performance figures for one assembly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AssemblyMetrics {
    pub processing_time_ms: u64,
    /// Candidates scored
    pub items_evaluated: usize,
    /// Candidates left unscored because the soft deadline passed
    pub items_skipped: usize,
    pub items_included: usize,
    pub average_relevance: f32,
    /// `total_tokens / budget`
    pub token_efficiency: f32,
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Orchestrates the pipeline over shared repositories. Cheap to share
/// across tasks behind an `Arc`.
pub struct ContextAssembler {
    messages: Arc<dyn MessageRepository>,
    summaries: Arc<dyn SummaryRepository>,
    scorer: Arc<RelevanceScorer>,
    patterns: Arc<EntityPatterns>,
    config: RecallConfig,
}

impl ContextAssembler {
    /// Create an assembler with a scorer built from `config.scorer`.
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        summaries: Arc<dyn SummaryRepository>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RecallConfig,
    ) -> Self {
        let scorer = Arc::new(RelevanceScorer::new(embedder, config.scorer.clone()));
        Self::with_scorer(messages, summaries, scorer, config)
    }

    /// Create an assembler around an existing scorer, sharing its cache.
    pub fn with_scorer(
        messages: Arc<dyn MessageRepository>,
        summaries: Arc<dyn SummaryRepository>,
        scorer: Arc<RelevanceScorer>,
        config: RecallConfig,
    ) -> Self {
        Self {
            messages,
            summaries,
            scorer,
            patterns: EntityPatterns::shared(),
            config,
        }
    }

    pub fn scorer(&self) -> &RelevanceScorer {
        &self.scorer
    }

    pub fn config(&self) -> &RecallConfig {
        &self.config
    }

    /// Assemble context for `request` as of now.
    pub async fn assemble_context(&self, request: &ContextRequest) -> AssembledContext {
        self.assemble_at(request, Utc::now()).await
    }

    /// Assemble context with an explicit evaluation instant. Ages, the time
    /// window and recency boosts are all measured from `now`.
    pub async fn assemble_at(&self, request: &ContextRequest, now: DateTime<Utc>) -> AssembledContext {
        let started = Instant::now();

        let outcome = match AssertUnwindSafe(self.run(request, now, started))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => Err(ContextError::Panicked(panic_message(payload))),
        };

        match outcome {
            Ok(context) => context,
            Err(e) => {
                tracing::error!(error = %e, query = %request.query, "Context assembly failed; using fallback");
                self.fallback(request, started)
            }
        }
    }

    async fn run(
        &self,
        request: &ContextRequest,
        now: DateTime<Utc>,
        started: Instant,
    ) -> Result<AssembledContext, ContextError> {
        let request = request.normalize(&self.config)?;
        let counter = TokenCounter::for_model(&request.model);
        let query_tokens = counter.count_text(&request.query);
        let budget = TokenBudget::allocate(request.max_tokens, query_tokens, &self.config.budget);

        let candidates = self.collect_candidates(&request, now).await?;
        let (scored, skipped) = self.score_candidates(candidates, &request, now, started).await;
        let evaluated = scored.evaluated;

        let strategy = Strategy::for_kind(
            request.strategy,
            self.config.scorer.half_life_days,
            Arc::clone(&self.patterns),
        );
        let ctx = SelectionContext::new(&request, &budget, now);
        let selected = strategy.select(&scored.items, &ctx);
        tracing::debug!(
            strategy = %request.strategy,
            candidates = scored.items.len(),
            selected = selected.len(),
            "Selection complete"
        );

        let optimizer = TokenOptimizer::new(self.config.optimizer.clone(), counter);
        let optimized = optimizer.optimize(selected, &budget);

        let text = render(&request.query, &optimized.items);
        let summaries = optimized.usage.summaries.used;
        let messages = optimized.usage.messages.used;
        let content_tokens = query_tokens + summaries + messages;
        let total_tokens = counter.count_text(&text).max(content_tokens);
        let token_breakdown = TokenBreakdown {
            query: query_tokens,
            summaries,
            messages,
            metadata: total_tokens - content_tokens,
            buffer: budget.total.saturating_sub(total_tokens),
        };

        let included_items: Vec<IncludedItem> = optimized
            .items
            .iter()
            .enumerate()
            .map(|(position, item)| IncludedItem {
                kind: item.kind,
                id: item.id.clone(),
                conversation_id: item.conversation_id.clone(),
                relevance: item.relevance,
                token_count: item.token_count,
                position,
            })
            .collect();

        let average_relevance = if included_items.is_empty() {
            0.0
        } else {
            included_items.iter().map(|i| i.relevance).sum::<f32>() / included_items.len() as f32
        };
        let token_efficiency = if budget.total == 0 {
            0.0
        } else {
            total_tokens as f32 / budget.total as f32
        };

        let metrics = AssemblyMetrics {
            processing_time_ms: elapsed_ms(started),
            items_evaluated: evaluated,
            items_skipped: skipped,
            items_included: included_items.len(),
            average_relevance,
            token_efficiency,
        };

        tracing::info!(
            strategy = %request.strategy,
            included = metrics.items_included,
            total_tokens,
            budget = budget.total,
            elapsed_ms = metrics.processing_time_ms,
            "Context assembled"
        );

        Ok(AssembledContext {
            text,
            total_tokens,
            token_breakdown,
            included_items,
            strategy: request.strategy,
            metrics,
            modifications: optimized.modifications,
            fallback: false,
        })
    }

    /// Summaries first (up to half the evaluation cap), then messages for
    /// the remaining slots. Anything older than the window is dropped.
    async fn collect_candidates(
        &self,
        request: &NormalizedRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<ContextSource>, ContextError> {
        let max_items = self.config.assembly.max_items_to_evaluate;
        let min_quality = self.config.assembly.min_summary_quality;
        let summary_limit = max_items / 2;

        let summaries = match &request.conversation_id {
            Some(id) => self.summaries.find_by_conversation(id, summary_limit).await?,
            None => self.summaries.find_recent(summary_limit, min_quality).await?,
        };
        let summaries: Vec<_> = summaries
            .into_iter()
            .filter(|s| s.meets_quality(min_quality))
            .take(summary_limit)
            .collect();

        let message_limit = max_items.saturating_sub(summaries.len());
        let messages = match &request.conversation_id {
            Some(id) => {
                self.messages
                    .find_by_conversation(id, Page::newest(message_limit))
                    .await?
            }
            None => self.messages.find_recent(message_limit).await?,
        };

        let cutoff = i64::try_from(request.time_window_ms)
            .ok()
            .and_then(Duration::try_milliseconds)
            .and_then(|window| now.checked_sub_signed(window));

        let candidates: Vec<ContextSource> = summaries
            .into_iter()
            .map(ContextSource::from)
            .chain(messages.into_iter().take(message_limit).map(ContextSource::from))
            .filter(|c| cutoff.is_none_or(|cutoff| c.created_at() >= cutoff))
            .collect();

        tracing::debug!(
            candidates = candidates.len(),
            scoped = request.conversation_id.is_some(),
            "Candidates collected"
        );
        Ok(candidates)
    }

    /// Score in order until the soft deadline passes. Returns the kept items
    /// and how many candidates were skipped.
    async fn score_candidates(
        &self,
        candidates: Vec<ContextSource>,
        request: &NormalizedRequest,
        now: DateTime<Utc>,
        started: Instant,
    ) -> (Scored, usize) {
        let deadline_ms = self.config.assembly.max_processing_time_ms;
        let total = candidates.len();
        let mut scored = Scored::default();

        for candidate in candidates {
            if elapsed_ms(started) > deadline_ms {
                let skipped = total - scored.evaluated;
                tracing::warn!(
                    skipped,
                    deadline_ms,
                    "Scoring deadline passed; skipping remaining candidates"
                );
                return (scored, skipped);
            }
            let relevance = self.scorer.score(&candidate, request, now).await;
            scored.evaluated += 1;
            if relevance >= request.min_relevance {
                scored.items.push(ScoredItem::new(candidate, relevance));
            }
        }
        (scored, 0)
    }

    /// Query-only context returned when the pipeline fails.
    fn fallback(&self, request: &ContextRequest, started: Instant) -> AssembledContext {
        let model = request
            .model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.config.default_model);
        let query = request.query.trim();
        let query_tokens = TokenCounter::for_model(model).count_text(query);

        AssembledContext {
            text: query.to_string(),
            total_tokens: query_tokens,
            token_breakdown: TokenBreakdown {
                query: query_tokens,
                ..TokenBreakdown::default()
            },
            included_items: Vec::new(),
            strategy: request.strategy,
            metrics: AssemblyMetrics {
                processing_time_ms: elapsed_ms(started),
                ..AssemblyMetrics::default()
            },
            modifications: Vec::new(),
            fallback: true,
        }
    }
}

#[derive(Default)]
struct Scored {
    items: Vec<ScoredItem>,
    evaluated: usize,
}

// ── Rendering ─────────────────────────────────────────────────────────────

/// Query line, then summaries in selection order, then messages grouped by
/// conversation in chronological order.
fn render(query: &str, items: &[ScoredItem]) -> String {
    let mut sections = vec![format!("Query: {query}")];

    let summaries: Vec<&ScoredItem> = items.iter().filter(|i| i.kind == ItemKind::Summary).collect();
    if !summaries.is_empty() {
        let mut section = String::from("## Conversation Summaries");
        for summary in summaries {
            section.push_str(&format!("\n- {}", summary.content));
        }
        sections.push(section);
    }

    let messages: Vec<ScoredItem> = items
        .iter()
        .filter(|i| i.kind == ItemKind::Message)
        .cloned()
        .collect();
    if !messages.is_empty() {
        let groups = common::group_by_conversation(&messages);
        let with_headers = groups.len() > 1;
        let mut section = String::from("## Detailed Messages");
        for (conversation_id, mut group) in groups {
            group.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            if with_headers {
                section.push_str(&format!("\n\n### Conversation {conversation_id}"));
            }
            for message in group {
                let role = message.role().map(|r| r.as_str()).unwrap_or("unknown");
                section.push_str(&format!(
                    "\n[{}] {}: {}",
                    message.created_at.format("%Y-%m-%d %H:%M"),
                    role,
                    message.content
                ));
            }
        }
        sections.push(section);
    }

    sections.join("\n\n")
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rustedrecall_core::{RepositoryError, StoredMessage, Summary};
    use rustedrecall_memory::{HashingEmbedder, InMemoryMessageStore, InMemorySummaryStore, NoopStore};

    fn assembler(messages: Vec<StoredMessage>, summaries: Vec<Summary>) -> ContextAssembler {
        ContextAssembler::new(
            Arc::new(InMemoryMessageStore::with_messages(messages)),
            Arc::new(InMemorySummaryStore::with_summaries(summaries)),
            Arc::new(HashingEmbedder::default()),
            RecallConfig::default(),
        )
    }

    fn detail(topic: &str) -> String {
        format!(
            "We reviewed the {topic} in detail. The {topic} needs a careful rollout with staged \
             checks, and the team agreed on owners for every remaining {topic} task this week."
        )
    }

    struct PanickingStore;

    #[async_trait]
    impl MessageRepository for PanickingStore {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn find_recent(&self, _limit: usize) -> Result<Vec<StoredMessage>, RepositoryError> {
            panic!("storage driver crashed")
        }

        async fn find_by_conversation(
            &self,
            _conversation_id: &str,
            _page: Page,
        ) -> Result<Vec<StoredMessage>, RepositoryError> {
            panic!("storage driver crashed")
        }

        async fn find_with_embeddings(
            &self,
            _conversation_id: Option<&str>,
            _limit: usize,
            _offset: usize,
        ) -> Result<Vec<StoredMessage>, RepositoryError> {
            panic!("storage driver crashed")
        }
    }

    #[tokio::test]
    async fn renders_sections_and_breakdown() {
        let now = Utc::now();
        let assembler = assembler(
            vec![
                StoredMessage::assistant("c1", detail("database migration"))
                    .with_id("m1")
                    .at(now - Duration::hours(3)),
            ],
            vec![
                Summary::new("c1", detail("database migration"))
                    .with_id("s1")
                    .at(now - Duration::hours(5)),
            ],
        );
        let request = ContextRequest::new("database migration")
            .with_strategy(StrategyKind::Topical)
            .with_min_relevance(0.1);
        let ctx = assembler.assemble_at(&request, now).await;

        assert!(!ctx.fallback);
        assert!(ctx.text.starts_with("Query: database migration"));
        assert!(ctx.text.contains("## Conversation Summaries"));
        assert!(ctx.text.contains("## Detailed Messages"));
        assert!(!ctx.text.contains("### Conversation"));
        assert!(ctx.text.contains("assistant: We reviewed"));
        assert_eq!(ctx.included_items.len(), 2);
        assert_eq!(ctx.metrics.items_evaluated, 2);

        let b = ctx.token_breakdown;
        assert_eq!(b.sum(), 4000);
        assert!(b.summaries <= 1140 && b.messages <= 1900);
        assert_eq!(ctx.total_tokens, b.query + b.summaries + b.messages + b.metadata);
        assert!(ctx.metrics.token_efficiency > 0.0 && ctx.metrics.token_efficiency < 1.0);
        for (i, item) in ctx.included_items.iter().enumerate() {
            assert_eq!(item.position, i);
            assert!((0.0..=1.0).contains(&item.relevance));
        }
    }

    #[tokio::test]
    async fn multiple_conversations_get_headers() {
        let now = Utc::now();
        let assembler = assembler(
            vec![
                StoredMessage::user("alpha", detail("release plan")).at(now - Duration::hours(1)),
                StoredMessage::user("beta", detail("release plan")).at(now - Duration::hours(2)),
            ],
            vec![],
        );
        let request = ContextRequest::new("release plan")
            .with_strategy(StrategyKind::Temporal)
            .with_min_relevance(0.1);
        let ctx = assembler.assemble_at(&request, now).await;
        assert!(ctx.text.contains("### Conversation alpha"));
        assert!(ctx.text.contains("### Conversation beta"));
    }

    #[tokio::test]
    async fn window_and_scope_limit_candidates() {
        let now = Utc::now();
        let assembler = assembler(
            vec![
                StoredMessage::user("c1", detail("billing")).at(now - Duration::days(1)),
                StoredMessage::user("c1", detail("billing")).at(now - Duration::days(20)),
                StoredMessage::user("c2", detail("billing")).at(now - Duration::hours(1)),
            ],
            vec![],
        );
        let request = ContextRequest::new("billing").with_conversation("c1");
        let ctx = assembler.assemble_at(&request, now).await;
        assert_eq!(ctx.metrics.items_evaluated, 1);
        assert!(ctx.included_items.iter().all(|i| i.conversation_id == "c1"));
    }

    #[tokio::test]
    async fn empty_query_falls_back() {
        let assembler = assembler(vec![], vec![]);
        let ctx = assembler.assemble_context(&ContextRequest::new("   ")).await;
        assert!(ctx.fallback);
        assert!(ctx.included_items.is_empty());
        assert_eq!(ctx.total_tokens, 0);
    }

    #[tokio::test]
    async fn panics_become_fallback() {
        let assembler = ContextAssembler::new(
            Arc::new(PanickingStore),
            Arc::new(NoopStore),
            Arc::new(HashingEmbedder::default()),
            RecallConfig::default(),
        );
        let ctx = assembler
            .assemble_context(&ContextRequest::new("what broke yesterday"))
            .await;
        assert!(ctx.fallback);
        assert_eq!(ctx.text, "what broke yesterday");
        assert!(ctx.token_breakdown.query > 0);
        assert_eq!(ctx.token_breakdown.sum(), ctx.token_breakdown.query);
    }

    #[tokio::test]
    async fn zero_deadline_skips_scoring() {
        let now = Utc::now();
        let mut config = RecallConfig::default();
        config.assembly.max_processing_time_ms = 0;
        let messages: Vec<_> = (0..50)
            .map(|i| StoredMessage::user("c", detail(&format!("topic {i}"))).at(now - Duration::minutes(i)))
            .collect();
        let assembler = ContextAssembler::new(
            Arc::new(InMemoryMessageStore::with_messages(messages)),
            Arc::new(NoopStore),
            Arc::new(HashingEmbedder::default()),
            config,
        );
        let ctx = assembler.assemble_at(&ContextRequest::new("topic"), now).await;
        assert!(!ctx.fallback);
        assert_eq!(ctx.metrics.items_evaluated + ctx.metrics.items_skipped, 50);
    }

    #[test]
    fn render_without_items_is_query_only() {
        assert_eq!(render("hello", &[]), "Query: hello");
    }

    #[test]
    fn panic_payloads_are_readable() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(42u8)), "unknown panic");
    }
}
