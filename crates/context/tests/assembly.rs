//! End-to-end tests for the context assembly pipeline.
//!
//! Each test wires real in-memory repositories and the hashing embedder
//! into a `ContextAssembler` and checks the assembled output.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rustedrecall_config::RecallConfig;
use rustedrecall_context::strategy::HybridStrategy;
use rustedrecall_context::{
    ContextAssembler, ContextRequest, ContextSource, ItemKind, ModificationAction,
    RelevanceScorer, ScoredItem, SelectionContext, StrategyKind, TokenBudget, TokenCounter,
    TokenOptimizer,
};
use rustedrecall_core::{
    MessageRepository, Page, RepositoryError, StoredMessage, Summary, SummaryRepository,
};
use rustedrecall_memory::{HashingEmbedder, InMemoryMessageStore, InMemorySummaryStore, NoopStore};

// ── Helpers ──────────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn assembler(messages: Vec<StoredMessage>, summaries: Vec<Summary>) -> ContextAssembler {
    ContextAssembler::new(
        Arc::new(InMemoryMessageStore::with_messages(messages)),
        Arc::new(InMemorySummaryStore::with_summaries(summaries)),
        Arc::new(HashingEmbedder::default()),
        RecallConfig::default(),
    )
}

/// A repository whose every lookup fails.
struct UnavailableStore;

#[async_trait::async_trait]
impl MessageRepository for UnavailableStore {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn find_recent(&self, _limit: usize) -> Result<Vec<StoredMessage>, RepositoryError> {
        Err(RepositoryError::Unavailable("connection refused".into()))
    }

    async fn find_by_conversation(
        &self,
        _conversation_id: &str,
        _page: Page,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        Err(RepositoryError::Unavailable("connection refused".into()))
    }

    async fn find_with_embeddings(
        &self,
        _conversation_id: Option<&str>,
        _limit: usize,
        _offset: usize,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        Err(RepositoryError::Unavailable("connection refused".into()))
    }
}

#[async_trait::async_trait]
impl SummaryRepository for UnavailableStore {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn find_recent(&self, _limit: usize, _min_quality: f32) -> Result<Vec<Summary>, RepositoryError> {
        Err(RepositoryError::QueryFailed("timeout".into()))
    }

    async fn find_by_conversation(
        &self,
        _conversation_id: &str,
        _limit: usize,
    ) -> Result<Vec<Summary>, RepositoryError> {
        Err(RepositoryError::QueryFailed("timeout".into()))
    }
}

// ── Temporal recency ─────────────────────────────────────────────────────

#[tokio::test]
async fn temporal_strategy_prefers_recent_messages_inside_window() {
    init_tracing();
    let now = Utc::now();
    let content = "Recent bug fixes: the bug fixes for the parser and the bug fixes for login shipped.";

    let mut created: HashMap<String, DateTime<Utc>> = HashMap::new();
    let messages: Vec<StoredMessage> = (0..20)
        .map(|i| {
            let at = now - Duration::hours(12 + 36 * i);
            let id = format!("m{i:02}");
            created.insert(id.clone(), at);
            StoredMessage::user("c1", content).with_id(id).at(at)
        })
        .collect();

    let request = ContextRequest::new("recent bug fixes")
        .with_strategy(StrategyKind::Temporal)
        .with_time_window_ms(7 * 24 * 60 * 60 * 1000)
        .with_max_tokens(2000);
    let ctx = assembler(messages, vec![]).assemble_at(&request, now).await;

    assert!(!ctx.fallback);
    assert!(!ctx.included_items.is_empty());
    assert_eq!(ctx.strategy, StrategyKind::Temporal);

    let cutoff = now - Duration::days(7);
    for item in &ctx.included_items {
        assert!(created[&item.id] >= cutoff, "{} is outside the window", item.id);
    }

    // Identical content, so the order is the recency order.
    for pair in ctx.included_items.windows(2) {
        assert!(pair[0].relevance >= pair[1].relevance);
        assert!(created[&pair[0].id] > created[&pair[1].id]);
    }
    assert_eq!(ctx.included_items[0].id, "m00");
    assert_eq!(ctx.token_breakdown.sum(), 2000);
}

// ── Summaries score higher structurally ──────────────────────────────────

#[tokio::test]
async fn summary_structural_score_exceeds_message() {
    let now = Utc::now();
    let at = now - Duration::hours(6);
    let text = "The team agreed to move the billing service to the new cluster.";
    let summary = ContextSource::from(Summary::new("c1", text).at(at));
    let message = ContextSource::from(StoredMessage::user("c1", text).at(at));

    let config = RecallConfig::default();
    let scorer = RelevanceScorer::new(Arc::new(HashingEmbedder::default()), config.scorer.clone());
    let request = ContextRequest::new("billing cluster move").normalize(&config).unwrap();

    let s = scorer.score_breakdown(&summary, &request, now).await.unwrap();
    let m = scorer.score_breakdown(&message, &request, now).await.unwrap();
    assert!(s.structural - m.structural >= 0.2 - 1e-6);
    assert_eq!(s.semantic, m.semantic);
    assert_eq!(s.temporal, m.temporal);
    assert!(s.score > m.score);
}

// ── Optimizer truncation ─────────────────────────────────────────────────

#[test]
fn oversized_item_is_truncated_to_category_budget() {
    let config = RecallConfig::default();
    let counter = TokenCounter::for_model(&config.default_model);
    let sentence = "The deployment pipeline now validates every manifest before rollout. ";
    let mut content = String::new();
    while counter.count_text(&content) < 800 {
        content.push_str(sentence);
    }

    let item = ScoredItem::new(
        ContextSource::from(StoredMessage::assistant("c1", content.trim_end())),
        0.9,
    );
    let budget = TokenBudget {
        total: 300,
        query: 0,
        summaries: 0,
        messages: 300,
        metadata: 0,
        buffer: 0,
    };

    let result = TokenOptimizer::new(config.optimizer.clone(), counter).optimize(vec![item], &budget);
    assert_eq!(result.items.len(), 1);
    let out = &result.items[0];
    assert!(out.token_count <= 285);
    assert!(counter.count_text(&out.content) <= 285);
    assert!(!out.content.is_empty());
    assert!(out.content.ends_with('.') || out.content.ends_with("..."));
    assert_eq!(result.modifications.len(), 1);
    assert_eq!(result.modifications[0].action, ModificationAction::Truncated);
    assert!(result.usage.messages.used <= result.usage.messages.allocated);
}

// ── Repository failure ───────────────────────────────────────────────────

#[tokio::test]
async fn failing_repository_yields_fallback() {
    init_tracing();
    let store = Arc::new(UnavailableStore);
    let assembler = ContextAssembler::new(
        store.clone(),
        store,
        Arc::new(HashingEmbedder::default()),
        RecallConfig::default(),
    );

    let ctx = assembler
        .assemble_context(&ContextRequest::new("what did we decide about billing"))
        .await;

    assert!(ctx.fallback);
    assert!(ctx.included_items.is_empty());
    assert!(ctx.text.contains("what did we decide about billing"));
    let b = ctx.token_breakdown;
    assert!(b.query > 0);
    assert_eq!((b.summaries, b.messages, b.metadata, b.buffer), (0, 0, 0, 0));
    assert_eq!(ctx.total_tokens, b.query);
}

#[tokio::test]
async fn failing_summaries_alone_still_fall_back() {
    let assembler = ContextAssembler::new(
        Arc::new(InMemoryMessageStore::with_messages(vec![StoredMessage::user(
            "c1",
            "billing notes",
        )])),
        Arc::new(UnavailableStore),
        Arc::new(HashingEmbedder::default()),
        RecallConfig::default(),
    );
    let ctx = assembler.assemble_context(&ContextRequest::new("billing")).await;
    assert!(ctx.fallback);
}

// ── Hybrid delegates to entity-centric ───────────────────────────────────

#[tokio::test]
async fn hybrid_with_focus_entity_delegates_to_entity_centric() {
    init_tracing();
    let now = Utc::now();
    let messages = vec![
        StoredMessage::user("c1", "Roadmap chatter about the quarterly offsite and snacks.")
            .with_id("plain1")
            .at(now - Duration::hours(1)),
        StoredMessage::assistant("c1", "Acme Corp renewal is due next month; legal is reviewing.")
            .with_id("acme1")
            .at(now - Duration::hours(2)),
        StoredMessage::user("c2", "Call with acme corp procurement went well.")
            .with_id("acme2")
            .at(now - Duration::hours(3)),
        StoredMessage::user("c2", "Lunch order for the design review.")
            .with_id("plain2")
            .at(now - Duration::hours(4)),
    ];
    let request = ContextRequest::new("where do we stand with them")
        .with_focus_entities(["Acme Corp"])
        .with_min_relevance(0.1);

    // Weights alone show the delegation.
    let config = RecallConfig::default();
    let normalized = request.normalize(&config).unwrap();
    let budget = TokenBudget::allocate(normalized.max_tokens, 6, &config.budget);
    let sctx = SelectionContext::new(&normalized, &budget, now);
    let weights = HybridStrategy::default().weights(&[], &sctx);
    assert!(weights.entity > 0.7, "{weights:?}");
    assert_eq!(weights.dominant(), Some(StrategyKind::EntityCentric));

    let ctx = assembler(messages, vec![]).assemble_at(&request, now).await;
    assert!(!ctx.fallback);
    assert_eq!(ctx.strategy, StrategyKind::Hybrid);

    let ids: Vec<&str> = ctx.included_items.iter().map(|i| i.id.as_str()).collect();
    assert!(ids.len() >= 2, "{ids:?}");
    assert!(ids[..2].contains(&"acme1") && ids[..2].contains(&"acme2"), "{ids:?}");
}

// ── Cross-cutting properties ─────────────────────────────────────────────

#[tokio::test]
async fn every_strategy_produces_bounded_output() {
    let now = Utc::now();
    let topics = ["database migration", "release checklist", "Acme Corp contract", "hiring plan"];
    let messages: Vec<StoredMessage> = (0..40)
        .map(|i| {
            let topic = topics[i % topics.len()];
            StoredMessage::user(
                format!("c{}", i % 3),
                format!("Update {i} on the {topic}: progress is steady and the owners are assigned."),
            )
            .at(now - Duration::hours(i as i64 * 3))
        })
        .collect();
    let summaries = vec![
        Summary::new("c0", "Overview of the database migration and release checklist work.")
            .with_quality(0.9)
            .at(now - Duration::days(1)),
        Summary::new("c1", "Low quality summary that should be skipped.")
            .with_quality(0.1)
            .at(now - Duration::days(1)),
    ];
    let assembler = assembler(messages, summaries);

    for strategy in [
        StrategyKind::Temporal,
        StrategyKind::Topical,
        StrategyKind::EntityCentric,
        StrategyKind::Hybrid,
    ] {
        let request = ContextRequest::new("overview of the database migration")
            .with_strategy(strategy)
            .with_max_tokens(1500);
        let ctx = assembler.assemble_at(&request, now).await;

        assert!(!ctx.fallback, "{strategy}");
        assert!(ctx.text.starts_with("Query: overview of the database migration"));
        assert!(ctx.total_tokens <= 1500, "{strategy}: {}", ctx.total_tokens);
        assert_eq!(ctx.token_breakdown.sum(), 1500, "{strategy}");
        assert!(ctx.metrics.items_evaluated <= 42);
        assert_eq!(ctx.metrics.items_included, ctx.included_items.len());
        assert!(
            ctx.included_items
                .iter()
                .all(|i| i.relevance >= 0.3 && i.relevance <= 1.0),
            "{strategy}"
        );
        assert!(
            !ctx.text.contains("Low quality summary"),
            "{strategy} included a filtered summary"
        );
        let summaries = ctx
            .included_items
            .iter()
            .filter(|i| i.kind == ItemKind::Summary)
            .count();
        assert!(summaries <= 1);
    }
}

#[tokio::test]
async fn empty_repositories_render_query_only() {
    let assembler = ContextAssembler::new(
        Arc::new(NoopStore),
        Arc::new(NoopStore),
        Arc::new(HashingEmbedder::default()),
        RecallConfig::default(),
    );
    let ctx = assembler.assemble_context(&ContextRequest::new("anything at all")).await;
    assert!(!ctx.fallback);
    assert_eq!(ctx.text, "Query: anything at all");
    assert!(ctx.included_items.is_empty());
    assert_eq!(ctx.metrics.average_relevance, 0.0);
}

#[tokio::test]
async fn repeated_assembly_is_deterministic() {
    let now = Utc::now();
    let messages: Vec<StoredMessage> = (0..10)
        .map(|i| {
            StoredMessage::user("c1", format!("Note {i} about the search index rebuild."))
                .with_id(format!("n{i}"))
                .at(now - Duration::hours(i))
        })
        .collect();
    let assembler = assembler(messages, vec![]);
    let request = ContextRequest::new("search index rebuild");

    let first = assembler.assemble_at(&request, now).await;
    let second = assembler.assemble_at(&request, now).await;
    assert_eq!(first.text, second.text);
    assert_eq!(first.included_items, second.included_items);
    assert!(assembler.scorer().cache_len() >= 1);
}
