//! Adaptive blend of the other three strategies.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use crate::entities::EntityPatterns;
use crate::item::ScoredItem;
use crate::request::StrategyKind;

use super::common;
use super::entity::EntityCentricStrategy;
use super::temporal::TemporalStrategy;
use super::topical::{TopicalStrategy, extract_keywords};
use super::{SelectionContext, SelectionStrategy};

const BASE_WEIGHT: f32 = 0.1;
/// A normalized weight above this hands the whole selection to one strategy.
const DELEGATION_THRESHOLD: f32 = 0.7;
const MAX_ITEMS: usize = 20;
const NARROW_WINDOW_DAYS: f64 = 3.0;
const LONG_QUERY_WORDS: usize = 10;
const CONFIDENCE_NUDGE: f32 = 0.1;
const MERGE_DIVERSITY: f32 = 0.3;

static TEMPORAL_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:recent|recently|latest|lately|today|yesterday|tonight|this week|last week|last month|new|newest|current|ago|since|just now)\b")
        .expect("temporal keyword pattern compiles")
});

/// Normalized strategy weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyWeights {
    pub temporal: f32,
    pub topical: f32,
    pub entity: f32,
}

impl StrategyWeights {
    fn normalized(temporal: f32, topical: f32, entity: f32) -> Self {
        let sum = temporal + topical + entity;
        if sum <= f32::EPSILON {
            return Self {
                temporal: 1.0 / 3.0,
                topical: 1.0 / 3.0,
                entity: 1.0 / 3.0,
            };
        }
        Self {
            temporal: temporal / sum,
            topical: topical / sum,
            entity: entity / sum,
        }
    }

    /// Strategies in descending weight order. Ties keep temporal, topical,
    /// entity-centric order.
    pub fn ranked(&self) -> [(StrategyKind, f32); 3] {
        let mut ranked = [
            (StrategyKind::Temporal, self.temporal),
            (StrategyKind::Topical, self.topical),
            (StrategyKind::EntityCentric, self.entity),
        ];
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    /// The strategy to delegate to, if one dominates.
    pub fn dominant(&self) -> Option<StrategyKind> {
        self.ranked()
            .into_iter()
            .find(|(_, weight)| *weight > DELEGATION_THRESHOLD)
            .map(|(kind, _)| kind)
    }
}

/// Picks weights from the query and candidates, then either delegates or
/// merges the three strategies' picks.
#[derive(Debug, Clone)]
pub struct HybridStrategy {
    temporal: TemporalStrategy,
    topical: TopicalStrategy,
    entity: EntityCentricStrategy,
}

impl HybridStrategy {
    pub fn new(half_life_days: f64, patterns: Arc<EntityPatterns>) -> Self {
        Self {
            temporal: TemporalStrategy::new(half_life_days),
            topical: TopicalStrategy::new(),
            entity: EntityCentricStrategy::new(patterns),
        }
    }

    pub fn weights(&self, items: &[ScoredItem], ctx: &SelectionContext<'_>) -> StrategyWeights {
        let request = ctx.request;

        let mut temporal = BASE_WEIGHT;
        if TEMPORAL_KEYWORDS.is_match(&request.query) {
            temporal += 0.5;
        }
        if request.include_recent {
            temporal += 0.3;
        }
        if request.time_window_days() < NARROW_WINDOW_DAYS {
            temporal += 0.2;
        }
        if !items.is_empty() {
            let fresh = items
                .iter()
                .filter(|item| common::recency_boost(item, ctx.now) >= 1.0)
                .count();
            temporal += 0.1 * fresh as f32 / items.len() as f32;
        }

        let mut topical = BASE_WEIGHT;
        if common::is_broad_query(&request.query) {
            topical += 0.5;
        }
        topical += 0.1 * topic_diversity(items);
        if request.query.split_whitespace().count() > LONG_QUERY_WORDS {
            topical += 0.1;
        }

        let mut entity = BASE_WEIGHT;
        if !request.focus_entities.is_empty() {
            entity += 1.0 + 0.1 * request.focus_entities.len().min(3) as f32;
        }
        entity += 0.4 * capitalized_density(&request.query);

        StrategyWeights::normalized(temporal, topical, entity)
    }

    fn strategy(&self, kind: StrategyKind) -> &dyn SelectionStrategy {
        match kind {
            StrategyKind::Temporal => &self.temporal,
            StrategyKind::Topical => &self.topical,
            StrategyKind::EntityCentric | StrategyKind::Hybrid => &self.entity,
        }
    }
}

impl Default for HybridStrategy {
    fn default() -> Self {
        Self::new(7.0, EntityPatterns::shared())
    }
}

impl SelectionStrategy for HybridStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Hybrid
    }

    fn select(&self, items: &[ScoredItem], ctx: &SelectionContext<'_>) -> Vec<ScoredItem> {
        let weights = self.weights(items, ctx);

        if let Some(kind) = weights.dominant() {
            tracing::debug!(strategy = %kind, ?weights, "Hybrid delegating");
            return self.strategy(kind).select(items, ctx);
        }

        let max_items = common::item_cap(MAX_ITEMS, ctx.budget);
        let mut order: Vec<String> = Vec::new();
        let mut merged: HashMap<String, ScoredItem> = HashMap::new();

        for (kind, weight) in weights.ranked() {
            let budget = ctx.budget.scaled(weight);
            let sub_ctx = SelectionContext::new(ctx.request, &budget, ctx.now);
            let take = ((max_items as f32 * weight).floor() as usize).max(1);

            let picks = self.strategy(kind).select(items, &sub_ctx);
            for item in picks.into_iter().take(take) {
                if merged.contains_key(&item.id) {
                    continue;
                }
                let nudged = item.relevance + weight * CONFIDENCE_NUDGE;
                order.push(item.id.clone());
                merged.insert(item.id.clone(), item.with_relevance(nudged));
            }
        }

        let mut combined: Vec<ScoredItem> = order
            .into_iter()
            .filter_map(|id| merged.remove(&id))
            .collect();
        if combined.len() > max_items {
            combined = common::select_diverse(&combined, max_items, MERGE_DIVERSITY);
        }
        common::sort_by_relevance(&mut combined);

        tracing::debug!(?weights, selected = combined.len(), "Hybrid merge complete");
        combined
    }
}

/// Share of distinct leading keywords among the items, in [0, 1].
fn topic_diversity(items: &[ScoredItem]) -> f32 {
    if items.is_empty() {
        return 0.0;
    }
    let topics: HashSet<String> = items
        .iter()
        .filter_map(|item| extract_keywords(&item.content).into_iter().next())
        .collect();
    topics.len() as f32 / items.len() as f32
}

/// Capitalized words after the first, as a share of all words.
fn capitalized_density(query: &str) -> f32 {
    let words: Vec<&str> = query.split_whitespace().collect();
    if words.len() < 2 {
        return 0.0;
    }
    let capitalized = words[1..]
        .iter()
        .filter(|w| w.chars().next().is_some_and(char::is_uppercase))
        .count();
    capitalized as f32 / words.len() as f32
}
