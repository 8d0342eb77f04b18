//! Entity-focused selection.

use std::collections::HashSet;
use std::sync::Arc;

use crate::entities::{EntityPatterns, TypedEntity};
use crate::item::ScoredItem;
use crate::request::StrategyKind;

use super::common::{self, StrategyParams};
use super::{SelectionContext, SelectionStrategy};

const ORIGINAL_SHARE: f32 = 0.6;
const ENTITY_SHARE: f32 = 0.4;
const EXACT_MATCH_WEIGHT: f32 = 0.3;
const PARTIAL_MATCH_WEIGHT: f32 = 0.7;
const PER_ENTITY_GROUP: usize = 3;
const ITEM_CEILING: usize = 25;

/// Re-ranks items by how well they mention the query's entities and lays
/// them out entity by entity.
#[derive(Clone)]
pub struct EntityCentricStrategy {
    params: StrategyParams,
    patterns: Arc<EntityPatterns>,
}

impl std::fmt::Debug for EntityCentricStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCentricStrategy")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl EntityCentricStrategy {
    pub fn new(patterns: Arc<EntityPatterns>) -> Self {
        Self {
            params: StrategyParams {
                min_relevance: 0.25,
                diversity_weight: 0.3,
                summary_ratio: 0.4,
                max_items: 18,
            },
            patterns,
        }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    /// Typed entities from the query plus the explicit focus entities.
    pub fn target_entities(&self, ctx: &SelectionContext<'_>) -> Vec<TypedEntity> {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for entity in &ctx.request.focus_entities {
            if seen.insert(entity.to_lowercase()) {
                targets.push(TypedEntity::new(entity.clone(), self.patterns.classify(entity)));
            }
        }
        for entity in self.patterns.extract_typed(&ctx.request.query) {
            if seen.insert(entity.key()) {
                targets.push(entity);
            }
        }
        targets
    }

    fn max_items(&self, ctx: &SelectionContext<'_>, detected: usize) -> usize {
        let focus = ctx.request.focus_entities.len();
        let max = (self.params.max_items + focus * 2 + detected).min(ITEM_CEILING);
        common::item_cap(max, ctx.budget)
    }
}

impl Default for EntityCentricStrategy {
    fn default() -> Self {
        Self::new(EntityPatterns::shared())
    }
}

impl SelectionStrategy for EntityCentricStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::EntityCentric
    }

    fn select(&self, items: &[ScoredItem], ctx: &SelectionContext<'_>) -> Vec<ScoredItem> {
        let min_relevance = ctx.effective_min(self.params.min_relevance);
        let candidates = common::filter_by_relevance(items, min_relevance);
        if candidates.is_empty() {
            return Vec::new();
        }

        let targets = self.target_entities(ctx);
        let detected = targets.len().saturating_sub(ctx.request.focus_entities.len());
        let max_items = self.max_items(ctx, detected);

        if targets.is_empty() {
            tracing::debug!("No target entities; falling back to relevance ranking");
            let mut ranked = candidates;
            common::sort_by_relevance(&mut ranked);
            return common::select_diverse(&ranked, max_items, self.params.diversity_weight);
        }

        let keys: Vec<String> = targets.iter().map(TypedEntity::key).collect();
        let blended: Vec<ScoredItem> = candidates
            .into_iter()
            .map(|item| {
                let entity = entity_match_score(&item.content, &keys);
                let relevance = ORIGINAL_SHARE * item.relevance + ENTITY_SHARE * entity;
                item.with_entity_score(entity).with_relevance(relevance)
            })
            .collect();
        let mut ranked = common::filter_by_relevance(&blended, min_relevance);
        common::sort_by_relevance(&mut ranked);

        let mut groups: Vec<Vec<&ScoredItem>> = keys
            .iter()
            .map(|key| {
                ranked
                    .iter()
                    .filter(|item| item.content.to_lowercase().contains(key.as_str()))
                    .collect()
            })
            .collect();
        groups.sort_by(|a, b| b.len().cmp(&a.len()));

        let mut taken: HashSet<&str> = HashSet::new();
        let mut selected: Vec<ScoredItem> = Vec::new();
        for group in &groups {
            let picks: Vec<&ScoredItem> = group
                .iter()
                .copied()
                .filter(|item| !taken.contains(item.id.as_str()))
                .take(PER_ENTITY_GROUP)
                .collect();
            for item in picks {
                if selected.len() >= max_items {
                    break;
                }
                taken.insert(item.id.as_str());
                selected.push(item.clone());
            }
        }

        let room = max_items.saturating_sub(selected.len());
        if room > 0 {
            let leftovers: Vec<ScoredItem> = ranked
                .iter()
                .filter(|item| !taken.contains(item.id.as_str()))
                .cloned()
                .collect();
            // Leftovers get the same diversity and type balancing as every other fill.
            let mut fill = common::select_balanced(&leftovers, room, &self.params);
            common::sort_by_relevance(&mut fill);
            selected.extend(fill);
        }

        tracing::debug!(
            targets = targets.len(),
            selected = selected.len(),
            max_items,
            "Entity-centric selection complete"
        );
        selected
    }
}

/// Mean per-entity match score. A literal mention scores
/// `min(1, count * 0.3)`; otherwise multi-word entities score
/// `0.7 * fraction of their words present`.
pub fn entity_match_score(content: &str, entity_keys: &[String]) -> f32 {
    if entity_keys.is_empty() {
        return 0.0;
    }
    let lowered = content.to_lowercase();
    let words: HashSet<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let total: f32 = entity_keys
        .iter()
        .map(|key| {
            let exact = lowered.matches(key.as_str()).count();
            if exact > 0 {
                return (exact as f32 * EXACT_MATCH_WEIGHT).min(1.0);
            }
            let parts: Vec<&str> = key.split_whitespace().collect();
            if parts.len() < 2 {
                return 0.0;
            }
            let present = parts.iter().filter(|p| words.contains(*p)).count();
            present as f32 / parts.len() as f32 * PARTIAL_MATCH_WEIGHT
        })
        .sum();
    total / entity_keys.len() as f32
}
