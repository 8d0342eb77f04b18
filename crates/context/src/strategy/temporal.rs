//! Recency-first selection.

use crate::item::{ItemKind, ScoredItem};
use crate::request::StrategyKind;
use crate::scorer::temporal_decay;

use super::common::{self, StrategyParams};
use super::{SelectionContext, SelectionStrategy};

const RELEVANCE_SHARE: f32 = 0.7;
const TEMPORAL_SHARE: f32 = 0.3;
const WIDE_WINDOW_DAYS: f64 = 7.0;
const EXTRA_ITEMS: usize = 10;
/// Groups larger than this are interleaved rather than listed newest-first.
const INTERLEAVE_THRESHOLD: usize = 3;

/// Ranks by a blend of relevance and recency, then lays items out per
/// conversation.
#[derive(Debug, Clone)]
pub struct TemporalStrategy {
    params: StrategyParams,
    half_life_days: f64,
}

impl TemporalStrategy {
    pub fn new(half_life_days: f64) -> Self {
        Self {
            params: StrategyParams {
                min_relevance: 0.2,
                diversity_weight: 0.2,
                summary_ratio: 0.3,
                max_items: 15,
            },
            half_life_days,
        }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    fn max_items(&self, ctx: &SelectionContext<'_>) -> usize {
        let request = ctx.request;
        let widened = request.time_window_days() > WIDE_WINDOW_DAYS
            || request.conversation_id.is_some()
            || request.include_recent;
        let max = if widened {
            self.params.max_items + EXTRA_ITEMS
        } else {
            self.params.max_items
        };
        common::item_cap(max, ctx.budget)
    }
}

impl Default for TemporalStrategy {
    fn default() -> Self {
        Self::new(7.0)
    }
}

impl SelectionStrategy for TemporalStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Temporal
    }

    fn select(&self, items: &[ScoredItem], ctx: &SelectionContext<'_>) -> Vec<ScoredItem> {
        let min_relevance = ctx.effective_min(self.params.min_relevance);
        let candidates = common::filter_by_relevance(items, min_relevance);
        if candidates.is_empty() {
            return Vec::new();
        }

        let blended: Vec<ScoredItem> = candidates
            .into_iter()
            .map(|item| {
                let temporal = temporal_decay(item.created_at, ctx.now, self.half_life_days);
                let relevance = RELEVANCE_SHARE * item.relevance + TEMPORAL_SHARE * temporal;
                item.with_temporal_score(temporal).with_relevance(relevance)
            })
            .collect();
        let mut blended = common::filter_by_relevance(&blended, min_relevance);
        common::sort_by_relevance(&mut blended);

        let max_items = self.max_items(ctx);
        let selected = common::select_balanced(&blended, max_items, &self.params);

        let mut ordered: Vec<ScoredItem> = common::group_by_conversation(&selected)
            .into_iter()
            .flat_map(|(_, group)| interleave(group))
            .collect();
        common::sort_by_relevance(&mut ordered);

        tracing::debug!(
            candidates = items.len(),
            selected = ordered.len(),
            max_items,
            "Temporal selection complete"
        );
        ordered
    }
}

/// Newest-first layout of one conversation. Larger groups lead with their
/// newest summary and three newest messages.
fn interleave(mut group: Vec<ScoredItem>) -> Vec<ScoredItem> {
    group.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    if group.len() <= INTERLEAVE_THRESHOLD {
        return group;
    }

    let (summaries, messages): (Vec<_>, Vec<_>) =
        group.into_iter().partition(|item| item.kind == ItemKind::Summary);
    let mut summaries = summaries.into_iter();
    let mut messages = messages.into_iter();

    let mut out = Vec::new();
    out.extend(summaries.next());
    out.extend(messages.by_ref().take(INTERLEAVE_THRESHOLD));
    out.extend(summaries);
    out.extend(messages);
    out
}
