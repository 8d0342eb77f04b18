//! Selection strategies.
//!
//! A strategy takes scored candidates and returns an ordered subset. All
//! four share the toolkit in [`common`]; [`Strategy`] dispatches by
//! [`StrategyKind`].

pub mod common;
pub mod entity;
pub mod hybrid;
pub mod temporal;
pub mod topical;

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::budget::TokenBudget;
use crate::entities::EntityPatterns;
use crate::item::ScoredItem;
use crate::request::{NormalizedRequest, StrategyKind};

pub use common::StrategyParams;
pub use entity::EntityCentricStrategy;
pub use hybrid::{HybridStrategy, StrategyWeights};
pub use temporal::TemporalStrategy;
pub use topical::{Cluster, TopicalStrategy};

/// Everything a strategy may look at besides the items themselves.
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    pub request: &'a NormalizedRequest,
    pub budget: &'a TokenBudget,
    /// Evaluation instant for all age computations
    pub now: DateTime<Utc>,
}

impl<'a> SelectionContext<'a> {
    pub fn new(request: &'a NormalizedRequest, budget: &'a TokenBudget, now: DateTime<Utc>) -> Self {
        Self {
            request,
            budget,
            now,
        }
    }

    /// The stricter of a strategy's own floor and the request's threshold.
    pub fn effective_min(&self, strategy_min: f32) -> f32 {
        strategy_min.max(self.request.min_relevance)
    }
}

/// Chooses and orders items for one request.
pub trait SelectionStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Every returned item has relevance at or above the strategy's
    /// effective minimum.
    fn select(&self, items: &[ScoredItem], ctx: &SelectionContext<'_>) -> Vec<ScoredItem>;
}

/// Enum dispatch over the built-in strategies.
#[derive(Debug, Clone)]
pub enum Strategy {
    Temporal(TemporalStrategy),
    Topical(TopicalStrategy),
    EntityCentric(EntityCentricStrategy),
    Hybrid(HybridStrategy),
}

impl Strategy {
    pub fn for_kind(kind: StrategyKind, half_life_days: f64, patterns: Arc<EntityPatterns>) -> Self {
        match kind {
            StrategyKind::Temporal => Strategy::Temporal(TemporalStrategy::new(half_life_days)),
            StrategyKind::Topical => Strategy::Topical(TopicalStrategy::new()),
            StrategyKind::EntityCentric => {
                Strategy::EntityCentric(EntityCentricStrategy::new(patterns))
            }
            StrategyKind::Hybrid => Strategy::Hybrid(HybridStrategy::new(half_life_days, patterns)),
        }
    }
}

impl SelectionStrategy for Strategy {
    fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Temporal(s) => s.kind(),
            Strategy::Topical(s) => s.kind(),
            Strategy::EntityCentric(s) => s.kind(),
            Strategy::Hybrid(s) => s.kind(),
        }
    }

    fn select(&self, items: &[ScoredItem], ctx: &SelectionContext<'_>) -> Vec<ScoredItem> {
        match self {
            Strategy::Temporal(s) => s.select(items, ctx),
            Strategy::Topical(s) => s.select(items, ctx),
            Strategy::EntityCentric(s) => s.select(items, ctx),
            Strategy::Hybrid(s) => s.select(items, ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::common::fixtures::*;
    use super::*;
    use crate::request::ContextRequest;
    use rustedrecall_config::RecallConfig;

    #[test]
    fn dispatch_matches_kind() {
        for kind in [
            StrategyKind::Temporal,
            StrategyKind::Topical,
            StrategyKind::EntityCentric,
            StrategyKind::Hybrid,
        ] {
            let strategy = Strategy::for_kind(kind, 7.0, EntityPatterns::shared());
            assert_eq!(strategy.kind(), kind);
        }
    }

    #[test]
    fn every_strategy_respects_minimum_relevance() {
        let config = RecallConfig::default();
        let items: Vec<ScoredItem> = (0..12)
            .map(|i| {
                message(
                    &format!("m{i}"),
                    if i % 2 == 0 { "c1" } else { "c2" },
                    &format!("Acme Corp update number {i} about deployment pipeline"),
                    i as f32 / 11.0,
                )
            })
            .collect();

        for kind in [
            StrategyKind::Temporal,
            StrategyKind::Topical,
            StrategyKind::EntityCentric,
            StrategyKind::Hybrid,
        ] {
            let request = ContextRequest::new("deployment overview")
                .with_strategy(kind)
                .with_min_relevance(0.4)
                .normalize(&config)
                .unwrap();
            let budget = TokenBudget::allocate(request.max_tokens, 5, &config.budget);
            let ctx = SelectionContext::new(&request, &budget, Utc::now());
            let out = Strategy::for_kind(kind, 7.0, EntityPatterns::shared()).select(&items, &ctx);
            assert!(!out.is_empty(), "{kind}");
            assert!(out.iter().all(|i| i.relevance >= 0.4), "{kind}");
            assert!(out.iter().all(|i| (0.0..=1.0).contains(&i.relevance)), "{kind}");
        }
    }
}
