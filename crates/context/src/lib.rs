//! Context assembly and relevance ranking — the heart of RustedRecall.
//!
//! Given a query and a token budget, the pipeline pulls prior messages and
//! summaries, ranks them, and packs the best of them into one text blob:
//!
//! 1. **Count** tokens with a per-model profile ([`token`])
//! 2. **Score** candidates on semantic, temporal, entity and structural
//!    signals ([`scorer`])
//! 3. **Select** with a temporal, topical, entity-centric or hybrid
//!    strategy ([`strategy`])
//! 4. **Fit** the selection into the budget, truncating where needed
//!    ([`optimizer`])
//! 5. **Render** the result ([`assembler`])
//!
//! [`ContextAssembler::assemble_context`] is the entry point and never
//! fails: errors degrade to a query-only fallback.

pub mod assembler;
pub mod budget;
pub mod entities;
pub mod error;
pub mod item;
pub mod optimizer;
pub mod request;
pub mod scorer;
pub mod strategy;
pub mod token;

pub use assembler::{
    AssembledContext, AssemblyMetrics, ContextAssembler, IncludedItem, TokenBreakdown,
};
pub use budget::TokenBudget;
pub use entities::{EntityKind, EntityPatterns, TypedEntity};
pub use error::{ContextError, Result};
pub use item::{ContextSource, ItemKind, ScoredItem};
pub use optimizer::{
    Modification, ModificationAction, OptimizationResult, TokenOptimizer, TokenUsage,
};
pub use request::{ContextRequest, NormalizedRequest, StrategyKind};
pub use scorer::{RelevanceScorer, ScoreBreakdown};
pub use strategy::{SelectionContext, SelectionStrategy, Strategy};
pub use token::{ModelProfile, TokenCounter};
