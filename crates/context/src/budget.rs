//! Per-request token budget.

use rustedrecall_config::BudgetConfig;
use serde::{Deserialize, Serialize};

/// Integer token allocation for one assembly call.
///
/// The five categories always sum to `total` exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    pub total: usize,
    pub query: usize,
    pub summaries: usize,
    pub messages: usize,
    pub metadata: usize,
    pub buffer: usize,
}

impl TokenBudget {
    /// Split `total` by the configured ratios.
    ///
    /// Each category gets `ceil(total * ratio)`, capped by what is left. The
    /// query share is raised to the actual query size, and the buffer takes
    /// whatever remains.
    pub fn allocate(total: usize, query_tokens: usize, ratios: &BudgetConfig) -> Self {
        // Epsilon keeps float noise (e.g. 4000 * 0.3) from adding a token.
        let share = |ratio: f64| ((total as f64 * ratio.max(0.0)) - 1e-9).ceil().max(0.0) as usize;

        let query = share(ratios.query_ratio).max(query_tokens).min(total);
        let mut remaining = total - query;

        let mut take = |wanted: usize| {
            let granted = wanted.min(remaining);
            remaining -= granted;
            granted
        };
        let summaries = take(share(ratios.summary_ratio));
        let messages = take(share(ratios.message_ratio));
        let metadata = take(share(ratios.metadata_ratio));

        Self {
            total,
            query,
            summaries,
            messages,
            metadata,
            buffer: remaining,
        }
    }

    /// A proportional copy for one strategy of a blend. The query share is
    /// held constant and `total` is recomputed so the categories still sum.
    pub fn scaled(&self, weight: f32) -> Self {
        let weight = f64::from(weight.clamp(0.0, 1.0));
        let scale = |n: usize| (n as f64 * weight).floor() as usize;

        let summaries = scale(self.summaries);
        let messages = scale(self.messages);
        let metadata = scale(self.metadata);
        let buffer = scale(self.buffer);
        Self {
            total: self.query + summaries + messages + metadata + buffer,
            query: self.query,
            summaries,
            messages,
            metadata,
            buffer,
        }
    }

    /// Sum of all categories.
    pub fn allocated(&self) -> usize {
        self.query + self.summaries + self.messages + self.metadata + self.buffer
    }

    /// Tokens available to content (summaries plus messages).
    pub fn content(&self) -> usize {
        self.summaries + self.messages
    }
}
