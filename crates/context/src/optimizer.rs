//! Fits selected items into the token budget.
//!
//! Summaries and messages are budgeted independently. Within a category
//! items are visited most-relevant first and are kept, truncated, or
//! dropped. Every decision is logged as a [`Modification`].

use rustedrecall_config::{OptimizerConfig, TruncationStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::budget::TokenBudget;
use crate::item::{ItemKind, ScoredItem};
use crate::token::TokenCounter;

const ELLIPSIS: &str = "...";
const GAP_MARKER: &str = "\n[...]\n";
const SENTENCE_BOUNDARY_RATIO: f64 = 0.7;
const WORD_BOUNDARY_RATIO: f64 = 0.8;
const MIDDLE_HEAD_SHARE: f64 = 0.6;

const IMPORTANCE_MARKERS: &[&str] = &[
    "important", "key", "critical", "must", "decision", "decided", "conclusion", "summary",
    "result", "because", "therefore", "error", "fix", "fixed", "action", "note", "todo",
];

/// What happened to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModificationAction {
    Included,
    Truncated,
    Excluded,
}

/// One optimizer decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    pub item_id: String,
    pub kind: ItemKind,
    pub action: ModificationAction,
    pub original_tokens: usize,
    pub final_tokens: usize,
    pub reason: String,
}

/// Budget against use for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryUsage {
    /// Category budget after the safety margin
    pub allocated: usize,
    pub used: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub summaries: CategoryUsage,
    pub messages: CategoryUsage,
}

impl TokenUsage {
    pub fn used(&self) -> usize {
        self.summaries.used + self.messages.used
    }

    pub fn allocated(&self) -> usize {
        self.summaries.allocated + self.messages.allocated
    }
}

/// Items that survived, in their incoming order, plus the decision log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub items: Vec<ScoredItem>,
    pub usage: TokenUsage,
    pub modifications: Vec<Modification>,
}

pub struct TokenOptimizer {
    config: OptimizerConfig,
    counter: TokenCounter,
}

impl TokenOptimizer {
    pub fn new(config: OptimizerConfig, counter: TokenCounter) -> Self {
        Self { config, counter }
    }

    pub fn optimize(&self, items: Vec<ScoredItem>, budget: &TokenBudget) -> OptimizationResult {
        let mut finals: HashMap<usize, ScoredItem> = HashMap::new();
        let mut modifications = Vec::with_capacity(items.len());
        let mut usage = TokenUsage::default();

        for (kind, category_budget) in [
            (ItemKind::Summary, budget.summaries),
            (ItemKind::Message, budget.messages),
        ] {
            let allocated = self.with_margin(category_budget);
            let mut order: Vec<usize> = (0..items.len()).filter(|&i| items[i].kind == kind).collect();
            order.sort_by(|&a, &b| items[b].relevance.total_cmp(&items[a].relevance));

            let mut remaining = allocated;
            for index in order {
                let (outcome, modification) = self.fit_item(&items[index], remaining);
                remaining -= modification.final_tokens;
                if let Some(item) = outcome {
                    finals.insert(index, item);
                }
                modifications.push(modification);
            }

            let category = CategoryUsage {
                allocated,
                used: allocated - remaining,
            };
            match kind {
                ItemKind::Summary => usage.summaries = category,
                ItemKind::Message => usage.messages = category,
            }
        }

        let items: Vec<ScoredItem> = (0..items.len()).filter_map(|i| finals.remove(&i)).collect();

        tracing::debug!(
            kept = items.len(),
            used = usage.used(),
            allocated = usage.allocated(),
            "Token optimization complete"
        );

        OptimizationResult {
            items,
            usage,
            modifications,
        }
    }

    /// Decide one item against the remaining category budget. The returned
    /// modification's `final_tokens` is what the item consumes (0 if dropped).
    fn fit_item(&self, item: &ScoredItem, remaining: usize) -> (Option<ScoredItem>, Modification) {
        let floor = self.config.min_tokens_per_item;
        let tokens = self.counter.count_text(&item.content);
        let record = |action, final_tokens, reason: String| Modification {
            item_id: item.id.clone(),
            kind: item.kind,
            action,
            original_tokens: tokens,
            final_tokens,
            reason,
        };

        if tokens < floor {
            let reason = format!("{tokens} tokens is below the {floor}-token minimum");
            return (None, record(ModificationAction::Excluded, 0, reason));
        }
        if remaining < floor {
            let reason = format!("only {remaining} tokens left in category");
            return (None, record(ModificationAction::Excluded, 0, reason));
        }
        if tokens <= remaining {
            let kept = item.clone().with_token_count(tokens);
            let reason = "fits within remaining budget".to_string();
            return (Some(kept), record(ModificationAction::Included, tokens, reason));
        }

        let target = remaining.min(self.config.max_tokens_per_item);
        if target < floor {
            let reason = format!("truncation target {target} is below the {floor}-token minimum");
            return (None, record(ModificationAction::Excluded, 0, reason));
        }

        let content = self.truncate(&item.content, target);
        let final_tokens = self.counter.count_text(&content);
        let kept = item.clone().with_content(content, final_tokens);
        let reason = format!(
            "truncated ({}) from {tokens} to {final_tokens} tokens",
            strategy_name(self.config.truncation)
        );
        (Some(kept), record(ModificationAction::Truncated, final_tokens, reason))
    }

    fn with_margin(&self, tokens: usize) -> usize {
        let margin = self.config.safety_margin.clamp(0.0, 1.0);
        // Epsilon keeps float noise (e.g. 300 * 0.95) from losing a token.
        (tokens as f64 * (1.0 - margin) + 1e-9).floor() as usize
    }

    /// Shorten `text` to at most `target_tokens` with the configured
    /// strategy. Non-empty whenever `text` is non-empty and the target is
    /// at least one token.
    pub fn truncate(&self, text: &str, target_tokens: usize) -> String {
        if target_tokens == 0 || text.is_empty() {
            return String::new();
        }
        if self.counter.count_text(text) <= target_tokens {
            return text.to_string();
        }
        let max_chars = self.counter.chars_for_tokens(target_tokens).max(1);

        let shortened = match self.config.truncation {
            TruncationStrategy::End => truncate_end(text, max_chars),
            TruncationStrategy::Middle => truncate_middle(text, max_chars),
            TruncationStrategy::Smart => truncate_smart(text, max_chars),
        };

        let shortened = if self.counter.count_text(&shortened) > target_tokens {
            char_prefix(text, max_chars).to_string()
        } else {
            shortened
        };
        if shortened.trim().is_empty() {
            char_prefix(text, max_chars).to_string()
        } else {
            shortened
        }
    }
}

fn strategy_name(strategy: TruncationStrategy) -> &'static str {
    match strategy {
        TruncationStrategy::End => "end",
        TruncationStrategy::Middle => "middle",
        TruncationStrategy::Smart => "smart",
    }
}

// --- Truncation strategies ---

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// The first `n` characters.
fn char_prefix(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

/// The last `n` characters.
fn char_suffix(text: &str, n: usize) -> &str {
    let len = char_len(text);
    if n >= len {
        return text;
    }
    match text.char_indices().nth(len - n) {
        Some((byte, _)) => &text[byte..],
        None => "",
    }
}

/// Cut at a sentence end past 70% of the space, else a word boundary past
/// 80%, else hard; an ellipsis marks any cut that is not a sentence end.
pub fn truncate_end(text: &str, max_chars: usize) -> String {
    if char_len(text) <= max_chars {
        return text.to_string();
    }
    let room = max_chars.saturating_sub(ELLIPSIS.len());
    if room == 0 {
        return char_prefix(text, max_chars).to_string();
    }
    let prefix = char_prefix(text, room);
    // Also accept a sentence that ends exactly where the cut falls.
    let full_sentence = char_prefix(text, room + 1);

    let sentence_end = full_sentence
        .char_indices()
        .filter(|(i, c)| {
            matches!(c, '.' | '!' | '?')
                && full_sentence[i + c.len_utf8()..]
                    .chars()
                    .next()
                    .is_none_or(char::is_whitespace)
        })
        .map(|(i, c)| i + c.len_utf8())
        .filter(|&end| end <= prefix.len())
        .last();
    if let Some(end) = sentence_end {
        if char_len(&prefix[..end]) as f64 >= room as f64 * SENTENCE_BOUNDARY_RATIO {
            return prefix[..end].to_string();
        }
    }

    if let Some(space) = prefix.rfind(char::is_whitespace) {
        if char_len(&prefix[..space]) as f64 >= room as f64 * WORD_BOUNDARY_RATIO {
            return format!("{}{ELLIPSIS}", prefix[..space].trim_end());
        }
    }

    format!("{}{ELLIPSIS}", prefix.trim_end())
}

/// Keep roughly 60% of the space from the start and 40% from the end.
pub fn truncate_middle(text: &str, max_chars: usize) -> String {
    if char_len(text) <= max_chars {
        return text.to_string();
    }
    let room = max_chars.saturating_sub(char_len(GAP_MARKER));
    if room < 10 {
        return truncate_end(text, max_chars);
    }
    let head_chars = (room as f64 * MIDDLE_HEAD_SHARE).floor() as usize;
    let tail_chars = room - head_chars;
    let head = char_prefix(text, head_chars).trim_end();
    let tail = char_suffix(text, tail_chars).trim_start();
    format!("{head}{GAP_MARKER}{tail}")
}

/// Keep the highest-scoring sentences that fit, in their original order.
/// Falls back to [`truncate_end`] for single-sentence text or when nothing
/// fits.
pub fn truncate_smart(text: &str, max_chars: usize) -> String {
    if char_len(text) <= max_chars {
        return text.to_string();
    }
    let sentences = split_sentences(text);
    if sentences.len() <= 1 {
        return truncate_end(text, max_chars);
    }

    let last = sentences.len() - 1;
    let mut ranked: Vec<(usize, f32)> = sentences
        .iter()
        .enumerate()
        .map(|(i, s)| (i, sentence_score(s, i == 0, i == last)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut keep = vec![false; sentences.len()];
    let mut used = 0usize;
    for (index, _) in ranked {
        let len = char_len(sentences[index]);
        let joiner = usize::from(used > 0);
        if used + joiner + len <= max_chars {
            keep[index] = true;
            used += joiner + len;
        }
    }

    let kept: Vec<&str> = sentences
        .iter()
        .zip(&keep)
        .filter(|(_, k)| **k)
        .map(|(s, _)| *s)
        .collect();
    if kept.is_empty() {
        return truncate_end(text, max_chars);
    }
    kept.join(" ")
}

/// Sentences ending in `.`, `!` or `?` followed by whitespace, or at line
/// breaks. Trimmed, empties dropped.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let next_is_space = chars.peek().is_none_or(|(_, n)| n.is_whitespace());
        let boundary = c == '\n' || (matches!(c, '.' | '!' | '?') && next_is_space);
        if boundary {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn sentence_score(sentence: &str, is_first: bool, is_last: bool) -> f32 {
    let mut score = 1.0;
    if is_first {
        score += 0.5;
    }
    if is_last {
        score += 0.3;
    }
    let len = char_len(sentence);
    if len > 100 {
        score += 0.2;
    } else if len < 20 {
        score -= 0.3;
    }
    let lowered = sentence.to_lowercase();
    if IMPORTANCE_MARKERS.iter().any(|m| {
        lowered
            .split(|c: char| !c.is_alphanumeric())
            .any(|w| w == *m)
    }) {
        score += 0.4;
    }
    if sentence.chars().any(|c| c.is_ascii_digit()) {
        score += 0.2;
    }
    if sentence.contains('"') {
        score += 0.1;
    }
    score
}
