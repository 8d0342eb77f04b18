//! Shared selection toolkit used by every strategy.

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::budget::TokenBudget;
use crate::item::{ItemKind, ScoredItem};

/// Smallest useful item, in tokens. Caps item counts on small budgets.
const MIN_TOKENS_PER_SLOT: usize = 20;

const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "he",
    "her", "his", "how", "i", "if", "in", "into", "is", "it", "its", "just", "me", "my", "no",
    "not", "of", "on", "or", "our", "she", "so", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "to", "up", "us", "was", "we", "were", "what", "when",
    "where", "which", "who", "will", "with", "would", "you", "your",
];

static BROAD_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:overview|summary|summarize|summarise|everything|general|topics|themes|broad|research|explore|compare|landscape|discussed|across)\b")
        .expect("broad query pattern compiles")
});

/// Tunables shared by the concrete strategies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyParams {
    pub min_relevance: f32,
    /// Weight of diversity against relevance during greedy selection
    pub diversity_weight: f32,
    /// Target share of summaries among selected items
    pub summary_ratio: f32,
    pub max_items: usize,
}

/// Keep items at or above `min_relevance`.
pub fn filter_by_relevance(items: &[ScoredItem], min_relevance: f32) -> Vec<ScoredItem> {
    items
        .iter()
        .filter(|item| item.relevance >= min_relevance)
        .cloned()
        .collect()
}

/// Stable sort, highest relevance first.
pub fn sort_by_relevance(items: &mut [ScoredItem]) {
    items.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
}

/// Lower-cased, punctuation-stripped words with stop words removed.
pub fn content_words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// Jaccard similarity of two sets.
pub fn jaccard<T: Eq + std::hash::Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

/// Word-overlap similarity of two texts.
pub fn content_similarity(a: &str, b: &str) -> f32 {
    jaccard(&content_words(a), &content_words(b))
}

/// `1 - mean similarity` of a candidate against the already selected items.
/// Items of another kind or conversation count as fully dissimilar.
fn diversity_against(
    candidate: &ScoredItem,
    candidate_words: &HashSet<String>,
    selected: &[(ScoredItem, HashSet<String>)],
) -> f32 {
    if selected.is_empty() {
        return 1.0;
    }
    let total: f32 = selected
        .iter()
        .map(|(item, words)| {
            if item.kind != candidate.kind || item.conversation_id != candidate.conversation_id {
                0.0
            } else {
                jaccard(candidate_words, words)
            }
        })
        .sum();
    1.0 - total / selected.len() as f32
}

/// Greedy diversity-aware selection.
///
/// Always keeps the most relevant item, then repeatedly takes the candidate
/// maximizing `relevance * (1 - d) + diversity * d`. Output is in pick order.
pub fn select_diverse(items: &[ScoredItem], max_items: usize, diversity_weight: f32) -> Vec<ScoredItem> {
    if max_items == 0 || items.is_empty() {
        return Vec::new();
    }
    let d = diversity_weight.clamp(0.0, 1.0);

    let mut pool: Vec<(ScoredItem, HashSet<String>)> = items
        .iter()
        .map(|item| (item.clone(), content_words(&item.content)))
        .collect();
    pool.sort_by(|a, b| b.0.relevance.total_cmp(&a.0.relevance));

    let mut selected: Vec<(ScoredItem, HashSet<String>)> = Vec::with_capacity(max_items.min(pool.len()));
    selected.push(pool.remove(0));

    while selected.len() < max_items && !pool.is_empty() {
        let mut best_index = 0;
        let mut best_score = f32::MIN;
        for (index, (item, words)) in pool.iter().enumerate() {
            let diversity = diversity_against(item, words, &selected);
            let score = item.relevance * (1.0 - d) + diversity * d;
            if score > best_score {
                best_score = score;
                best_index = index;
            }
        }
        selected.push(pool.remove(best_index));
    }

    selected.into_iter().map(|(item, _)| item).collect()
}

/// Cap `items` at `max_items` while aiming for `summary_ratio` summaries.
///
/// Slots one kind cannot fill go to the other. Chosen items keep their
/// input order.
pub fn balance_types(items: &[ScoredItem], max_items: usize, summary_ratio: f32) -> Vec<ScoredItem> {
    let available_summaries = items.iter().filter(|i| i.kind == ItemKind::Summary).count();
    let available_messages = items.len() - available_summaries;

    let target_summaries = (max_items as f32 * summary_ratio.clamp(0.0, 1.0)).round() as usize;
    let target_messages = max_items - target_summaries.min(max_items);

    let mut summaries = target_summaries.min(available_summaries);
    let mut messages = target_messages.min(available_messages);
    let spare = max_items.saturating_sub(summaries + messages);
    if spare > 0 {
        let extra_summaries = spare.min(available_summaries - summaries);
        summaries += extra_summaries;
        messages += (spare - extra_summaries).min(available_messages - messages);
    }

    let (mut taken_summaries, mut taken_messages) = (0, 0);
    items
        .iter()
        .filter(|item| match item.kind {
            ItemKind::Summary if taken_summaries < summaries => {
                taken_summaries += 1;
                true
            }
            ItemKind::Message if taken_messages < messages => {
                taken_messages += 1;
                true
            }
            _ => false,
        })
        .cloned()
        .collect()
}

/// Diversity pass over a wider pool, then type balancing down to `max_items`.
pub fn select_balanced(items: &[ScoredItem], max_items: usize, params: &StrategyParams) -> Vec<ScoredItem> {
    let pool = select_diverse(items, max_items.saturating_mul(2), params.diversity_weight);
    balance_types(&pool, max_items, params.summary_ratio)
}

/// Group items by conversation in order of first appearance.
pub fn group_by_conversation(items: &[ScoredItem]) -> Vec<(String, Vec<ScoredItem>)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<ScoredItem>)> = Vec::new();
    for item in items {
        let slot = *index.entry(item.conversation_id.as_str()).or_insert_with(|| {
            groups.push((item.conversation_id.clone(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(item.clone());
    }
    groups
}

/// Linear recency boost: 1.0 under a day old, falling to 0 at seven days.
pub fn recency_boost(item: &ScoredItem, now: DateTime<Utc>) -> f32 {
    let age_days = item.age_hours(now) / 24.0;
    if age_days < 1.0 {
        1.0
    } else if age_days >= 7.0 {
        0.0
    } else {
        ((7.0 - age_days) / 6.0) as f32
    }
}

/// Whether the query asks for an overview rather than a specific fact.
pub fn is_broad_query(query: &str) -> bool {
    BROAD_QUERY.is_match(query)
}

/// `max_items`, reduced so each item could get a minimal share of the
/// content budget.
pub fn item_cap(max_items: usize, budget: &TokenBudget) -> usize {
    max_items.min((budget.content() / MIN_TOKENS_PER_SLOT).max(1))
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use chrono::Duration;

    #[test]
    fn filter_keeps_threshold_items() {
        let items = vec![
            message("a", "c", "x", 0.2),
            message("b", "c", "y", 0.3),
            message("c", "c", "z", 0.9),
        ];
        let kept: Vec<_> = filter_by_relevance(&items, 0.3).into_iter().map(|i| i.id).collect();
        assert_eq!(kept, vec!["b", "c"]);
    }

    #[test]
    fn similarity_ignores_case_punctuation_and_stop_words() {
        let s = content_similarity("The Deploy failed!", "deploy FAILED");
        assert!((s - 1.0).abs() < 1e-6);
        assert_eq!(content_similarity("alpha", "omega"), 0.0);
        assert_eq!(content_similarity("", ""), 0.0);
    }

    #[test]
    fn diverse_selection_keeps_top_and_avoids_duplicates() {
        let items = vec![
            message("top", "c", "database migration failed on staging", 0.9),
            message("dup", "c", "database migration failed on staging again", 0.85),
            message("other", "c", "lunch order for the offsite", 0.6),
        ];
        let picked: Vec<_> = select_diverse(&items, 2, 0.5).into_iter().map(|i| i.id).collect();
        assert_eq!(picked, vec!["top", "other"]);
    }

    #[test]
    fn zero_diversity_is_relevance_order() {
        let items = vec![
            message("b", "c", "same words", 0.5),
            message("a", "c", "same words", 0.9),
            message("c", "c", "same words", 0.7),
        ];
        let picked: Vec<_> = select_diverse(&items, 3, 0.0).into_iter().map(|i| i.id).collect();
        assert_eq!(picked, vec!["a", "c", "b"]);
    }

    #[test]
    fn balance_respects_ratio_and_reallocates() {
        let items = vec![
            summary("s1", "c", "x", 0.9),
            message("m1", "c", "x", 0.8),
            summary("s2", "c", "x", 0.7),
            message("m2", "c", "x", 0.6),
            message("m3", "c", "x", 0.5),
            message("m4", "c", "x", 0.4),
        ];
        let picked: Vec<_> = balance_types(&items, 4, 0.5).into_iter().map(|i| i.id).collect();
        assert_eq!(picked, vec!["s1", "m1", "s2", "m2"]);

        // only two summaries exist; the spare slot goes to messages
        let picked: Vec<_> = balance_types(&items, 5, 0.8).into_iter().map(|i| i.id).collect();
        assert_eq!(picked, vec!["s1", "m1", "s2", "m2", "m3"]);
    }

    #[test]
    fn grouping_preserves_first_appearance() {
        let items = vec![
            message("1", "b", "x", 0.5),
            message("2", "a", "x", 0.5),
            message("3", "b", "x", 0.5),
        ];
        let groups = group_by_conversation(&items);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "b");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "a");
    }

    #[test]
    fn recency_boost_is_linear() {
        let now = Utc::now();
        let fresh = message_aged("f", "x", 0.5, now, Duration::hours(3));
        let mid = message_aged("m", "x", 0.5, now, Duration::days(4));
        let old = message_aged("o", "x", 0.5, now, Duration::days(9));
        assert_eq!(recency_boost(&fresh, now), 1.0);
        assert!((recency_boost(&mid, now) - 0.5).abs() < 1e-4);
        assert_eq!(recency_boost(&old, now), 0.0);
    }

    #[test]
    fn item_cap_tracks_budget() {
        let budget = TokenBudget {
            total: 100,
            query: 5,
            summaries: 30,
            messages: 50,
            metadata: 10,
            buffer: 5,
        };
        assert_eq!(item_cap(15, &budget), 4);
        assert_eq!(item_cap(2, &budget), 2);
    }
}
