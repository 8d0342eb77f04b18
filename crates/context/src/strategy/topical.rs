//! Topic-clustered selection.
//!
//! Items are grouped greedily by keyword overlap, clusters are ranked by
//! average relevance, and slots are spread over the best clusters so the
//! result covers several themes instead of repeating one.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::item::ScoredItem;
use crate::request::StrategyKind;

use super::common::{self, StrategyParams};
use super::{SelectionContext, SelectionStrategy};

const MAX_KEYWORDS: usize = 10;
const MIN_KEYWORD_LEN: usize = 4;
const CLUSTER_SIMILARITY: f32 = 0.3;
const RANKED_CLUSTERS: usize = 5;
const MAX_EXTRA_ITEMS: usize = 10;
const ITEM_CEILING: usize = 30;

const KEYWORD_STOPLIST: &[&str] = &[
    "about", "after", "also", "been", "before", "being", "between", "both", "could", "does",
    "doing", "each", "from", "have", "having", "here", "into", "just", "like", "made", "make",
    "more", "most", "much", "only", "other", "over", "same", "should", "some", "such", "than",
    "that", "their", "them", "then", "there", "these", "they", "this", "those", "very", "were",
    "what", "when", "where", "which", "while", "will", "with", "would", "your",
];

/// A group of items sharing vocabulary.
#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    pub id: String,
    pub theme: String,
    pub items: Vec<ScoredItem>,
    pub average_relevance: f32,
    pub total_relevance: f32,
    pub keywords: BTreeSet<String>,
    #[serde(skip)]
    keyword_counts: HashMap<String, usize>,
}

impl Cluster {
    fn seed(index: usize, item: ScoredItem, keywords: Vec<String>) -> Self {
        let mut cluster = Self {
            id: format!("cluster-{index}"),
            theme: String::new(),
            items: Vec::new(),
            average_relevance: 0.0,
            total_relevance: 0.0,
            keywords: BTreeSet::new(),
            keyword_counts: HashMap::new(),
        };
        cluster.add(item, keywords);
        cluster
    }

    fn add(&mut self, item: ScoredItem, keywords: Vec<String>) {
        for keyword in keywords {
            *self.keyword_counts.entry(keyword.clone()).or_default() += 1;
            self.keywords.insert(keyword);
        }
        self.total_relevance += item.relevance;
        self.items.push(item);
        self.average_relevance = self.total_relevance / self.items.len() as f32;
    }

    fn keyword_set(&self) -> HashSet<String> {
        self.keywords.iter().cloned().collect()
    }

    /// Label from the one to three most frequent keywords.
    fn label(&self) -> String {
        let mut ranked: Vec<(&String, &usize)> = self.keyword_counts.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let top: Vec<&str> = ranked.iter().take(3).map(|(k, _)| k.as_str()).collect();
        match top.as_slice() {
            [] => "General".to_string(),
            [a] => a.to_string(),
            [a, b] => format!("{a} & {b}"),
            [a, b, c, ..] => format!("{a}, {b} & {c}"),
        }
    }
}

/// Spreads selections across keyword clusters.
#[derive(Debug, Clone)]
pub struct TopicalStrategy {
    params: StrategyParams,
}

impl TopicalStrategy {
    pub fn new() -> Self {
        Self {
            params: StrategyParams {
                min_relevance: 0.3,
                diversity_weight: 0.4,
                summary_ratio: 0.5,
                max_items: 20,
            },
        }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    fn max_items(&self, ctx: &SelectionContext<'_>) -> usize {
        let mut extra = ctx.request.focus_entities.len() * 2;
        if common::is_broad_query(&ctx.request.query) {
            extra += 5;
        }
        let max = (self.params.max_items + extra.min(MAX_EXTRA_ITEMS)).min(ITEM_CEILING);
        common::item_cap(max, ctx.budget)
    }

    /// Greedy single-pass clustering; `items` should be relevance-sorted.
    pub fn cluster(&self, items: &[ScoredItem]) -> Vec<Cluster> {
        let mut clusters: Vec<Cluster> = Vec::new();
        for item in items {
            let keywords = extract_keywords(&item.content);
            let keyword_set: HashSet<String> = keywords.iter().cloned().collect();
            let home = clusters
                .iter_mut()
                .find(|c| common::jaccard(&c.keyword_set(), &keyword_set) > CLUSTER_SIMILARITY);
            match home {
                Some(cluster) => cluster.add(item.clone(), keywords),
                None => clusters.push(Cluster::seed(clusters.len(), item.clone(), keywords)),
            }
        }

        for cluster in &mut clusters {
            cluster.theme = cluster.label();
            common::sort_by_relevance(&mut cluster.items);
        }
        clusters.sort_by(|a, b| {
            b.average_relevance
                .total_cmp(&a.average_relevance)
                .then_with(|| b.items.len().cmp(&a.items.len()))
                .then_with(|| b.total_relevance.total_cmp(&a.total_relevance))
        });
        clusters
    }
}

impl Default for TopicalStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionStrategy for TopicalStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Topical
    }

    fn select(&self, items: &[ScoredItem], ctx: &SelectionContext<'_>) -> Vec<ScoredItem> {
        let min_relevance = ctx.effective_min(self.params.min_relevance);
        let mut candidates = common::filter_by_relevance(items, min_relevance);
        if candidates.is_empty() {
            return Vec::new();
        }
        common::sort_by_relevance(&mut candidates);

        let max_items = self.max_items(ctx);
        let clusters = self.cluster(&candidates);
        let base = max_items / clusters.len();

        let mut chosen: HashSet<String> = HashSet::new();
        for (rank, cluster) in clusters.iter().take(RANKED_CLUSTERS).enumerate() {
            let quota = match rank {
                0 => base + 3,
                1 => base + 2,
                _ => base,
            };
            let room = max_items.saturating_sub(chosen.len());
            chosen.extend(cluster.items.iter().take(quota.min(room)).map(|item| item.id.clone()));
        }

        let room = max_items.saturating_sub(chosen.len());
        if room > 0 {
            let unused: Vec<ScoredItem> = candidates
                .iter()
                .filter(|item| !chosen.contains(&item.id))
                .cloned()
                .collect();
            let fillers = common::select_balanced(&unused, room, &self.params);
            chosen.extend(fillers.into_iter().map(|item| item.id));
        }

        let selected: Vec<ScoredItem> = clusters
            .iter()
            .flat_map(|cluster| cluster.items.iter())
            .filter(|item| chosen.contains(&item.id))
            .cloned()
            .collect();

        tracing::debug!(
            clusters = clusters.len(),
            selected = selected.len(),
            max_items,
            "Topical selection complete"
        );
        selected
    }
}

/// Up to ten frequency-ranked keywords: alphabetic, at least four letters,
/// not on the stoplist. Ties keep first-occurrence order.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.chars().count() < MIN_KEYWORD_LEN || !word.chars().all(char::is_alphabetic) {
            continue;
        }
        let word = word.to_lowercase();
        if KEYWORD_STOPLIST.contains(&word.as_str()) {
            continue;
        }
        match counts.iter_mut().find(|(w, _)| *w == word) {
            Some((_, n)) => *n += 1,
            None => counts.push((word, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().take(MAX_KEYWORDS).map(|(w, _)| w).collect()
}
