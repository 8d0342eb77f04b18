//! Heuristic entity extraction.
//!
//! Entities are found with fixed regex families rather than a model, so the
//! pattern set is a policy object: callers hold an [`EntityPatterns`] and
//! can swap it for a different one. Everything here is ASCII/English-centric.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, LazyLock};

/// Coarse type of an extracted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Organization,
    Product,
    Technical,
    Location,
    Concept,
}

/// An entity with its inferred type. `text` keeps the original casing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedEntity {
    pub text: String,
    pub kind: EntityKind,
}

impl TypedEntity {
    pub fn new(text: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    /// Lower-cased text used for matching.
    pub fn key(&self) -> String {
        self.text.to_lowercase()
    }
}

/// Capitalized words that start sentences or questions, not names.
const LEADING_STOPWORDS: &[&str] = &[
    "a", "after", "also", "an", "and", "are", "at", "before", "but", "can", "could", "did", "does",
    "find", "from", "hello", "hey", "hi", "how", "i", "if", "in", "is", "my", "on", "our",
    "please", "should", "show", "so", "tell", "thanks", "the", "then", "this", "that", "today",
    "we", "what", "when", "where", "which", "who", "why", "would", "yesterday",
];

const TECHNICAL_TERMS: &[&str] = &[
    "api", "aws", "docker", "git", "graphql", "grpc", "http", "javascript", "json", "kafka",
    "kubernetes", "linux", "mysql", "node", "postgres", "postgresql", "python", "react", "redis",
    "rest", "rust", "sql", "sqlite", "tokio", "typescript", "wasm", "webpack", "yaml",
];

const ORG_SUFFIX: &str = r"(?:Corp|Corporation|Inc|Ltd|LLC|Company|Co|Labs|Technologies|Group|Foundation|Systems)";

/// The regex policy used for entity extraction.
pub struct EntityPatterns {
    person: Regex,
    domain: Regex,
    acronym: Regex,
    mention: Regex,
    hashtag: Regex,
    iso_date: Regex,
    currency: Regex,
    organization: Regex,
    product: Regex,
    camel_case: Regex,
    snake_case: Regex,
    location: Regex,
    quoted: Regex,
}

static DEFAULT_PATTERNS: LazyLock<Arc<EntityPatterns>> = LazyLock::new(|| {
    Arc::new(EntityPatterns::try_new().expect("built-in entity patterns compile"))
});

impl EntityPatterns {
    /// Compile the built-in pattern set.
    pub fn try_new() -> Result<Self, regex_lite::Error> {
        Ok(Self {
            person: Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)+\b")?,
            domain: Regex::new(r"\b[A-Za-z0-9][A-Za-z0-9-]*(?:\.[A-Za-z0-9-]+)*\.(?:com|org|net|io|dev|ai|co|edu|gov)\b")?,
            acronym: Regex::new(r"\b[A-Z]{2,}[0-9]*\b")?,
            mention: Regex::new(r"@[A-Za-z0-9_]+")?,
            hashtag: Regex::new(r"#[A-Za-z][A-Za-z0-9_]*")?,
            iso_date: Regex::new(r"\b\d{4}-\d{2}-\d{2}\b")?,
            currency: Regex::new(r"\b(?:USD|EUR|GBP|JPY|CNY|CHF|CAD|AUD)\b")?,
            organization: Regex::new(&format!(
                r"\b[A-Z][A-Za-z0-9&]*(?:\s+[A-Z][A-Za-z0-9&]*)*\s+{ORG_SUFFIX}\b"
            ))?,
            product: Regex::new(r"\b[A-Z][A-Za-z]+\s?v?\d+(?:\.\d+)*\b")?,
            camel_case: Regex::new(r"\b[A-Z][a-z]+[A-Z][A-Za-z]+\b")?,
            snake_case: Regex::new(r"\b[a-z]+(?:_[a-z0-9]+)+\b")?,
            location: Regex::new(r"\b(?:in|at|from|near)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)")?,
            quoted: Regex::new(r#""([^"]{3,60})""#)?,
        })
    }

    /// Shared instance of the built-in pattern set.
    pub fn shared() -> Arc<EntityPatterns> {
        Arc::clone(&DEFAULT_PATTERNS)
    }

    /// Lower-cased entity strings found by the untyped families: names,
    /// domains, acronyms, @-mentions, #-hashtags, ISO dates, currencies.
    pub fn extract(&self, text: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();

        for m in self.person.find_iter(text) {
            if let Some(name) = trim_leading_stopwords(m.as_str()) {
                out.insert(name.to_lowercase());
            }
        }

        for re in [
            &self.domain,
            &self.acronym,
            &self.mention,
            &self.hashtag,
            &self.iso_date,
            &self.currency,
        ] {
            for m in re.find_iter(text) {
                out.insert(m.as_str().to_lowercase());
            }
        }

        out
    }

    /// Typed entities, de-duplicated case-insensitively. The first family
    /// to claim a span decides its kind.
    pub fn extract_typed(&self, text: &str) -> Vec<TypedEntity> {
        let mut found: Vec<TypedEntity> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut push = |text: &str, kind: EntityKind| {
            let text = text.trim();
            if text.len() < 2 {
                return;
            }
            if seen.insert(text.to_lowercase()) {
                found.push(TypedEntity::new(text, kind));
            }
        };

        let organizations: Vec<&str> = self.organization.find_iter(text).map(|m| m.as_str()).collect();
        for org in organizations.iter().copied() {
            let org = trim_leading_stopwords(org).unwrap_or(org);
            push(org, EntityKind::Organization);
        }

        for m in self.product.find_iter(text) {
            push(m.as_str(), EntityKind::Product);
        }

        for word in text.split(|c: char| !c.is_alphanumeric()) {
            if TECHNICAL_TERMS.contains(&word.to_lowercase().as_str()) {
                push(word, EntityKind::Technical);
            }
        }
        for re in [&self.camel_case, &self.snake_case] {
            for m in re.find_iter(text) {
                push(m.as_str(), EntityKind::Technical);
            }
        }

        let mut locations = Vec::new();
        for caps in self.location.captures_iter(text) {
            if let Some(place) = caps.get(1) {
                if !LEADING_STOPWORDS.contains(&place.as_str().to_lowercase().as_str()) {
                    locations.push(place.as_str().to_string());
                    push(place.as_str(), EntityKind::Location);
                }
            }
        }

        for m in self.person.find_iter(text) {
            let Some(name) = trim_leading_stopwords(m.as_str()) else {
                continue;
            };
            let inside_other = organizations.iter().any(|o| o.contains(name))
                || locations.iter().any(|l| l == name);
            if !inside_other {
                push(name, EntityKind::Person);
            }
        }

        for m in self.acronym.find_iter(text) {
            if !TECHNICAL_TERMS.contains(&m.as_str().to_lowercase().as_str()) {
                push(m.as_str(), EntityKind::Organization);
            }
        }

        for caps in self.quoted.captures_iter(text) {
            if let Some(q) = caps.get(1) {
                push(q.as_str(), EntityKind::Concept);
            }
        }
        for m in self.hashtag.find_iter(text) {
            push(m.as_str().trim_start_matches('#'), EntityKind::Concept);
        }

        found
    }

    /// Infer the kind of an explicitly supplied entity string.
    pub fn classify(&self, entity: &str) -> EntityKind {
        let entity = entity.trim();
        let is_acronym = self.acronym.find(entity).is_some_and(|m| m.as_str() == entity);
        if self.organization.is_match(entity) || is_acronym {
            EntityKind::Organization
        } else if TECHNICAL_TERMS.contains(&entity.to_lowercase().as_str())
            || self.camel_case.is_match(entity)
            || self.snake_case.is_match(entity)
        {
            EntityKind::Technical
        } else if entity.chars().any(|c| c.is_ascii_digit()) {
            EntityKind::Product
        } else if self.person.is_match(entity) {
            EntityKind::Person
        } else {
            EntityKind::Concept
        }
    }
}

impl Default for EntityPatterns {
    fn default() -> Self {
        Self::try_new().expect("built-in entity patterns compile")
    }
}

/// Drop sentence-starting words from a capitalized run. Returns `None`
/// when fewer than two words remain.
fn trim_leading_stopwords(candidate: &str) -> Option<&str> {
    let mut rest = candidate.trim();
    loop {
        let (first, tail) = match rest.split_once(char::is_whitespace) {
            Some((first, tail)) => (first, tail.trim_start()),
            None => (rest, ""),
        };
        if !LEADING_STOPWORDS.contains(&first.to_lowercase().as_str()) {
            break;
        }
        rest = tail;
    }
    if rest.split_whitespace().count() >= 2 {
        Some(rest)
    } else {
        None
    }
}
