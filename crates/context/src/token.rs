//! Token accounting.
//!
//! Uses a character-based heuristic calibrated per model family: a token is
//! `avg_chars_per_token` characters, rounded up. No real tokenizer is ever
//! called, so every budget computed downstream is internally consistent but
//! only approximately matches what a provider would bill.

use rustedrecall_core::message::StoredMessage;
use serde::{Deserialize, Serialize};

/// Tokenization profile of one model family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    pub avg_chars_per_token: f64,
    /// Extra fraction of tokens spent on formatting markers
    pub formatting_overhead: f64,
    /// Extra fraction of tokens spent on serialized metadata
    pub metadata_overhead: f64,
}

const DEFAULT_PROFILE: ModelProfile = ModelProfile {
    avg_chars_per_token: 4.0,
    formatting_overhead: 0.10,
    metadata_overhead: 0.15,
};

// Prefix lookups resolve to the longest matching name.
const KNOWN_PROFILES: &[(&str, ModelProfile)] = &[
    (
        "gpt-3.5-turbo",
        ModelProfile {
            avg_chars_per_token: 4.0,
            formatting_overhead: 0.08,
            metadata_overhead: 0.12,
        },
    ),
    (
        "gpt-4o",
        ModelProfile {
            avg_chars_per_token: 4.0,
            formatting_overhead: 0.10,
            metadata_overhead: 0.15,
        },
    ),
    (
        "gpt-4",
        ModelProfile {
            avg_chars_per_token: 3.8,
            formatting_overhead: 0.10,
            metadata_overhead: 0.15,
        },
    ),
    (
        "claude-3",
        ModelProfile {
            avg_chars_per_token: 3.5,
            formatting_overhead: 0.12,
            metadata_overhead: 0.20,
        },
    ),
    (
        "claude",
        ModelProfile {
            avg_chars_per_token: 3.6,
            formatting_overhead: 0.12,
            metadata_overhead: 0.20,
        },
    ),
];

impl ModelProfile {
    /// Resolve a model identifier: exact match, then longest known prefix,
    /// then the default profile.
    pub fn for_model(model: &str) -> Self {
        let model = model.trim().to_lowercase();
        if let Some((_, profile)) = KNOWN_PROFILES.iter().find(|(name, _)| *name == model) {
            return *profile;
        }
        KNOWN_PROFILES
            .iter()
            .filter(|(name, _)| model.starts_with(name))
            .max_by_key(|(name, _)| name.len())
            .map(|(_, profile)| *profile)
            .unwrap_or(DEFAULT_PROFILE)
    }
}

impl Default for ModelProfile {
    fn default() -> Self {
        DEFAULT_PROFILE
    }
}

/// Which parts of a message to account for in [`TokenCounter::count_messages`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageCountOptions {
    pub include_metadata: bool,
    pub include_formatting: bool,
}

/// Token totals for a batch of messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageTokenBreakdown {
    pub content: usize,
    pub metadata: usize,
    pub formatting: usize,
    pub total: usize,
    /// Total per message, in input order
    pub per_message: Vec<usize>,
}

/// A fixed-ratio split of a raw token allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetSplit {
    pub summaries: usize,
    pub details: usize,
    pub metadata: usize,
    pub buffer: usize,
}

const SPLIT_BUFFER_RATIO: f64 = 0.10;
const SPLIT_METADATA_RATIO: f64 = 0.10;

/// Approximate token counter bound to one model profile.
#[derive(Debug, Clone, Copy)]
pub struct TokenCounter {
    profile: ModelProfile,
}

impl TokenCounter {
    pub fn new(profile: ModelProfile) -> Self {
        Self { profile }
    }

    pub fn for_model(model: &str) -> Self {
        Self::new(ModelProfile::for_model(model))
    }

    pub fn profile(&self) -> &ModelProfile {
        &self.profile
    }

    /// Estimate the token count for a string.
    ///
    /// `ceil(chars / avg_chars_per_token)`, at least 1 for non-empty text.
    pub fn count_text(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let chars = text.chars().count() as f64;
        // Epsilon keeps float noise (e.g. 190 / 3.8) from rounding up a whole token.
        ((chars / self.profile.avg_chars_per_token - 1e-9).ceil() as usize).max(1)
    }

    /// Token count plus the model's formatting overhead.
    pub fn count_formatted(&self, text: &str) -> usize {
        let base = self.count_text(text);
        base + (base as f64 * self.profile.formatting_overhead).ceil() as usize
    }

    /// Largest character length whose count stays within `tokens`.
    pub fn chars_for_tokens(&self, tokens: usize) -> usize {
        (tokens as f64 * self.profile.avg_chars_per_token).floor() as usize
    }

    /// Estimate tokens for a slice of stored messages.
    pub fn count_messages(
        &self,
        messages: &[StoredMessage],
        options: MessageCountOptions,
    ) -> MessageTokenBreakdown {
        let mut breakdown = MessageTokenBreakdown::default();

        for message in messages {
            let content = self.count_text(&message.content);

            let metadata = if options.include_metadata && !message.metadata.is_empty() {
                let json = serde_json::to_string(&message.metadata).unwrap_or_default();
                let base = self.count_text(&json);
                base + (base as f64 * self.profile.metadata_overhead).ceil() as usize
            } else {
                0
            };

            let formatting = if options.include_formatting {
                self.count_text(&format!(
                    "[{}] {}: ",
                    message.created_at.format("%Y-%m-%d %H:%M"),
                    message.role
                ))
            } else {
                0
            };

            let total = content + metadata + formatting;
            breakdown.content += content;
            breakdown.metadata += metadata;
            breakdown.formatting += formatting;
            breakdown.total += total;
            breakdown.per_message.push(total);
        }

        breakdown
    }

    /// Split `max_tokens` into summaries / details / metadata / buffer.
    ///
    /// Buffer and metadata each take 10%; `summary_ratio` of what remains
    /// goes to summaries and the rest to details. The four parts always
    /// sum to `max_tokens`.
    pub fn calculate_token_budget(&self, max_tokens: usize, summary_ratio: f64) -> BudgetSplit {
        let buffer = (max_tokens as f64 * SPLIT_BUFFER_RATIO).floor() as usize;
        let metadata = (max_tokens as f64 * SPLIT_METADATA_RATIO).floor() as usize;
        let available = max_tokens - buffer - metadata;
        let summaries = (available as f64 * summary_ratio.clamp(0.0, 1.0)).floor() as usize;

        BudgetSplit {
            summaries,
            details: available - summaries,
            metadata,
            buffer,
        }
    }

    /// Slice text into chunks of at most `max_tokens_per_chunk` tokens.
    ///
    /// Chunks break at the last whitespace past 80% of the character budget
    /// when one exists. Consecutive chunks share `overlap_tokens` worth of
    /// characters.
    pub fn chunk_text(
        &self,
        text: &str,
        max_tokens_per_chunk: usize,
        overlap_tokens: usize,
    ) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }

        let chunk_chars = self
            .chars_for_tokens(max_tokens_per_chunk.max(1))
            .max(self.profile.avg_chars_per_token.ceil() as usize)
            .max(1);
        let overlap_chars = self.chars_for_tokens(overlap_tokens).min(chunk_chars / 2);
        let break_floor = (chunk_chars as f64 * 0.8) as usize;

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let mut end = (start + chunk_chars).min(chars.len());

            if end < chars.len() {
                if let Some(pos) = (start + break_floor..end)
                    .rev()
                    .find(|&i| chars[i].is_whitespace())
                {
                    end = pos;
                }
            }

            let chunk: String = chars[start..end].iter().collect();
            let trimmed = chunk.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }

            if end >= chars.len() {
                break;
            }

            let next = end.saturating_sub(overlap_chars);
            start = if next > start { next } else { end };
        }

        chunks
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new(ModelProfile::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustedrecall_core::message::Role;

    fn counter() -> TokenCounter {
        TokenCounter::default()
    }

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(counter().count_text(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(counter().count_text("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(counter().count_text("hello"), 2);
    }

    #[test]
    fn single_char_has_floor_of_one() {
        assert_eq!(counter().count_text("a"), 1);
    }

    #[test]
    fn hundred_chars() {
        let text = "a".repeat(100);
        assert_eq!(counter().count_text(&text), 25);
    }

    #[test]
    fn multibyte_counts_chars_not_bytes() {
        // 4 chars, 12 bytes
        assert_eq!(counter().count_text("日本語訳"), 1);
    }

    #[test]
    fn formatting_overhead_added() {
        let text = "a".repeat(100); // 25 tokens + ceil(2.5) = 28
        assert_eq!(counter().count_formatted(&text), 28);
    }

    #[test]
    fn model_lookup_prefers_longest_prefix() {
        assert_eq!(ModelProfile::for_model("gpt-4").avg_chars_per_token, 3.8);
        assert_eq!(ModelProfile::for_model("gpt-4o-mini").avg_chars_per_token, 4.0);
        assert_eq!(ModelProfile::for_model("claude-3-opus").avg_chars_per_token, 3.5);
        assert_eq!(ModelProfile::for_model("claude-2").avg_chars_per_token, 3.6);
        assert_eq!(ModelProfile::for_model("mystery-model"), ModelProfile::default());
    }

    #[test]
    fn chars_for_tokens_inverts_count() {
        let c = TokenCounter::for_model("claude-3");
        for tokens in [1, 7, 50, 300] {
            let chars = c.chars_for_tokens(tokens);
            assert!(c.count_text(&"x".repeat(chars)) <= tokens);
        }
    }

    #[test]
    fn messages_breakdown() {
        let msgs = vec![
            StoredMessage::new("c", Role::User, "hello"),     // 2 tokens
            StoredMessage::new("c", Role::Assistant, "world") // 2 tokens
                .with_metadata("model", serde_json::json!("gpt-4")),
        ];

        let plain = counter().count_messages(&msgs, MessageCountOptions::default());
        assert_eq!(plain.content, 4);
        assert_eq!(plain.total, 4);
        assert_eq!(plain.per_message, vec![2, 2]);

        let full = counter().count_messages(
            &msgs,
            MessageCountOptions {
                include_metadata: true,
                include_formatting: true,
            },
        );
        assert!(full.metadata > 0);
        assert!(full.formatting > 0);
        assert_eq!(full.total, full.content + full.metadata + full.formatting);
        assert_eq!(full.per_message.iter().sum::<usize>(), full.total);
    }

    #[test]
    fn budget_split_sums_to_total() {
        for max in [0, 1, 99, 1000, 4001] {
            let split = counter().calculate_token_budget(max, 0.3);
            assert_eq!(
                split.summaries + split.details + split.metadata + split.buffer,
                max
            );
        }
        let split = counter().calculate_token_budget(1000, 0.3);
        assert_eq!(split.buffer, 100);
        assert_eq!(split.metadata, 100);
        assert_eq!(split.summaries, 240);
        assert_eq!(split.details, 560);
    }

    #[test]
    fn chunking_respects_size_and_overlap() {
        let text = "word ".repeat(200);
        let c = counter();
        let chunks = c.chunk_text(&text, 25, 5);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(c.count_text(chunk) <= 25);
            assert!(!chunk.is_empty());
        }
    }

    #[test]
    fn chunking_breaks_on_whitespace() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let chunks = counter().chunk_text(text, 5, 0);
        for chunk in &chunks {
            assert!(!chunk.starts_with(' '));
            assert!(text.contains(chunk.as_str()));
        }
        assert_eq!(chunks[0], "alpha beta gamma");
        assert_eq!(chunks[1], "delta epsilon zeta");
    }

    #[test]
    fn chunking_unbroken_text_makes_progress() {
        let text = "x".repeat(1000);
        let chunks = counter().chunk_text(&text, 10, 50);
        assert!(!chunks.is_empty());
        assert!(chunks.len() < 1000);
    }

    #[test]
    fn chunking_empty_text() {
        assert!(counter().chunk_text("", 10, 0).is_empty());
    }
}
