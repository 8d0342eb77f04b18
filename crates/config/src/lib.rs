//! Configuration loading, validation, and management for RustedRecall.
//!
//! Loads configuration from `~/.rustedrecall/config.toml` with environment
//! variable overrides. Every field has a serde default, so a missing or
//! partial file yields a working configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.rustedrecall/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallConfig {
    /// Model used for token accounting when a request names none
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Relevance scoring weights and thresholds
    #[serde(default)]
    pub scorer: ScorerConfig,

    /// Token budget allocation ratios
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Token optimizer limits and truncation strategy
    #[serde(default)]
    pub optimizer: OptimizerConfig,

    /// Request defaults and pipeline governors
    #[serde(default)]
    pub assembly: AssemblyConfig,
}

fn default_model() -> String {
    "gpt-4".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,

    #[serde(default = "default_signal_weight")]
    pub temporal_weight: f32,

    #[serde(default = "default_signal_weight")]
    pub entity_weight: f32,

    #[serde(default = "default_signal_weight")]
    pub structural_weight: f32,

    /// Cosine similarity below this counts as no semantic signal
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,

    /// Half-life of the temporal decay, in days
    #[serde(default = "default_half_life_days")]
    pub half_life_days: f64,

    /// Maximum number of memoized query embeddings
    #[serde(default = "default_cache_capacity")]
    pub embedding_cache_capacity: usize,
}

fn default_semantic_weight() -> f32 {
    0.4
}
fn default_signal_weight() -> f32 {
    0.2
}
fn default_min_similarity() -> f32 {
    0.1
}
fn default_half_life_days() -> f64 {
    7.0
}
fn default_cache_capacity() -> usize {
    256
}

impl ScorerConfig {
    pub fn weight_sum(&self) -> f32 {
        self.semantic_weight + self.temporal_weight + self.entity_weight + self.structural_weight
    }

    /// Weights are expected to sum to 1. Anything else still works but
    /// skews the score range, so callers log it rather than fail.
    pub fn weights_balanced(&self) -> bool {
        (self.weight_sum() - 1.0).abs() <= 0.01
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            semantic_weight: default_semantic_weight(),
            temporal_weight: default_signal_weight(),
            entity_weight: default_signal_weight(),
            structural_weight: default_signal_weight(),
            min_similarity: default_min_similarity(),
            half_life_days: default_half_life_days(),
            embedding_cache_capacity: default_cache_capacity(),
        }
    }
}

/// Fractions of the request budget per category. Must sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_query_ratio")]
    pub query_ratio: f64,

    #[serde(default = "default_summary_ratio")]
    pub summary_ratio: f64,

    #[serde(default = "default_message_ratio")]
    pub message_ratio: f64,

    #[serde(default = "default_metadata_ratio")]
    pub metadata_ratio: f64,

    #[serde(default = "default_buffer_ratio")]
    pub buffer_ratio: f64,
}

fn default_query_ratio() -> f64 {
    0.05
}
fn default_summary_ratio() -> f64 {
    0.30
}
fn default_message_ratio() -> f64 {
    0.50
}
fn default_metadata_ratio() -> f64 {
    0.10
}
fn default_buffer_ratio() -> f64 {
    0.05
}

impl BudgetConfig {
    pub fn ratio_sum(&self) -> f64 {
        self.query_ratio + self.summary_ratio + self.message_ratio + self.metadata_ratio + self.buffer_ratio
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            query_ratio: default_query_ratio(),
            summary_ratio: default_summary_ratio(),
            message_ratio: default_message_ratio(),
            metadata_ratio: default_metadata_ratio(),
            buffer_ratio: default_buffer_ratio(),
        }
    }
}

/// How oversized content is cut down to its token target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncationStrategy {
    /// Keep the beginning, cut at a sentence or word boundary
    End,
    /// Keep the beginning and the end, drop the middle
    Middle,
    /// Keep the highest-value sentences in original order
    #[default]
    Smart,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_max_tokens_per_item")]
    pub max_tokens_per_item: usize,

    #[serde(default = "default_min_tokens_per_item")]
    pub min_tokens_per_item: usize,

    /// Fraction of each category budget held back
    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,

    #[serde(default)]
    pub truncation: TruncationStrategy,
}

fn default_max_tokens_per_item() -> usize {
    500
}
fn default_min_tokens_per_item() -> usize {
    20
}
fn default_safety_margin() -> f64 {
    0.05
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_item: default_max_tokens_per_item(),
            min_tokens_per_item: default_min_tokens_per_item(),
            safety_margin: default_safety_margin(),
            truncation: TruncationStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: usize,

    #[serde(default = "default_min_relevance")]
    pub default_min_relevance: f32,

    /// Default look-back window in milliseconds (7 days)
    #[serde(default = "default_time_window_ms")]
    pub default_time_window_ms: u64,

    /// Upper bound on candidates pulled from storage per request
    #[serde(default = "default_max_items_to_evaluate")]
    pub max_items_to_evaluate: usize,

    /// Soft deadline for the scoring stage
    #[serde(default = "default_max_processing_time_ms")]
    pub max_processing_time_ms: u64,

    /// Quality floor for summaries pulled without a conversation scope
    #[serde(default = "default_min_summary_quality")]
    pub min_summary_quality: f32,
}

fn default_max_tokens() -> usize {
    4000
}
fn default_min_relevance() -> f32 {
    0.3
}
fn default_time_window_ms() -> u64 {
    7 * 24 * 60 * 60 * 1000
}
fn default_max_items_to_evaluate() -> usize {
    200
}
fn default_max_processing_time_ms() -> u64 {
    5_000
}
fn default_min_summary_quality() -> f32 {
    0.5
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: default_max_tokens(),
            default_min_relevance: default_min_relevance(),
            default_time_window_ms: default_time_window_ms(),
            max_items_to_evaluate: default_max_items_to_evaluate(),
            max_processing_time_ms: default_max_processing_time_ms(),
            min_summary_quality: default_min_summary_quality(),
        }
    }
}

impl RecallConfig {
    /// Load configuration from the default path (~/.rustedrecall/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `RUSTEDRECALL_MODEL`
    /// - `RUSTEDRECALL_MAX_TOKENS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("RUSTEDRECALL_MODEL") {
            self.default_model = model;
        }

        if let Ok(raw) = std::env::var("RUSTEDRECALL_MAX_TOKENS") {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => self.assembly.default_max_tokens = n,
                _ => tracing::warn!(value = %raw, "Ignoring invalid RUSTEDRECALL_MAX_TOKENS"),
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".rustedrecall")
    }

    /// Validate the configuration.
    ///
    /// Scorer weights that do not sum to 1 are reported as a warning only.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ratio_sum = self.budget.ratio_sum();
        if (ratio_sum - 1.0).abs() > 0.01 {
            return Err(ConfigError::ValidationError(format!(
                "budget ratios must sum to 1.0 (got {ratio_sum:.3})"
            )));
        }

        let ratios = [
            self.budget.query_ratio,
            self.budget.summary_ratio,
            self.budget.message_ratio,
            self.budget.metadata_ratio,
            self.budget.buffer_ratio,
        ];
        if ratios.iter().any(|r| !(0.0..=1.0).contains(r)) {
            return Err(ConfigError::ValidationError(
                "budget ratios must each be between 0.0 and 1.0".into(),
            ));
        }

        if !(0.0..0.5).contains(&self.optimizer.safety_margin) {
            return Err(ConfigError::ValidationError(
                "optimizer.safety_margin must be in [0.0, 0.5)".into(),
            ));
        }

        if self.optimizer.min_tokens_per_item == 0
            || self.optimizer.min_tokens_per_item > self.optimizer.max_tokens_per_item
        {
            return Err(ConfigError::ValidationError(
                "optimizer.min_tokens_per_item must be > 0 and <= max_tokens_per_item".into(),
            ));
        }

        if self.scorer.half_life_days <= 0.0 {
            return Err(ConfigError::ValidationError(
                "scorer.half_life_days must be > 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.assembly.default_min_relevance) {
            return Err(ConfigError::ValidationError(
                "assembly.default_min_relevance must be between 0.0 and 1.0".into(),
            ));
        }

        if self.assembly.max_items_to_evaluate < 2 {
            return Err(ConfigError::ValidationError(
                "assembly.max_items_to_evaluate must be >= 2".into(),
            ));
        }

        if !self.scorer.weights_balanced() {
            tracing::warn!(
                sum = self.scorer.weight_sum(),
                "Scorer weights do not sum to 1.0; relevance scores will be skewed"
            );
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            scorer: ScorerConfig::default(),
            budget: BudgetConfig::default(),
            optimizer: OptimizerConfig::default(),
            assembly: AssemblyConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
