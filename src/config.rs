use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            min_chars: default_min_chars(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_min_chars() -> usize {
    10
}
fn default_timeout_secs() -> u64 {
    30
}

/// Tunables for the similarity searches and the unified merge.
///
/// These started life as literals inside the search code; they are config
/// keys so thresholds and scan windows can be adjusted without a code change.
#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Relevance floor: results must score strictly above this.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Candidate window for message scans (most recent N embeddings).
    #[serde(default = "default_message_window")]
    pub message_window: i64,
    /// Candidate window for document-chunk scans.
    #[serde(default = "default_document_window")]
    pub document_window: i64,
    /// Default result limit for message search.
    #[serde(default = "default_message_limit")]
    pub message_limit: usize,
    /// Default result limit for document search.
    #[serde(default = "default_document_limit")]
    pub document_limit: usize,
    /// Default result limit for unified search.
    #[serde(default = "default_unified_limit")]
    pub unified_limit: usize,
    /// Unified search over-fetch multiplier for the message branch.
    #[serde(default = "default_message_budget")]
    pub message_budget: f64,
    /// Unified search over-fetch multiplier for the document branch.
    #[serde(default = "default_document_budget")]
    pub document_budget: f64,
    /// Default message count for conversation-context fetches.
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            message_window: default_message_window(),
            document_window: default_document_window(),
            message_limit: default_message_limit(),
            document_limit: default_document_limit(),
            unified_limit: default_unified_limit(),
            message_budget: default_message_budget(),
            document_budget: default_document_budget(),
            context_limit: default_context_limit(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.7
}
fn default_message_window() -> i64 {
    500
}
fn default_document_window() -> i64 {
    200
}
fn default_message_limit() -> usize {
    10
}
fn default_document_limit() -> usize {
    5
}
fn default_unified_limit() -> usize {
    10
}
fn default_message_budget() -> f64 {
    0.7
}
fn default_document_budget() -> f64 {
    0.5
}
fn default_context_limit() -> usize {
    20
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if !(-1.0..=1.0).contains(&config.search.similarity_threshold) {
        anyhow::bail!("search.similarity_threshold must be in [-1.0, 1.0]");
    }
    if config.search.message_window < 1 || config.search.document_window < 1 {
        anyhow::bail!("search.message_window and search.document_window must be >= 1");
    }
    if config.search.message_budget <= 0.0 || config.search.document_budget <= 0.0 {
        anyhow::bail!("search.message_budget and search.document_budget must be > 0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(config)
}
