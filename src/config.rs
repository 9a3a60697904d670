use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use pgsemantic_core::binder::BinderOptions;
use pgsemantic_core::models::{DistanceMetric, SearchConfig};
use pgsemantic_core::SearchError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Tenant key → database. `default` is required.
    pub databases: BTreeMap<String, DatabaseConfig>,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchDefaults,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL; used by the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding the API key, overriding the
    /// provider's default variable name.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: 30,
            api_key_env: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Per-deployment defaults for `similarity_search` requests.
#[derive(Debug, Deserialize, Clone)]
pub struct SearchDefaults {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size_tokens: usize,
    #[serde(default = "default_overlap_ratio")]
    pub overlap_ratio: f64,
    #[serde(default = "default_lambda")]
    pub lambda: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: usize,
    #[serde(default = "default_metric")]
    pub distance_metric: String,
    #[serde(default = "default_title_multiplier")]
    pub title_weight_multiplier: f64,
    #[serde(default = "default_title_threshold")]
    pub title_length_threshold: usize,
    #[serde(default = "default_content_threshold")]
    pub content_length_threshold: usize,
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            chunk_size_tokens: default_chunk_size(),
            overlap_ratio: default_overlap_ratio(),
            lambda: default_lambda(),
            max_output_tokens: default_max_output_tokens(),
            distance_metric: default_metric(),
            title_weight_multiplier: default_title_multiplier(),
            title_length_threshold: default_title_threshold(),
            content_length_threshold: default_content_threshold(),
            sample_rows: default_sample_rows(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_top_n() -> usize {
    10
}
fn default_chunk_size() -> usize {
    100
}
fn default_overlap_ratio() -> f64 {
    0.25
}
fn default_lambda() -> f64 {
    0.6
}
fn default_max_output_tokens() -> usize {
    1000
}
fn default_metric() -> String {
    "cosine".to_string()
}
fn default_title_multiplier() -> f64 {
    2.0
}
fn default_title_threshold() -> usize {
    80
}
fn default_content_threshold() -> usize {
    500
}
fn default_sample_rows() -> usize {
    3
}
fn default_request_timeout() -> u64 {
    60
}

impl SearchDefaults {
    /// Overlap implied by a chunk size: `floor(chunk_size * overlap_ratio)`,
    /// kept strictly below the chunk size.
    pub fn overlap_for(&self, chunk_size_tokens: usize) -> usize {
        let overlap = (chunk_size_tokens as f64 * self.overlap_ratio).floor() as usize;
        overlap.min(chunk_size_tokens.saturating_sub(1))
    }

    /// The default [`SearchConfig`] for a request with no overrides.
    pub fn search_config(&self) -> std::result::Result<SearchConfig, SearchError> {
        Ok(SearchConfig {
            top_n: self.top_n,
            chunk_size_tokens: self.chunk_size_tokens,
            overlap_tokens: self.overlap_for(self.chunk_size_tokens),
            lambda: self.lambda,
            max_output_tokens: self.max_output_tokens,
            distance_metric: self.distance_metric.parse::<DistanceMetric>()?,
        })
    }

    pub fn binder_options(&self) -> BinderOptions {
        BinderOptions {
            title_weight_multiplier: self.title_weight_multiplier,
            title_length_threshold: self.title_length_threshold,
            content_length_threshold: self.content_length_threshold,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate databases
    if !config.databases.contains_key("default") {
        anyhow::bail!("[databases.default] must be configured");
    }
    for (key, db) in &config.databases {
        if db.url.trim().is_empty() {
            anyhow::bail!("databases.{}.url must not be empty", key);
        }
        if db.max_connections == 0 {
            anyhow::bail!("databases.{}.max_connections must be > 0", key);
        }
    }

    // Validate search defaults
    let search = &config.search;
    if search.top_n == 0 {
        anyhow::bail!("search.top_n must be > 0");
    }
    if search.chunk_size_tokens == 0 {
        anyhow::bail!("search.chunk_size_tokens must be > 0");
    }
    if !(0.0..1.0).contains(&search.overlap_ratio) {
        anyhow::bail!("search.overlap_ratio must be in [0.0, 1.0)");
    }
    if !(0.0..=1.0).contains(&search.lambda) {
        anyhow::bail!("search.lambda must be in [0.0, 1.0]");
    }
    if search.max_output_tokens == 0 {
        anyhow::bail!("search.max_output_tokens must be > 0");
    }
    if search.title_weight_multiplier <= 0.0 {
        anyhow::bail!("search.title_weight_multiplier must be > 0");
    }
    if search.content_length_threshold < search.title_length_threshold {
        anyhow::bail!("search.content_length_threshold must be >= search.title_length_threshold");
    }
    if search.request_timeout_secs == 0 {
        anyhow::bail!("search.request_timeout_secs must be > 0");
    }
    search
        .distance_metric
        .parse::<DistanceMetric>()
        .with_context(|| "Invalid search.distance_metric")?;

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "voyage" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, voyage, or ollama.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0 when set");
    }

    Ok(())
}
