//! Query embedding providers.
//!
//! One [`Embedder`] implementation per provider, selected once by
//! [`create_embedder`] from the `[embedding]` configuration:
//! - **[`DisabledEmbedder`]**: always fails; the default when embeddings are not configured.
//! - **[`OpenAiEmbedder`]**: `POST https://api.openai.com/v1/embeddings`.
//! - **[`VoyageEmbedder`]**: `POST https://api.voyageai.com/v1/embeddings` (OpenAI-shaped response).
//! - **[`OllamaEmbedder`]**: `POST {url}/api/embed` on a local Ollama instance.
//!
//! Each search embeds its query exactly once. There is no retry: an HTTP
//! error, a timeout, or a malformed response fails the request.
//!
//! ```rust,no_run
//! # use pgsemantic::config::EmbeddingConfig;
//! # use pgsemantic::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "disabled");
//! ```

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use pgsemantic_core::embedding::Embedder;

use crate::config::EmbeddingConfig;

const OPENAI_URL: &str = "https://api.openai.com/v1/embeddings";
const VOYAGE_URL: &str = "https://api.voyageai.com/v1/embeddings";
const OLLAMA_URL: &str = "http://localhost:11434";

/// Known output dimensions per provider and model.
fn known_dims(provider: &str, model: &str) -> Option<usize> {
    let dims = match (provider, model) {
        ("openai", "text-embedding-3-small") => 1536,
        ("openai", "text-embedding-3-large") => 3072,
        ("openai", "text-embedding-ada-002") => 1536,
        ("voyage", "voyage-3") => 1024,
        ("voyage", "voyage-3-lite") => 512,
        ("voyage", "voyage-2") => 1024,
        ("voyage", "voyage-2-lite") => 1024,
        ("ollama", "nomic-embed-text") => 768,
        ("ollama", "mxbai-embed-large") => 1024,
        ("ollama", "all-minilm") => 384,
        _ => return None,
    };
    Some(dims)
}

fn default_model(provider: &str) -> &'static str {
    match provider {
        "openai" => "text-embedding-3-small",
        "voyage" => "voyage-3-lite",
        _ => "nomic-embed-text",
    }
}

/// Model name and dimensions from config, falling back to the provider
/// default model and the known-dimensions table.
fn resolve_model(config: &EmbeddingConfig) -> Result<(String, usize)> {
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| default_model(&config.provider).to_string());
    let dims = match config.dims {
        Some(d) => d,
        None => known_dims(&config.provider, &model).ok_or_else(|| {
            anyhow::anyhow!(
                "embedding.dims required for unknown {} model '{}'",
                config.provider,
                model
            )
        })?,
    };
    Ok((model, dims))
}

fn api_key(config: &EmbeddingConfig, default_env: &str) -> Result<String> {
    let var = config.api_key_env.as_deref().unwrap_or(default_env);
    std::env::var(var).with_context(|| format!("{} environment variable not set", var))
}

fn http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// POST a JSON body and return the parsed JSON response, failing on any
/// non-success status.
async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    provider: &str,
) -> Result<serde_json::Value> {
    let mut request = client
        .post(url)
        .header("Content-Type", "application/json")
        .json(body);
    if let Some(key) = bearer {
        request = request.header("Authorization", format!("Bearer {}", key));
    }

    let response = request
        .send()
        .await
        .with_context(|| format!("{} request to {} failed", provider, url))?;
    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("{} API error {}: {}", provider, status, body_text);
    }
    Ok(response.json().await?)
}

fn to_vector(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

/// Parse an OpenAI-shaped response: the first `data[].embedding`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let first = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing data array"))?;
    let embedding = first
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing embedding"))?;
    Ok(to_vector(embedding))
}

/// Parse an Ollama `/api/embed` response: the first `embeddings[]`.
fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let first = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|e| e.first())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;
    let values = first
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: embedding is not an array"))?;
    Ok(to_vector(values))
}

// ============ Disabled ============

/// Embedder used when `embedding.provider = "disabled"`. Every call fails.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dimensions(&self) -> usize {
        0
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("Embedding provider is disabled; set [embedding] provider in the config")
    }
}

// ============ OpenAI ============

/// OpenAI embeddings API. Requires `OPENAI_API_KEY` (or `api_key_env`).
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = resolve_model(config)?;
        Ok(Self {
            model,
            dims,
            url: config.url.clone().unwrap_or_else(|| OPENAI_URL.to_string()),
            api_key: api_key(config, "OPENAI_API_KEY")?,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dimensions(&self) -> usize {
        self.dims
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });
        let json = post_json(&self.client, &self.url, Some(&self.api_key), &body, "OpenAI").await?;
        parse_openai_response(&json)
    }
}

// ============ Voyage ============

/// Voyage AI embeddings API. Requires `VOYAGE_API_KEY` (or `api_key_env`).
pub struct VoyageEmbedder {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl VoyageEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = resolve_model(config)?;
        Ok(Self {
            model,
            dims,
            url: config.url.clone().unwrap_or_else(|| VOYAGE_URL.to_string()),
            api_key: api_key(config, "VOYAGE_API_KEY")?,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl Embedder for VoyageEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dimensions(&self) -> usize {
        self.dims
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
            "input_type": "query",
        });
        let json = post_json(&self.client, &self.url, Some(&self.api_key), &body, "Voyage").await?;
        parse_openai_response(&json)
    }
}

// ============ Ollama ============

/// Local Ollama instance (default `http://localhost:11434`). Requires the
/// model to be pulled (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = resolve_model(config)?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_URL.to_string());
        Ok(Self {
            model,
            dims,
            url: url.trim_end_matches('/').to_string(),
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dimensions(&self) -> usize {
        self.dims
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });
        let url = format!("{}/api/embed", self.url);
        let json = post_json(&self.client, &url, None, &body, "Ollama")
            .await
            .with_context(|| format!("is Ollama running at {}?", self.url))?;
        parse_ollama_response(&json)
    }
}

/// Create the [`Embedder`] named by `config.provider`.
///
/// | Config Value | Embedder |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAiEmbedder`] |
/// | `"voyage"` | [`VoyageEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEmbedder)),
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        "voyage" => Ok(Box::new(VoyageEmbedder::new(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
