//! Ollama HTTP client.
//!
//! Endpoints:
//! - `POST {host}/api/generate` for completions (cached)
//! - `POST {host}/api/embeddings` for embeddings (never cached)
//!
//! Blocking calls go through a `ureq` agent, async calls through a `reqwest`
//! client. Both build the same payload, derive the same cache key and share
//! one cache directory, so sync and async call sites are interchangeable.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error};

use haystack_cache::{key_for, CacheKey, ResponseCache};
use haystack_core::{BenchError, BenchResult, GenerateParams, GenerateResponse, LlmClient};

pub const DEFAULT_HOST: &str = "http://localhost:11434";

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Inference server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// Per-request timeout. Large contexts on small machines take minutes.
    pub timeout_secs: u64,
    /// Seconds the server keeps the model loaded after a request.
    pub keep_alive: i64,
    pub embed_model: String,
    /// Context window override sent as `options.num_ctx`.
    pub num_ctx: Option<u32>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            timeout_secs: 600,
            keep_alive: 0,
            embed_model: "nomic-embed-text".into(),
            num_ctx: None,
        }
    }
}

impl ServerConfig {
    /// Host with a scheme and without a trailing slash.
    pub fn base_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{host}")
        }
    }
}

// ---------------------------------------------------------------------------
// Transport errors (never leave this module)
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
enum TransportError {
    #[error("HTTP {0}: {1}")]
    Status(u16, String),

    #[error("request failed: {0}")]
    Network(String),

    #[error("invalid response body: {0}")]
    Decode(String),
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

// ---------------------------------------------------------------------------
// OllamaClient
// ---------------------------------------------------------------------------

pub struct OllamaClient {
    model: String,
    generate_url: String,
    embeddings_url: String,
    embed_model: String,
    keep_alive: i64,
    num_ctx: Option<u32>,
    cache: Option<ResponseCache>,
    agent: ureq::Agent,
    http: reqwest::Client,
}

impl OllamaClient {
    pub fn new(
        model: impl Into<String>,
        config: &ServerConfig,
        cache: Option<ResponseCache>,
    ) -> BenchResult<Self> {
        let base = config.base_url();
        let timeout = Duration::from_secs(config.timeout_secs);
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BenchError::Config(format!("cannot build http client: {e}")))?;

        Ok(Self {
            model: model.into(),
            generate_url: format!("{base}/api/generate"),
            embeddings_url: format!("{base}/api/embeddings"),
            embed_model: config.embed_model.clone(),
            keep_alive: config.keep_alive,
            num_ctx: config.num_ctx,
            cache,
            agent,
            http,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn generate_payload(&self, prompt: &str, params: &GenerateParams) -> Value {
        let mut options = json!({
            "temperature": params.temperature,
            "num_predict": params.max_tokens,
        });
        if let Some(ctx) = self.num_ctx {
            options["num_ctx"] = json!(ctx);
        }
        json!({
            "model": self.model,
            "prompt": prompt,
            "system": params.system,
            "stream": false,
            "keep_alive": self.keep_alive,
            "options": options,
        })
    }

    /// Validated payload plus its cache key (when caching is on).
    fn prepare(&self, prompt: &str, params: &GenerateParams) -> Option<(Value, Option<CacheKey>)> {
        if let Err(e) = params.validate() {
            error!("Ollama generation rejected for {}: {e}", self.model);
            return None;
        }
        let payload = self.generate_payload(prompt, params);
        let key = self.cache.as_ref().map(|_| key_for(&payload));
        Some((payload, key))
    }

    fn cached(&self, key: Option<&CacheKey>) -> Option<GenerateResponse> {
        let (cache, key) = (self.cache.as_ref()?, key?);
        let raw = cache.get(key)?;
        match serde_json::from_value(raw) {
            Ok(resp) => Some(resp),
            Err(e) => {
                debug!("ignoring undecodable cache entry {key}: {e}");
                None
            }
        }
    }

    /// Decode a fresh server response and remember it. Empty envelopes are
    /// never cached.
    fn accept(&self, key: Option<CacheKey>, raw: Value) -> GenerateResponse {
        match serde_json::from_value::<GenerateResponse>(raw.clone()) {
            Ok(resp) if resp.is_empty() => {
                error!("Ollama generation failed for {}: empty response", self.model);
                resp
            }
            Ok(resp) => {
                if let (Some(cache), Some(key)) = (&self.cache, key) {
                    cache.put(&key, &raw);
                }
                resp
            }
            Err(e) => {
                error!("Ollama generation failed for {}: invalid response: {e}", self.model);
                GenerateResponse::default()
            }
        }
    }

    fn post_blocking(&self, url: &str, body: &Value) -> Result<Value, TransportError> {
        let resp = match self.agent.post(url).send_json(body) {
            Ok(r) => r,
            Err(ureq::Error::Status(code, r)) => {
                return Err(TransportError::Status(code, r.into_string().unwrap_or_default()))
            }
            Err(e) => return Err(TransportError::Network(e.to_string())),
        };
        resp.into_json::<Value>()
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn post_async(&self, url: &str, body: &Value) -> Result<Value, TransportError> {
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status(status.as_u16(), text));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn generate_with_stats(&self, prompt: &str, params: &GenerateParams) -> GenerateResponse {
        let Some((payload, key)) = self.prepare(prompt, params) else {
            return GenerateResponse::default();
        };
        if let Some(hit) = self.cached(key.as_ref()) {
            return hit;
        }
        match self.post_blocking(&self.generate_url, &payload) {
            Ok(raw) => self.accept(key, raw),
            Err(e) => {
                error!("Ollama generation failed for {}: {e}", self.model);
                GenerateResponse::default()
            }
        }
    }

    async fn generate_with_stats_async(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> GenerateResponse {
        let Some((payload, key)) = self.prepare(prompt, params) else {
            return GenerateResponse::default();
        };
        if let Some(hit) = self.cached(key.as_ref()) {
            return hit;
        }
        match self.post_async(&self.generate_url, &payload).await {
            Ok(raw) => self.accept(key, raw),
            Err(e) => {
                error!("Ollama generation failed for {}: {e}", self.model);
                GenerateResponse::default()
            }
        }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let payload = json!({
            "model": self.embed_model,
            "prompt": text,
            "keep_alive": self.keep_alive,
        });
        let raw = match self.post_blocking(&self.embeddings_url, &payload) {
            Ok(raw) => raw,
            Err(e) => {
                error!("Ollama embedding failed: {e}");
                return Vec::new();
            }
        };
        match serde_json::from_value::<EmbeddingResponse>(raw) {
            Ok(r) => r.embedding,
            Err(e) => {
                error!("Ollama embedding failed: invalid response: {e}");
                Vec::new()
            }
        }
    }
}
