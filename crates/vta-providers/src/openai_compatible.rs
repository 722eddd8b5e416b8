//! Unified OpenAI-compatible embedder.
//!
//! A single struct that calls `POST {base_url}/embeddings` on any
//! OpenAI-compatible API. Providers differ only by endpoint URL, auth style,
//! API key and whether they accept the `dimensions` field.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use vta_core::config::EmbeddingConfig;
use vta_core::error::{Result, VtaError};
use vta_core::traits::Embedder;

use crate::provider_registry::{AuthStyle, ProviderConfig};

/// An embedder that works with any OpenAI-compatible API.
pub struct OpenAiCompatibleEmbedder {
    /// Provider name (e.g., "openai", "ollama").
    name: String,
    api_key: String,
    /// Full embeddings URL.
    endpoint: String,
    model: String,
    dimensions: usize,
    sends_dimensions: bool,
    auth_style: AuthStyle,
    /// Retries after the first attempt for 429, 5xx and transport errors.
    max_retries: usize,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiCompatibleEmbedder {
    /// Create from a known provider config + `[embedding]` section.
    ///
    /// Resolution order:
    /// - API key: `config.api_key` > env vars > empty
    /// - Base URL: `config.base_url` > env override > registry default
    /// - Model: `config.model` > registry default
    pub fn from_registry(registry: &ProviderConfig, config: &EmbeddingConfig) -> Result<Self> {
        let api_key = if !config.api_key.is_empty() {
            config.api_key.clone()
        } else {
            registry
                .env_keys
                .iter()
                .find_map(|key| std::env::var(key).ok())
                .unwrap_or_default()
        };
        if registry.auth_style == AuthStyle::Bearer && api_key.is_empty() {
            return Err(VtaError::Configuration(format!(
                "no API key for {}: set embedding.api_key or one of {:?}",
                registry.name, registry.env_keys
            )));
        }

        let base_url = if !config.base_url.is_empty() {
            config.base_url.clone()
        } else {
            registry
                .base_url_env
                .and_then(|env_key| {
                    let val = std::env::var(env_key).ok()?;
                    // OLLAMA_HOST is usually given without the /v1 suffix
                    if val.ends_with("/v1") {
                        Some(val)
                    } else {
                        Some(format!("{}/v1", val.trim_end_matches('/')))
                    }
                })
                .unwrap_or_else(|| registry.base_url.to_string())
        };

        let model = if config.model.is_empty() {
            registry.default_model.to_string()
        } else {
            config.model.clone()
        };

        Self::build(
            registry.name,
            api_key,
            format!("{}{}", base_url.trim_end_matches('/'), registry.embeddings_path),
            model,
            registry.auth_style,
            registry.sends_dimensions,
            config,
        )
    }

    /// Create for a custom endpoint (e.g., "custom:http://10.0.0.5:8000/v1").
    pub fn custom(endpoint: &str, config: &EmbeddingConfig) -> Result<Self> {
        let base_url = endpoint
            .strip_prefix("custom:")
            .unwrap_or(endpoint)
            .trim_end_matches('/')
            .to_string();
        if base_url.is_empty() {
            return Err(VtaError::Configuration("custom provider needs a URL".into()));
        }
        if config.model.is_empty() {
            return Err(VtaError::Configuration("custom provider needs embedding.model".into()));
        }

        let api_key = if !config.api_key.is_empty() {
            config.api_key.clone()
        } else {
            std::env::var("CUSTOM_API_KEY").unwrap_or_default()
        };
        let auth_style = if api_key.is_empty() {
            AuthStyle::None
        } else {
            AuthStyle::Bearer
        };

        Self::build(
            "custom",
            api_key,
            format!("{base_url}/embeddings"),
            config.model.clone(),
            auth_style,
            false,
            config,
        )
    }

    fn build(
        name: &str,
        api_key: String,
        endpoint: String,
        model: String,
        auth_style: AuthStyle,
        sends_dimensions: bool,
        config: &EmbeddingConfig,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| VtaError::Http(format!("failed to build HTTP client: {e}")))?;
        tracing::debug!("Embedding provider {name}: {model} via {endpoint}");
        Ok(Self {
            name: name.to_string(),
            api_key,
            endpoint,
            model,
            dimensions: config.dimensions,
            sends_dimensions,
            auth_style,
            max_retries: config.max_retries,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build the auth header for the request.
    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_style {
            AuthStyle::Bearer if !self.api_key.is_empty() => {
                req.header("Authorization", format!("Bearer {}", self.api_key))
            }
            _ => req,
        }
    }

    async fn request(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.sends_dimensions.then_some(self.dimensions),
        };

        let mut attempt = 0usize;
        loop {
            let req = self
                .client
                .post(&self.endpoint)
                .header("Content-Type", "application/json")
                .json(&body);
            let resp = match self.apply_auth(req).send().await {
                Ok(resp) => resp,
                Err(e) if is_retryable_error(&e) && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!("⚠️ {} connection failed ({e}), retry {attempt}/{}", self.name, self.max_retries);
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    continue;
                }
                Err(e) => {
                    return Err(VtaError::Http(format!(
                        "{} connection failed ({}): {e}",
                        self.name, self.endpoint
                    )));
                }
            };

            let status = resp.status();
            if status.is_success() {
                let parsed: EmbeddingResponse = resp
                    .json()
                    .await
                    .map_err(|e| VtaError::Embedding(format!("{} returned invalid JSON: {e}", self.name)))?;
                return self.unpack(parsed, inputs.len());
            }

            let text = resp.text().await.unwrap_or_default();
            if is_context_length_error(status, &text) {
                return Err(VtaError::InputTooLong(format!("{} ({status}): {text}", self.name)));
            }
            if should_retry(status) && attempt < self.max_retries {
                attempt += 1;
                tracing::warn!("⚠️ {} returned {status}, retry {attempt}/{}", self.name, self.max_retries);
                tokio::time::sleep(retry_backoff(attempt)).await;
                continue;
            }
            return Err(VtaError::Embedding(format!(
                "{} embeddings request failed ({status}): {text}",
                self.name
            )));
        }
    }

    /// Restore input order and check every vector's length.
    fn unpack(&self, mut parsed: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != expected {
            return Err(VtaError::Embedding(format!(
                "{} returned {} embeddings for {expected} inputs",
                self.name,
                parsed.data.len()
            )));
        }
        if let Some(bad) = parsed.data.iter().find(|d| d.embedding.len() != self.dimensions) {
            return Err(VtaError::DimensionMismatch {
                expected: self.dimensions,
                actual: bad.embedding.len(),
            });
        }
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiCompatibleEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(&[text])
            .await?
            .pop()
            .ok_or_else(|| VtaError::Embedding(format!("{} returned no embedding", self.name)))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        self.request(&inputs).await
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body() || err.is_request()
}

/// 400 responses that blame the input length rather than the request.
fn is_context_length_error(status: StatusCode, body: &str) -> bool {
    if status != StatusCode::BAD_REQUEST {
        return false;
    }
    let body = body.to_ascii_lowercase();
    body.contains("maximum context length")
        || body.contains("context_length_exceeded")
        || body.contains("too many tokens")
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}
