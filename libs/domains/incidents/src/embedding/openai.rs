use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_optional, env_or_default, env_parse};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Embedding, EmbeddingProvider};
use crate::error::{IncidentError, IncidentResult};

const DEFAULT_BASE_URL: &str = "http://localhost:8081/v1";
const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
const DEFAULT_DIMENSION: &str = "384";
const DEFAULT_TIMEOUT_SECS: &str = "15";

/// Settings for an OpenAI-compatible `/embeddings` endpoint
#[derive(Clone)]
pub struct EmbeddingConfig {
    /// Base URL without the `/embeddings` suffix
    pub base_url: String,
    /// Not needed for self-hosted servers
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: usize,
    pub timeout: Duration,
}

impl EmbeddingConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            dimension,
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl FromEnv for EmbeddingConfig {
    /// - EMBEDDING_BASE_URL: defaults to a local text-embeddings-inference server
    /// - EMBEDDING_API_KEY: optional
    /// - EMBEDDING_MODEL: defaults to all-MiniLM-L6-v2
    /// - EMBEDDING_DIMENSION: defaults to 384
    /// - EMBEDDING_TIMEOUT_SECS: defaults to 15
    fn from_env() -> Result<Self, ConfigError> {
        let dimension: usize = env_parse("EMBEDDING_DIMENSION", DEFAULT_DIMENSION)?;
        if dimension == 0 {
            return Err(ConfigError::InvalidValue {
                key: "EMBEDDING_DIMENSION".to_string(),
                details: "must be greater than zero".to_string(),
            });
        }

        let timeout_secs: u64 = env_parse("EMBEDDING_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "EMBEDDING_TIMEOUT_SECS".to_string(),
                details: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            base_url: env_or_default("EMBEDDING_BASE_URL", DEFAULT_BASE_URL),
            api_key: env_optional("EMBEDDING_API_KEY"),
            model: env_or_default("EMBEDDING_MODEL", DEFAULT_MODEL),
            dimension,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Client for OpenAI's embeddings API and servers that mimic it
/// (text-embeddings-inference, vLLM, Ollama)
pub struct OpenAIEmbeddingProvider {
    client: Client,
    config: EmbeddingConfig,
}

impl OpenAIEmbeddingProvider {
    pub fn new(config: EmbeddingConfig) -> IncidentResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| IncidentError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn transport_error(err: reqwest::Error) -> IncidentError {
    if err.is_timeout() {
        IncidentError::Timeout(format!("embedding request timed out: {}", err))
    } else if err.is_decode() {
        IncidentError::Internal(format!("Malformed embedding response: {}", err))
    } else {
        IncidentError::EmbeddingUnavailable(err.to_string())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    fn model_name(&self) -> String {
        self.config.model.clone()
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed(&self, text: &str) -> IncidentResult<Embedding> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: [text],
        };

        let mut builder = self.client.post(self.config.endpoint()).json(&request);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Embedding provider returned an error");
            return Err(if is_transient(status) {
                IncidentError::EmbeddingUnavailable(format!("provider returned {}", status))
            } else {
                IncidentError::Internal(format!("Embedding provider rejected request ({})", status))
            });
        }

        let mut payload: EmbeddingResponse = response.json().await.map_err(transport_error)?;
        payload.data.sort_by_key(|d| d.index);

        let data = payload.data.into_iter().next().ok_or_else(|| {
            IncidentError::Internal("Embedding provider returned no vectors".to_string())
        })?;

        debug!(model = %self.config.model, dimension = data.embedding.len(), "Embedded text");
        Ok(Embedding::new(data.embedding))
    }
}
