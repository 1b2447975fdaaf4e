//! HTTP client for the Ollama model server API

use crate::{GuardError, Result};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// A model currently loaded in the server's memory.
///
/// Exists only for the duration of one cleanup pass; the list is re-fetched
/// every time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelHandle {
    /// Model name as reported by the server
    pub name: String,
}

impl ModelHandle {
    /// Create a handle for a named model
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Trait defining the interface to the model server
#[async_trait]
pub trait ModelServerClient: Send + Sync {
    /// List models currently loaded in memory
    async fn list_models(&self) -> Result<Vec<ModelHandle>>;

    /// Instruct the server to evict a model immediately
    async fn unload(&self, model: &str) -> Result<()>;
}

/// `GET /api/ps` response body
#[derive(Debug, Deserialize)]
struct PsResponse {
    #[serde(default)]
    models: Vec<PsModel>,
}

/// One entry in the `/api/ps` model list
#[derive(Debug, Deserialize)]
struct PsModel {
    name: String,
}

/// `POST /api/generate` body requesting immediate eviction.
///
/// A generate call with `keep_alive: 0` and no prompt makes the server drop
/// the model's memory-resident state instead of keeping it warm.
#[derive(Debug, Serialize)]
struct UnloadRequest<'a> {
    model: &'a str,
    keep_alive: u32,
}

/// Client for an Ollama-compatible model server
pub struct OllamaClient {
    base_url: String,
    client: Client,
}

impl OllamaClient {
    /// Create a new client for the given base URL
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GuardError::Configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Get the server base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ModelServerClient for OllamaClient {
    async fn list_models(&self) -> Result<Vec<ModelHandle>> {
        let url = format!("{}/api/ps", self.base_url);

        debug!("fetching loaded models from {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            GuardError::Query(format!(
                "failed to reach model server at {}: {}",
                self.base_url, e
            ))
        })?;

        if !response.status().is_success() {
            return Err(GuardError::Query(format!(
                "model list request failed: {}",
                response.status()
            )));
        }

        let ps: PsResponse = response
            .json()
            .await
            .map_err(|e| GuardError::Query(format!("invalid model list response: {}", e)))?;

        let models: Vec<ModelHandle> = ps
            .models
            .into_iter()
            .map(|m| ModelHandle::new(m.name))
            .collect();

        debug!("server reports {} loaded models", models.len());
        Ok(models)
    }

    async fn unload(&self, model: &str) -> Result<()> {
        let url = format!("{}/api/generate", self.base_url);
        let request = UnloadRequest {
            model,
            keep_alive: 0,
        };

        debug!("requesting unload of {} via {}", model, url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| GuardError::Unload {
                model: model.to_string(),
                reason: format!("request failed: {}", e),
            })?;

        // Fire-and-forget: only the status matters, the body is ignored
        if !response.status().is_success() {
            return Err(GuardError::Unload {
                model: model.to_string(),
                reason: format!("server returned {}", response.status()),
            });
        }

        Ok(())
    }
}
