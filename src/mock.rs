//! Mock sampler and model server for testing

use crate::ollama::{ModelHandle, ModelServerClient};
use crate::sampler::{MemorySample, MemorySampler};
use crate::{GuardError, Result};

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Memory sampler returning deterministic values instead of invoking a real
/// subprocess.
#[derive(Clone)]
pub struct MockSampler {
    queue: Arc<Mutex<VecDeque<MemorySample>>>,
    fallback: Option<MemorySample>,
}

impl MockSampler {
    /// A sampler that returns the same reading on every call
    pub fn constant(sample: MemorySample) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Some(sample),
        }
    }

    /// A sampler that yields the given readings in order, then fails
    pub fn with_samples(samples: Vec<MemorySample>) -> Self {
        Self {
            queue: Arc::new(Mutex::new(samples.into())),
            fallback: None,
        }
    }

    /// A sampler whose every reading fails with a sensor error
    pub fn failing() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            fallback: None,
        }
    }
}

#[async_trait]
impl MemorySampler for MockSampler {
    async fn sample(&self) -> Result<MemorySample> {
        let mut queue = self.queue.lock().await;
        if let Some(sample) = queue.pop_front() {
            return Ok(sample);
        }
        self.fallback
            .ok_or_else(|| GuardError::Sensor("mock sampler has no reading".to_string()))
    }
}

/// In-memory stand-in for a model server.
///
/// Records every unload attempt so tests can assert exactly which requests
/// the guard issued. Clones share state, letting a test keep a view of a
/// server it has handed to the guard.
#[derive(Clone)]
pub struct MockModelServer {
    models: Arc<RwLock<Vec<ModelHandle>>>,
    attempts: Arc<Mutex<Vec<String>>>,
    failing_models: Arc<RwLock<HashSet<String>>>,
    list_fails: Arc<RwLock<bool>>,
}

impl MockModelServer {
    /// Create a server reporting the given models as loaded
    pub fn with_models(names: &[&str]) -> Self {
        let models = names.iter().map(|n| ModelHandle::new(*n)).collect();
        Self {
            models: Arc::new(RwLock::new(models)),
            attempts: Arc::new(Mutex::new(Vec::new())),
            failing_models: Arc::new(RwLock::new(HashSet::new())),
            list_fails: Arc::new(RwLock::new(false)),
        }
    }

    /// Make unload requests for the named model fail
    pub async fn fail_unload_of(&self, name: &str) {
        self.failing_models.write().await.insert(name.to_string());
    }

    /// Make every model list request fail
    pub async fn fail_list(&self) {
        *self.list_fails.write().await = true;
    }

    /// Every unload request the server received, in order
    pub async fn unload_attempts(&self) -> Vec<String> {
        self.attempts.lock().await.clone()
    }

    /// Models still reported as loaded
    pub async fn loaded_models(&self) -> Vec<ModelHandle> {
        self.models.read().await.clone()
    }
}

#[async_trait]
impl ModelServerClient for MockModelServer {
    async fn list_models(&self) -> Result<Vec<ModelHandle>> {
        if *self.list_fails.read().await {
            return Err(GuardError::Query("mock model list failure".to_string()));
        }
        let models = self.models.read().await.clone();
        debug!("mock server reports {} loaded models", models.len());
        Ok(models)
    }

    async fn unload(&self, model: &str) -> Result<()> {
        self.attempts.lock().await.push(model.to_string());

        if self.failing_models.read().await.contains(model) {
            return Err(GuardError::Unload {
                model: model.to_string(),
                reason: "mock unload failure".to_string(),
            });
        }

        self.models.write().await.retain(|m| m.name != model);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_sampler_queue_then_exhausted() {
        let sampler = MockSampler::with_samples(vec![
            MemorySample {
                used_mb: 100,
                total_mb: None,
            },
            MemorySample {
                used_mb: 200,
                total_mb: None,
            },
        ]);

        assert_eq!(sampler.sample().await.unwrap().used_mb, 100);
        assert_eq!(sampler.sample().await.unwrap().used_mb, 200);
        assert!(matches!(
            sampler.sample().await.unwrap_err(),
            GuardError::Sensor(_)
        ));
    }

    #[tokio::test]
    async fn test_mock_sampler_constant() {
        let sampler = MockSampler::constant(MemorySample {
            used_mb: 512,
            total_mb: Some(1024),
        });
        assert_eq!(sampler.sample().await.unwrap().used_mb, 512);
        assert_eq!(sampler.sample().await.unwrap().used_mb, 512);
    }

    #[tokio::test]
    async fn test_mock_server_unload_removes_model() {
        let server = MockModelServer::with_models(&["llama3", "mistral"]);
        server.unload("llama3").await.unwrap();

        let remaining = server.loaded_models().await;
        assert_eq!(remaining, vec![ModelHandle::new("mistral")]);
        assert_eq!(server.unload_attempts().await, vec!["llama3"]);
    }

    #[tokio::test]
    async fn test_mock_server_failure_injection() {
        let server = MockModelServer::with_models(&["llama3"]);
        server.fail_unload_of("llama3").await;

        assert!(server.unload("llama3").await.is_err());
        // The attempt was still recorded and the model stays loaded
        assert_eq!(server.unload_attempts().await, vec!["llama3"]);
        assert_eq!(server.loaded_models().await.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_server_clones_share_state() {
        let server = MockModelServer::with_models(&["llama3"]);
        let view = server.clone();

        server.unload("llama3").await.unwrap();
        assert_eq!(view.unload_attempts().await, vec!["llama3"]);
        assert!(view.loaded_models().await.is_empty());
    }
}
