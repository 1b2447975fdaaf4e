//! # vram-guard
//!
//! A background watchdog that polls GPU memory usage and instructs a local
//! Ollama-compatible model server to release loaded models when usage crosses
//! a configured threshold.
//!
//! This crate provides:
//! - GPU memory sampling via the `nvidia-smi` utility
//! - A small HTTP client for the model server's `/api/ps` and `/api/generate`
//!   endpoints
//! - A periodic monitor loop with an immediate one-shot cleanup mode
//! - Dry-run support for observing decisions without side effects
//!
//! ## Example
//!
//! ```rust,no_run
//! use vram_guard::{GuardConfig, NvidiaSmiSampler, OllamaClient, VramGuard};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GuardConfig::default()
//!         .with_threshold_mb(16384)
//!         .with_interval(std::time::Duration::from_secs(10));
//!
//!     let sampler = NvidiaSmiSampler::new();
//!     sampler.probe().await?;
//!
//!     let client = OllamaClient::new(config.host.clone(), config.request_timeout)?;
//!     let guard = VramGuard::new(config, Box::new(sampler), Box::new(client));
//!
//!     guard.run().await?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

pub mod config;
pub mod guard;
pub mod ollama;
pub mod sampler;

// Mock implementations for testing
#[cfg(any(feature = "mock", test))]
pub mod mock;

// Re-export main types
pub use config::GuardConfig;
pub use guard::{CleanupReport, VramGuard};
pub use ollama::{ModelHandle, ModelServerClient, OllamaClient};
pub use sampler::{MemorySample, MemorySampler, NvidiaSmiSampler};

/// Result type for guard operations
pub type Result<T> = std::result::Result<T, GuardError>;

/// Errors that can occur while monitoring and unloading
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("memory sensor error: {0}")]
    Sensor(String),

    #[error("model query error: {0}")]
    Query(String),

    #[error("failed to unload model {model}: {reason}")]
    Unload { model: String, reason: String },

    #[error("startup error: {0}")]
    Startup(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GuardError {
    /// Check if this error aborts the process before the loop starts
    pub fn is_fatal(&self) -> bool {
        matches!(self, GuardError::Startup(_) | GuardError::Configuration(_))
    }

    /// Check if this error is recovered locally by the monitor loop
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GuardError::Sensor(_) | GuardError::Query(_) | GuardError::Unload { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_error_properties() {
        let sensor = GuardError::Sensor("nvidia-smi exited with 1".to_string());
        assert!(sensor.is_recoverable());
        assert!(!sensor.is_fatal());

        let startup = GuardError::Startup("nvidia-smi not found".to_string());
        assert!(startup.is_fatal());
        assert!(!startup.is_recoverable());

        let unload = GuardError::Unload {
            model: "llama3".to_string(),
            reason: "server returned 500".to_string(),
        };
        assert!(unload.is_recoverable());
        assert!(!unload.is_fatal());
    }

    #[test]
    fn test_error_display() {
        let error = GuardError::Query("connection refused".to_string());
        assert_eq!(error.to_string(), "model query error: connection refused");

        let error = GuardError::Unload {
            model: "mistral".to_string(),
            reason: "request failed".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "failed to unload model mistral: request failed"
        );
    }
}
