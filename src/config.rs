//! Guard configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default VRAM threshold in megabytes (20 GB)
pub const DEFAULT_THRESHOLD_MB: u64 = 20480;

/// Default polling interval between checks
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Default model server base URL
pub const DEFAULT_HOST: &str = "http://localhost:11434";

/// Default timeout for model server requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Immutable process-wide configuration for the guard.
///
/// Read once at startup and passed into the monitor loop; nothing mutates it
/// for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// VRAM usage in MB above which cleanup triggers
    pub threshold_mb: u64,

    /// Time between checks in periodic mode
    pub interval: Duration,

    /// Base URL of the model server
    pub host: String,

    /// Timeout applied to every model server request
    pub request_timeout: Duration,

    /// Run one unconditional cleanup pass and exit
    pub clear_now: bool,

    /// Log intended actions without issuing unload requests
    pub dry_run: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            threshold_mb: DEFAULT_THRESHOLD_MB,
            interval: DEFAULT_INTERVAL,
            host: DEFAULT_HOST.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            clear_now: false,
            dry_run: false,
        }
    }
}

impl GuardConfig {
    /// Set the VRAM threshold in megabytes
    pub fn with_threshold_mb(mut self, threshold_mb: u64) -> Self {
        self.threshold_mb = threshold_mb;
        self
    }

    /// Set the polling interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the model server base URL
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the model server request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Enable or disable immediate-clear mode
    pub fn with_clear_now(mut self, clear_now: bool) -> Self {
        self.clear_now = clear_now;
        self
    }

    /// Enable or disable dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.threshold_mb == 0 {
            return Err("threshold must be greater than zero".to_string());
        }

        if self.interval.is_zero() {
            return Err("interval must be greater than zero".to_string());
        }

        if self.request_timeout.is_zero() {
            return Err("request timeout must be greater than zero".to_string());
        }

        if !self.host.starts_with("http://") && !self.host.starts_with("https://") {
            return Err(format!("host must be an http(s) URL: {}", self.host));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = GuardConfig::default();
        assert_eq!(config.threshold_mb, 20480);
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.host, "http://localhost:11434");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(!config.clear_now);
        assert!(!config.dry_run);
    }

    #[test]
    fn test_config_builder() {
        let config = GuardConfig::default()
            .with_threshold_mb(8192)
            .with_interval(Duration::from_secs(30))
            .with_host("http://10.0.0.5:11434")
            .with_request_timeout(Duration::from_secs(2))
            .with_clear_now(true)
            .with_dry_run(true);

        assert_eq!(config.threshold_mb, 8192);
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.host, "http://10.0.0.5:11434");
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert!(config.clear_now);
        assert!(config.dry_run);
    }

    #[test]
    fn test_config_validation() {
        let config = GuardConfig::default();
        assert!(config.validate().is_ok());

        let config = GuardConfig::default().with_threshold_mb(0);
        assert!(config.validate().is_err());

        let config = GuardConfig::default().with_interval(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = GuardConfig::default().with_request_timeout(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = GuardConfig::default().with_host("localhost:11434");
        assert!(config.validate().is_err());

        let config = GuardConfig::default().with_host("https://ollama.internal");
        assert!(config.validate().is_ok());
    }
}
