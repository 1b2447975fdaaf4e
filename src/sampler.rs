//! GPU memory sampling via nvidia-smi

use crate::{GuardError, Result};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use tokio::process::Command;
use tracing::{debug, warn};

/// Query arguments passed to nvidia-smi. One CSV line per GPU, no header,
/// values in plain megabytes.
const QUERY_ARGS: &[&str] = &[
    "--query-gpu=memory.used,memory.total",
    "--format=csv,noheader,nounits",
];

/// A single point-in-time reading of GPU memory usage.
///
/// Values are summed across all GPUs the query utility reports. Samples are
/// recomputed every cycle and never retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySample {
    /// Used VRAM in megabytes
    pub used_mb: u64,

    /// Total VRAM in megabytes, when every GPU reported it
    pub total_mb: Option<u64>,
}

impl MemorySample {
    /// Check whether this sample crosses the threshold (strictly above)
    pub fn exceeds(&self, threshold_mb: u64) -> bool {
        self.used_mb > threshold_mb
    }

    /// Used memory as a fraction of total, when total is known
    pub fn utilization(&self) -> Option<f64> {
        match self.total_mb {
            Some(total) if total > 0 => Some(self.used_mb as f64 / total as f64),
            _ => None,
        }
    }
}

/// Trait defining the interface for memory samplers
#[async_trait]
pub trait MemorySampler: Send + Sync {
    /// Take one memory reading
    async fn sample(&self) -> Result<MemorySample>;
}

/// Memory sampler backed by the `nvidia-smi` utility
pub struct NvidiaSmiSampler {
    binary: String,
}

impl NvidiaSmiSampler {
    /// Create a sampler that invokes `nvidia-smi` from PATH
    pub fn new() -> Self {
        Self {
            binary: "nvidia-smi".to_string(),
        }
    }

    /// Override the query binary path
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Verify at startup that the query utility can be executed at all.
    ///
    /// A spawn failure is fatal: without the utility there is nothing to
    /// monitor. A run that spawns but exits non-zero is a transient driver
    /// condition and only logged.
    pub async fn probe(&self) -> Result<()> {
        match Command::new(&self.binary).args(QUERY_ARGS).output().await {
            Ok(output) => {
                if !output.status.success() {
                    warn!(
                        "{} probe exited with {} (continuing, treated as transient)",
                        self.binary, output.status
                    );
                }
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(GuardError::Startup(format!(
                "{} not found in PATH; cannot monitor GPU memory",
                self.binary
            ))),
            Err(e) => Err(GuardError::Startup(format!(
                "failed to execute {}: {}",
                self.binary, e
            ))),
        }
    }
}

impl Default for NvidiaSmiSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemorySampler for NvidiaSmiSampler {
    async fn sample(&self) -> Result<MemorySample> {
        let output = Command::new(&self.binary)
            .args(QUERY_ARGS)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    GuardError::Sensor(format!("{} not found in PATH", self.binary))
                }
                _ => GuardError::Sensor(format!("failed to execute {}: {}", self.binary, e)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GuardError::Sensor(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        let sample = parse_query_output(&String::from_utf8_lossy(&output.stdout))?;
        debug!(
            "sampled {} MB used across GPUs (total: {:?} MB)",
            sample.used_mb, sample.total_mb
        );
        Ok(sample)
    }
}

/// Parse `memory.used,memory.total` CSV output, one line per GPU.
///
/// Used values are summed across GPUs. Totals are summed too, but dropped to
/// `None` if any line is missing or unparsable, so a partial total never
/// masquerades as the real capacity.
fn parse_query_output(stdout: &str) -> Result<MemorySample> {
    let mut used_mb = 0u64;
    let mut total_mb = 0u64;
    let mut total_known = true;
    let mut gpus = 0u32;

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split(',');

        let used_field = fields
            .next()
            .ok_or_else(|| GuardError::Sensor(format!("malformed query line: {:?}", line)))?;
        let used: f64 = used_field.trim().parse().map_err(|_| {
            GuardError::Sensor(format!("unparsable memory.used value: {:?}", used_field.trim()))
        })?;
        used_mb += used.round() as u64;
        gpus += 1;

        match fields.next() {
            Some(total_field) => match total_field.trim().parse::<f64>() {
                Ok(total) => total_mb += total.round() as u64,
                Err(_) => total_known = false,
            },
            None => total_known = false,
        }
    }

    if gpus == 0 {
        return Err(GuardError::Sensor(
            "query utility produced no GPU readings".to_string(),
        ));
    }

    Ok(MemorySample {
        used_mb,
        total_mb: total_known.then_some(total_mb),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_gpu() {
        let sample = parse_query_output("1234, 24576\n").unwrap();
        assert_eq!(sample.used_mb, 1234);
        assert_eq!(sample.total_mb, Some(24576));
    }

    #[test]
    fn test_parse_multi_gpu_sums() {
        let sample = parse_query_output("1000, 24576\n2500, 24576\n").unwrap();
        assert_eq!(sample.used_mb, 3500);
        assert_eq!(sample.total_mb, Some(49152));
    }

    #[test]
    fn test_parse_missing_total() {
        let sample = parse_query_output("1024\n").unwrap();
        assert_eq!(sample.used_mb, 1024);
        assert_eq!(sample.total_mb, None);

        // A single bad total drops the aggregate
        let sample = parse_query_output("1000, 24576\n2000, [N/A]\n").unwrap();
        assert_eq!(sample.used_mb, 3000);
        assert_eq!(sample.total_mb, None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_query_output("not a number, 24576\n").is_err());
        assert!(parse_query_output("").is_err());
        assert!(parse_query_output("\n  \n").is_err());
    }

    #[test]
    fn test_sample_exceeds() {
        let sample = MemorySample {
            used_mb: 2000,
            total_mb: None,
        };
        assert!(sample.exceeds(1000));
        assert!(!sample.exceeds(2000)); // strictly above
        assert!(!sample.exceeds(3000));
    }

    #[test]
    fn test_sample_utilization() {
        let sample = MemorySample {
            used_mb: 6144,
            total_mb: Some(24576),
        };
        assert_eq!(sample.utilization(), Some(0.25));

        let sample = MemorySample {
            used_mb: 6144,
            total_mb: None,
        };
        assert_eq!(sample.utilization(), None);
    }

    #[tokio::test]
    async fn test_sample_missing_binary() {
        let sampler = NvidiaSmiSampler::new().with_binary("definitely-not-nvidia-smi-xyz");
        let result = sampler.sample().await;
        assert!(matches!(result.unwrap_err(), GuardError::Sensor(_)));
    }

    #[tokio::test]
    async fn test_probe_missing_binary_is_fatal() {
        let sampler = NvidiaSmiSampler::new().with_binary("definitely-not-nvidia-smi-xyz");
        let result = sampler.probe().await;
        let error = result.unwrap_err();
        assert!(matches!(error, GuardError::Startup(_)));
        assert!(error.is_fatal());
    }
}
