//! The monitor loop: sense, decide, act

use crate::config::GuardConfig;
use crate::ollama::ModelServerClient;
use crate::sampler::MemorySampler;
use crate::Result;

use tokio::signal;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Outcome of one cleanup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Models successfully unloaded
    pub unloaded: usize,

    /// Unload requests that failed
    pub failed: usize,

    /// Actions logged but not taken (dry-run)
    pub simulated: usize,
}

/// The VRAM watchdog.
///
/// Owns the process lifetime: samples memory, compares against the threshold,
/// and drives cleanup passes against the model server. Holds no state across
/// cycles beyond the immutable configuration.
pub struct VramGuard {
    config: GuardConfig,
    sampler: Box<dyn MemorySampler>,
    server: Box<dyn ModelServerClient>,
}

impl VramGuard {
    /// Create a new guard from a configuration and its two capabilities
    pub fn new(
        config: GuardConfig,
        sampler: Box<dyn MemorySampler>,
        server: Box<dyn ModelServerClient>,
    ) -> Self {
        Self {
            config,
            sampler,
            server,
        }
    }

    /// Get the guard configuration
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Run the guard until a termination signal is received.
    ///
    /// In immediate-clear mode this performs exactly one unconditional cleanup
    /// pass and returns. Otherwise it checks every `interval`; a slow cycle
    /// simply delays the next tick, there is no catch-up scheduling.
    pub async fn run(&self) -> Result<()> {
        info!("VRAM guard active");
        info!("  threshold: {} MB", self.config.threshold_mb);
        info!("  interval:  {:?}", self.config.interval);
        info!("  server:    {}", self.config.host);
        if self.config.dry_run {
            info!("  dry-run:   enabled (no unload requests will be sent)");
        }

        if self.config.clear_now {
            info!("immediate cleanup requested, skipping threshold check");
            let report = self.cleanup_pass().await;
            info!(
                "cleanup finished: {} unloaded, {} failed, {} simulated",
                report.unloaded, report.failed, report.simulated
            );
            return Ok(());
        }

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("received interrupt, stopping VRAM guard");
                    break;
                }
                _ = ticker.tick() => {
                    self.check_once().await;
                }
            }
        }

        Ok(())
    }

    /// Run one sense-decide-act cycle.
    ///
    /// Returns `Some` with the cleanup outcome when the threshold was
    /// crossed, `None` when no action was taken. Sampler failures are logged
    /// and skipped; the loop must survive transient driver hiccups.
    pub async fn check_once(&self) -> Option<CleanupReport> {
        let sample = match self.sampler.sample().await {
            Ok(sample) => sample,
            Err(e) => {
                warn!("memory sample failed, retrying next interval: {}", e);
                return None;
            }
        };

        if !sample.exceeds(self.config.threshold_mb) {
            debug!(
                "VRAM OK: {} MB used (threshold {} MB)",
                sample.used_mb, self.config.threshold_mb
            );
            return None;
        }

        match sample.total_mb {
            Some(total) => warn!(
                "high VRAM detected: {} MB of {} MB used (threshold {} MB)",
                sample.used_mb, total, self.config.threshold_mb
            ),
            None => warn!(
                "high VRAM detected: {} MB used (threshold {} MB)",
                sample.used_mb, self.config.threshold_mb
            ),
        }

        Some(self.cleanup_pass().await)
    }

    /// Query loaded models and unload each of them.
    ///
    /// A failed model list is treated as an empty list. One failed unload
    /// does not abort the rest of the batch. In dry-run mode every action is
    /// logged as simulated and no request is issued.
    pub async fn cleanup_pass(&self) -> CleanupReport {
        let models = match self.server.list_models().await {
            Ok(models) => models,
            Err(e) => {
                warn!("could not query loaded models, skipping cleanup: {}", e);
                Vec::new()
            }
        };

        let mut report = CleanupReport::default();

        if models.is_empty() {
            info!("no models loaded; VRAM usage is from other applications");
            return report;
        }

        info!("found {} loaded models, starting cleanup", models.len());

        for handle in &models {
            if self.config.dry_run {
                info!("dry run: would unload {}", handle);
                report.simulated += 1;
                continue;
            }

            match self.server.unload(&handle.name).await {
                Ok(()) => {
                    info!("unloaded model {}", handle);
                    report.unloaded += 1;
                }
                Err(e) => {
                    warn!("{}", e);
                    report.failed += 1;
                }
            }
        }

        report
    }
}
