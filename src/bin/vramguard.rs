//! Main binary for the VRAM guard daemon

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing::debug;
use vram_guard::{GuardConfig, NvidiaSmiSampler, OllamaClient, VramGuard};

/// VRAM watchdog for Ollama: unloads models when GPU memory runs high
#[derive(Debug, Parser)]
#[command(name = "vramguard")]
#[command(about = "VRAM watchdog for Ollama: unloads models when GPU memory runs high")]
#[command(version)]
struct Cli {
    /// VRAM usage in MB above which cleanup triggers
    #[arg(long, default_value = "20480")]
    threshold: u64,

    /// Seconds between checks in periodic mode
    #[arg(long, default_value = "5")]
    interval: u64,

    /// Base URL of the model server
    #[arg(long, default_value = "http://localhost:11434")]
    host: String,

    /// Run one immediate unconditional cleanup pass and exit
    #[arg(long)]
    clear_now: bool,

    /// Log intended actions without issuing unload requests
    #[arg(long)]
    dry_run: bool,

    /// Timeout for model server requests in seconds
    #[arg(long, default_value = "5")]
    timeout: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("vram_guard={},vramguard={}", log_level, log_level))
        .with_target(false)
        .init();

    debug!("starting VRAM guard with args: {:?}", cli);

    let config = GuardConfig::default()
        .with_threshold_mb(cli.threshold)
        .with_interval(Duration::from_secs(cli.interval))
        .with_host(cli.host)
        .with_request_timeout(Duration::from_secs(cli.timeout))
        .with_clear_now(cli.clear_now)
        .with_dry_run(cli.dry_run);

    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;

    // The query utility must exist before the loop starts; a missing binary
    // is a fatal startup condition, not a transient sample failure.
    let sampler = NvidiaSmiSampler::new();
    sampler.probe().await?;

    let client = OllamaClient::new(config.host.clone(), config.request_timeout)?;
    let guard = VramGuard::new(config, Box::new(sampler), Box::new(client));

    guard.run().await?;

    Ok(())
}
