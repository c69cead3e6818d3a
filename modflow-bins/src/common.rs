//! Common utilities for all binaries
//!
//! Shared initialization, CLI parsing, and setup code.

use anyhow::{Context, Result};
use clap::Parser;
use modflow_core::config::Config;
use modflow_core::flow::{CouplingMode, FaultPolicy};
use modflow_core::manager::{ManagerSnapshot, ModuleManager};
use modflow_core::monitoring::RuntimeMetrics;
use modflow_core::utils::init_logger;
use std::path::PathBuf;
use std::sync::Arc;

/// Common CLI arguments for all binaries
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CommonArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (overrides the configuration)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    pub json_logs: bool,

    /// Coupling for new flows: sync or async
    #[arg(long)]
    pub coupling: Option<String>,

    /// Cancel a flow on its first delivery error
    #[arg(long)]
    pub fail_fast: bool,

    /// Serve the management endpoint until Ctrl+C
    #[arg(long)]
    pub serve: bool,

    /// Management endpoint address (overrides the configuration)
    #[arg(long)]
    pub listen: Option<String>,
}

/// Configuration file (or defaults) with CLI overrides applied
pub fn load_config(args: &CommonArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::from_env()?,
    };

    if let Some(level) = &args.log_level {
        config.metrics.log_level = level.clone();
    }
    if args.json_logs {
        config.metrics.json_logs = true;
    }
    if let Some(coupling) = &args.coupling {
        config.runtime.coupling = parse_coupling(coupling)?;
    }
    if args.fail_fast {
        config.runtime.fault_policy = FaultPolicy::FailFast;
    }
    if args.serve {
        config.metrics.enable_server = true;
    }
    if let Some(listen) = &args.listen {
        config.metrics.listen_addr = listen.clone();
    }

    config.validate()?;
    Ok(config)
}

fn parse_coupling(value: &str) -> Result<CouplingMode> {
    match value.to_ascii_lowercase().as_str() {
        "sync" => Ok(CouplingMode::Sync),
        "async" => Ok(CouplingMode::Async),
        other => anyhow::bail!("Invalid coupling '{}', must be sync or async", other),
    }
}

/// Load configuration and initialize logging
pub fn init(args: &CommonArgs) -> Result<Config> {
    let config = load_config(args)?;
    init_logger(&config.metrics.log_level, config.metrics.json_logs)?;
    Ok(config)
}

/// Manager over the sample module catalog, with metrics
pub fn build_manager(config: &Config) -> Result<Arc<ModuleManager>> {
    let metrics = RuntimeMetrics::new().context("Failed to register metrics")?;
    let manager = ModuleManager::builder()
        .settings(config.runtime.clone())
        .source(Arc::new(modflow_modules::catalog()?))
        .metrics(Arc::new(metrics))
        .build()?;
    Ok(manager)
}

/// Print final statistics
pub fn print_stats(snapshot: &ManagerSnapshot) {
    tracing::info!("=== Final Statistics ===");
    tracing::info!("Providers: {}", snapshot.providers.len());
    tracing::info!("Modules: {}", snapshot.modules.len());
    tracing::info!("Active flows: {}", snapshot.flows.len());
    tracing::info!("Finished flows: {}", snapshot.history.len());

    let delivered: u64 = snapshot
        .flows
        .iter()
        .chain(&snapshot.history)
        .flat_map(|flow| &flow.couplers)
        .map(|coupler| coupler.stats.delivered)
        .sum();
    let faults: u64 = snapshot
        .flows
        .iter()
        .chain(&snapshot.history)
        .map(|flow| flow.fault_count)
        .sum();
    tracing::info!("Units delivered: {}", delivered);
    tracing::info!("Faults: {}", faults);
}
