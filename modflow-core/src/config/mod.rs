pub mod constants;
pub mod types;

pub use constants::*;
pub use types::*;

use anyhow::{Context, Result};
use config::{Config as ConfigLoader, Environment, File};
use std::net::SocketAddr;
use std::path::Path;

impl Config {
    /// Load configuration from file with optional environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_from(Some(path.as_ref()))
    }

    /// Defaults plus `MODFLOW__` environment overrides, no file
    pub fn from_env() -> Result<Self> {
        Self::load_from(None)
    }

    fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigLoader::builder()
            // Start with default values
            .set_default("runtime.coupling", "sync")?
            .set_default("runtime.fault_policy", "continue_on_error")?
            .set_default("runtime.queue_capacity", DEFAULT_ASYNC_QUEUE_CAPACITY as i64)?
            .set_default("runtime.max_flow_history", DEFAULT_MAX_FLOW_HISTORY as i64)?
            .set_default("runtime.append_sink", false)?
            .set_default("metrics.log_level", "info")?
            .set_default("metrics.json_logs", false)?
            .set_default("metrics.enable_server", false)?
            .set_default("metrics.listen_addr", DEFAULT_LISTEN_ADDR)?;

        // Load from TOML file
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            // Override with environment variables (MODFLOW__RUNTIME__COUPLING=async)
            .add_source(Environment::with_prefix("MODFLOW").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        // Deserialize into Config struct
        let cfg: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.runtime.queue_capacity == 0 {
            anyhow::bail!("runtime.queue_capacity must be at least 1");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.metrics.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}', must be one of: {:?}",
                self.metrics.log_level,
                valid_log_levels
            );
        }

        self.metrics
            .listen_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid listen address '{}'", self.metrics.listen_addr))?;

        Ok(())
    }
}
