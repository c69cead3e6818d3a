use super::constants::{DEFAULT_ASYNC_QUEUE_CAPACITY, DEFAULT_LISTEN_ADDR, DEFAULT_MAX_FLOW_HISTORY};
use crate::flow::{CouplingMode, DataFlowOptions, FaultPolicy};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeSettings,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Manager-wide defaults for new data flows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Coupling used when a flow does not ask for one: "sync" or "async"
    #[serde(default)]
    pub coupling: CouplingMode,

    /// "continue_on_error" or "fail_fast"
    #[serde(default)]
    pub fault_policy: FaultPolicy,

    /// Async coupler queue bound
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Finished flows kept for introspection
    #[serde(default = "default_max_flow_history")]
    pub max_flow_history: usize,

    /// Append the system sink to flows by default
    #[serde(default)]
    pub append_sink: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            coupling: CouplingMode::default(),
            fault_policy: FaultPolicy::default(),
            queue_capacity: DEFAULT_ASYNC_QUEUE_CAPACITY,
            max_flow_history: DEFAULT_MAX_FLOW_HISTORY,
            append_sink: false,
        }
    }
}

impl RuntimeSettings {
    /// Flow options derived from these defaults
    pub fn flow_options(&self) -> DataFlowOptions {
        DataFlowOptions {
            coupling: self.coupling,
            fault_policy: self.fault_policy,
            queue_capacity: self.queue_capacity,
            append_sink: self.append_sink,
        }
    }
}

/// Logging and management endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// JSON log lines instead of human-readable output
    #[serde(default)]
    pub json_logs: bool,

    /// Serve /metrics, /modules, /flows and /health
    #[serde(default)]
    pub enable_server: bool,

    /// Address for the management endpoint
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            enable_server: false,
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_queue_capacity() -> usize {
    DEFAULT_ASYNC_QUEUE_CAPACITY
}

fn default_max_flow_history() -> usize {
    DEFAULT_MAX_FLOW_HISTORY
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}
