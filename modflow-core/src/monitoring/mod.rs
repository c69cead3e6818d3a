//! Monitoring for the module runtime
//!
//! Prometheus metrics fed by the manager, and a small HTTP server exposing
//! them next to JSON views of modules and flows.

pub mod metrics;
pub mod server;

pub use metrics::RuntimeMetrics;
pub use server::{ManagementServer, ManagementServerConfig};
