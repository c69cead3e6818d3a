//! Prometheus metrics for the module runtime
//!
//! Counters are bumped by the manager as things happen. Gauges describe the
//! current registry and are refreshed from a [`ManagerSnapshot`] right before
//! each scrape.

use crate::manager::ManagerSnapshot;
use crate::module::ModuleState;
use anyhow::{Context, Result};
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use tracing::info;

const NAMESPACE: &str = "modflow";

pub struct RuntimeMetrics {
    registry: Registry,
    /// Live modules by lifecycle state
    pub modules_by_state: IntGaugeVec,
    /// Flows in the manager table
    pub flows_active: IntGauge,
    /// Finished flows kept in history
    pub flow_history: IntGauge,
    /// Couplers allocated across all flows
    pub couplers_live: IntGauge,
    /// Units moved by active flows, by outcome
    pub flow_units: IntGaugeVec,
    pub modules_created_total: IntCounterVec,
    pub module_failures_total: IntCounterVec,
    pub flows_started_total: IntCounter,
    pub flows_finished_total: IntCounterVec,
    pub refresh_total: IntCounterVec,
}

impl RuntimeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let modules_by_state = IntGaugeVec::new(
            Opts::new("modules", "Live modules by lifecycle state").namespace(NAMESPACE),
            &["state"],
        )?;
        registry.register(Box::new(modules_by_state.clone()))?;

        let flows_active = IntGauge::with_opts(
            Opts::new("flows_active", "Data flows in the manager table").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(flows_active.clone()))?;

        let flow_history = IntGauge::with_opts(
            Opts::new("flow_history", "Finished data flows kept in history").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(flow_history.clone()))?;

        let couplers_live = IntGauge::with_opts(
            Opts::new("couplers_live", "Couplers currently allocated").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(couplers_live.clone()))?;

        let flow_units = IntGaugeVec::new(
            Opts::new("flow_units", "Units moved by active data flows").namespace(NAMESPACE),
            &["outcome"],
        )?;
        registry.register(Box::new(flow_units.clone()))?;

        let modules_created_total = IntCounterVec::new(
            Opts::new("modules_created_total", "Modules created").namespace(NAMESPACE),
            &["provider"],
        )?;
        registry.register(Box::new(modules_created_total.clone()))?;

        let module_failures_total = IntCounterVec::new(
            Opts::new("module_failures_total", "Failed module creations").namespace(NAMESPACE),
            &["provider"],
        )?;
        registry.register(Box::new(module_failures_total.clone()))?;

        let flows_started_total = IntCounter::with_opts(
            Opts::new("flows_started_total", "Data flows started").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(flows_started_total.clone()))?;

        let flows_finished_total = IntCounterVec::new(
            Opts::new("flows_finished_total", "Data flows retired, by final state")
                .namespace(NAMESPACE),
            &["state"],
        )?;
        registry.register(Box::new(flows_finished_total.clone()))?;

        let refresh_total = IntCounterVec::new(
            Opts::new("refresh_total", "Refresh attempts by outcome").namespace(NAMESPACE),
            &["outcome"],
        )?;
        registry.register(Box::new(refresh_total.clone()))?;

        info!("Prometheus metrics registry initialized");

        Ok(Self {
            registry,
            modules_by_state,
            flows_active,
            flow_history,
            couplers_live,
            flow_units,
            modules_created_total,
            module_failures_total,
            flows_started_total,
            flows_finished_total,
            refresh_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Refresh gauges from a snapshot
    pub fn observe(&self, snapshot: &ManagerSnapshot) {
        for state in [
            ModuleState::Created,
            ModuleState::Started,
            ModuleState::Stopped,
        ] {
            self.modules_by_state
                .with_label_values(&[state.as_str()])
                .set(snapshot.modules_in(state) as i64);
        }

        self.flows_active.set(snapshot.flows.len() as i64);
        self.flow_history.set(snapshot.history.len() as i64);
        self.couplers_live.set(snapshot.live_couplers as i64);

        let (mut delivered, mut failed, mut discarded) = (0_u64, 0_u64, 0_u64);
        for coupler in snapshot.flows.iter().flat_map(|f| &f.couplers) {
            delivered += coupler.stats.delivered;
            failed += coupler.stats.failed;
            discarded += coupler.stats.discarded;
        }
        self.flow_units
            .with_label_values(&["delivered"])
            .set(delivered as i64);
        self.flow_units.with_label_values(&["failed"]).set(failed as i64);
        self.flow_units
            .with_label_values(&["discarded"])
            .set(discarded as i64);
    }

    /// Prometheus text exposition of everything registered
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("Failed to encode metrics")?;

        String::from_utf8(buffer).context("Invalid UTF-8 in metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registry_creation() {
        let metrics = RuntimeMetrics::new().unwrap();
        metrics.refresh_total.with_label_values(&["vetoed"]).inc();
        metrics.flows_started_total.inc();

        let text = metrics.encode().unwrap();
        assert!(text.contains("modflow_refresh_total{outcome=\"vetoed\"} 1"));
        assert!(text.contains("modflow_flows_started_total 1"));
    }

    #[test]
    fn test_observe_empty_snapshot() {
        let metrics = RuntimeMetrics::new().unwrap();
        let snapshot = ManagerSnapshot {
            providers: Vec::new(),
            modules: Vec::new(),
            flows: Vec::new(),
            history: Vec::new(),
            live_couplers: 0,
        };
        metrics.observe(&snapshot);

        assert_eq!(metrics.flows_active.get(), 0);
        assert_eq!(
            metrics
                .modules_by_state
                .with_label_values(&["started"])
                .get(),
            0
        );
    }
}
