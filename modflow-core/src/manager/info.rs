//! Read-only introspection views
//!
//! All of these are plain data copied out under the manager lock; holding one
//! never blocks the runtime.

use crate::factory::FactoryDescriptor;
use crate::flow::{DataFlowId, DataFlowInfo};
use crate::module::{ModuleState, ModuleUrn};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    #[serde(flatten)]
    pub descriptor: FactoryDescriptor,
    pub instances: Vec<ModuleUrn>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleInfo {
    pub urn: ModuleUrn,
    pub provider: ModuleUrn,
    pub state: ModuleState,
    pub capabilities: Vec<&'static str>,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub stopped_at: Option<u64>,
    /// Active flows this module takes part in
    pub flows: Vec<DataFlowId>,
    /// From the module's management contract, if it has one
    pub status: Option<String>,
    pub feature_tags: Vec<String>,
}

/// Everything the management endpoint serves
#[derive(Debug, Clone, Serialize)]
pub struct ManagerSnapshot {
    pub providers: Vec<ProviderInfo>,
    pub modules: Vec<ModuleInfo>,
    pub flows: Vec<DataFlowInfo>,
    pub history: Vec<DataFlowInfo>,
    pub live_couplers: usize,
}

impl ManagerSnapshot {
    pub fn modules_in(&self, state: ModuleState) -> usize {
        self.modules.iter().filter(|m| m.state == state).count()
    }
}
