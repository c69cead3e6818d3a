//! Registry state guarded by the manager lock

use crate::config::{INSTANCE_PREFIX, SINGLETON_INSTANCE};
use crate::errors::{ModuleError, ModuleResult, UrnError};
use crate::factory::{FactoryDescriptor, ModuleFactory};
use crate::flow::{DataFlow, DataFlowId, DataFlowInfo, DataFlowState, FlowParticipant};
use crate::module::{DataRequest, Module, ModuleState, ModuleStateCell, ModuleUrn};
use crate::utils::now_millis;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::info;

/// One live module instance
pub(crate) struct ModuleEntry {
    pub(crate) urn: ModuleUrn,
    pub(crate) provider: ModuleUrn,
    pub(crate) module: Arc<dyn Module>,
    pub(crate) state: ModuleStateCell,
    pub(crate) created_at: u64,
    pub(crate) started_at: Option<u64>,
    pub(crate) stopped_at: Option<u64>,
}

impl ModuleEntry {
    pub(crate) fn new(urn: ModuleUrn, provider: ModuleUrn, module: Arc<dyn Module>) -> Self {
        Self {
            urn,
            provider,
            module,
            state: ModuleStateCell::new(),
            created_at: now_millis(),
            started_at: None,
            stopped_at: None,
        }
    }

    /// Returns false if already started
    pub(crate) fn start(&mut self) -> ModuleResult<bool> {
        match self.state.load() {
            ModuleState::Started => return Ok(false),
            ModuleState::Created | ModuleState::Stopped => {}
            state => return Err(self.invalid("start", state)),
        }

        self.module
            .on_start()
            .map_err(|source| ModuleError::LifecycleFailed {
                urn: self.urn.clone(),
                source,
            })?;
        self.state
            .transition(ModuleState::Started)
            .map_err(|state| self.invalid("start", state))?;
        self.started_at = Some(now_millis());

        info!(module = %self.urn, "module started");
        Ok(true)
    }

    /// Returns false if already stopped
    pub(crate) fn stop(&mut self) -> ModuleResult<bool> {
        match self.state.load() {
            ModuleState::Stopped => return Ok(false),
            ModuleState::Started => {}
            state => return Err(self.invalid("stop", state)),
        }

        self.module
            .on_stop()
            .map_err(|source| ModuleError::LifecycleFailed {
                urn: self.urn.clone(),
                source,
            })?;
        self.state
            .transition(ModuleState::Stopped)
            .map_err(|state| self.invalid("stop", state))?;
        self.stopped_at = Some(now_millis());

        info!(module = %self.urn, "module stopped");
        Ok(true)
    }

    pub(crate) fn participant(&self, request: DataRequest) -> FlowParticipant {
        FlowParticipant {
            request,
            module: Arc::clone(&self.module),
            state: self.state.clone(),
        }
    }

    fn invalid(&self, operation: &'static str, state: ModuleState) -> ModuleError {
        ModuleError::InvalidModuleState {
            urn: self.urn.clone(),
            operation,
            state,
        }
    }
}

pub(crate) struct Registry {
    pub(crate) factories: BTreeMap<ModuleUrn, Arc<dyn ModuleFactory>>,
    pub(crate) modules: BTreeMap<ModuleUrn, ModuleEntry>,
    pub(crate) flows: BTreeMap<DataFlowId, DataFlow>,
    pub(crate) history: VecDeque<DataFlowInfo>,
    pub(crate) max_flow_history: usize,
    instance_seq: HashMap<ModuleUrn, u64>,
    next_flow: u64,
}

impl Registry {
    pub(crate) fn new(max_flow_history: usize) -> Self {
        Self {
            factories: BTreeMap::new(),
            modules: BTreeMap::new(),
            flows: BTreeMap::new(),
            history: VecDeque::new(),
            max_flow_history,
            instance_seq: HashMap::new(),
            next_flow: 0,
        }
    }

    pub(crate) fn register_factory(&mut self, factory: Arc<dyn ModuleFactory>) -> ModuleResult<()> {
        let provider = factory.descriptor().provider.clone();
        if !provider.is_provider_urn() {
            return Err(UrnError::NotProvider(provider.to_string()).into());
        }
        if self.factories.contains_key(&provider) {
            return Err(ModuleError::DuplicateFactory(provider));
        }

        info!(provider = %provider, label = %factory.descriptor().label, "factory registered");
        self.factories.insert(provider, factory);
        Ok(())
    }

    /// Find the single factory matching a provider prefix
    pub(crate) fn resolve_factory(&self, prefix: &ModuleUrn) -> ModuleResult<Arc<dyn ModuleFactory>> {
        if let Some(factory) = self.factories.get(prefix) {
            return Ok(Arc::clone(factory));
        }

        let mut candidates = self
            .factories
            .iter()
            .filter(|(provider, _)| provider.matches(prefix));

        match (candidates.next(), candidates.next()) {
            (Some((_, factory)), None) => Ok(Arc::clone(factory)),
            (None, _) => Err(ModuleError::FactoryNotFound(prefix.clone())),
            (Some(_), Some(_)) => Err(ModuleError::AmbiguousFactory {
                prefix: prefix.clone(),
                candidates: self
                    .factories
                    .keys()
                    .filter(|provider| provider.matches(prefix))
                    .cloned()
                    .collect(),
            }),
        }
    }

    pub(crate) fn instances_of(&self, provider: &ModuleUrn) -> Vec<ModuleUrn> {
        self.modules
            .values()
            .filter(|entry| &entry.provider == provider)
            .map(|entry| entry.urn.clone())
            .collect()
    }

    pub(crate) fn check_cardinality(&self, descriptor: &FactoryDescriptor) -> ModuleResult<()> {
        if !descriptor.singleton {
            return Ok(());
        }
        match self.instances_of(&descriptor.provider).into_iter().next() {
            Some(existing) => Err(ModuleError::CardinalityViolation {
                provider: descriptor.provider.clone(),
                existing,
            }),
            None => Ok(()),
        }
    }

    /// Next instance URN for a provider; counters only ever grow
    pub(crate) fn mint_urn(&mut self, descriptor: &FactoryDescriptor) -> ModuleResult<ModuleUrn> {
        if descriptor.singleton {
            return Ok(descriptor.provider.with_instance(SINGLETON_INSTANCE)?);
        }

        let seq = self
            .instance_seq
            .entry(descriptor.provider.clone())
            .or_insert(0);
        *seq += 1;
        Ok(descriptor
            .provider
            .with_instance(&format!("{INSTANCE_PREFIX}{seq}"))?)
    }

    pub(crate) fn next_flow_id(&mut self) -> DataFlowId {
        self.next_flow += 1;
        DataFlowId::new(self.next_flow)
    }

    pub(crate) fn entry(&self, urn: &ModuleUrn) -> ModuleResult<&ModuleEntry> {
        self.modules
            .get(urn)
            .ok_or_else(|| ModuleError::ModuleNotFound(urn.clone()))
    }

    pub(crate) fn entry_mut(&mut self, urn: &ModuleUrn) -> ModuleResult<&mut ModuleEntry> {
        self.modules
            .get_mut(urn)
            .ok_or_else(|| ModuleError::ModuleNotFound(urn.clone()))
    }

    /// Non-terminal flows that include `urn`
    pub(crate) fn active_flows_using(&self, urn: &ModuleUrn) -> Vec<DataFlowId> {
        self.flows
            .values()
            .filter(|flow| !flow.state().is_terminal() && flow.involves(urn))
            .map(DataFlow::id)
            .collect()
    }

    /// Non-terminal flows created by module `urn`
    pub(crate) fn flows_requested_by(&self, urn: &ModuleUrn) -> Vec<DataFlow> {
        self.flows
            .values()
            .filter(|flow| !flow.state().is_terminal() && flow.requester() == Some(urn))
            .cloned()
            .collect()
    }

    pub(crate) fn in_history(&self, id: DataFlowId) -> bool {
        self.history.iter().any(|info| info.id == id)
    }

    /// Remove a flow from the table and remember it
    pub(crate) fn retire(&mut self, id: DataFlowId) -> Option<DataFlowState> {
        let flow = self.flows.remove(&id)?;
        let info = flow.info();
        let state = info.state;
        self.push_history(info);
        Some(state)
    }

    /// Retire every flow that finished on its own (fault policy, failed start)
    pub(crate) fn retire_finished(&mut self) -> Vec<DataFlowState> {
        let finished: Vec<DataFlowId> = self
            .flows
            .values()
            .filter(|flow| flow.state().is_terminal())
            .map(DataFlow::id)
            .collect();

        finished.into_iter().filter_map(|id| self.retire(id)).collect()
    }

    pub(crate) fn push_history(&mut self, info: DataFlowInfo) {
        self.history.push_back(info);
        self.prune_history();
    }

    pub(crate) fn set_max_flow_history(&mut self, max: usize) {
        self.max_flow_history = max;
        self.prune_history();
    }

    fn prune_history(&mut self) {
        while self.history.len() > self.max_flow_history {
            self.history.pop_front();
        }
    }
}
