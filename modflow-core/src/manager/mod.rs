//! Module manager: registry, flow builder, refresh coordinator
//!
//! One [`ModuleManager`] owns every factory, module instance and data flow of
//! a runtime. It is an ordinary value handed to collaborators (no globals).
//!
//! ## Locking
//! Registry mutations are serialised behind one `parking_lot::Mutex`. Data
//! delivery never takes it. Work that can call back into modules for a long
//! time (starting flows, tearing them down, management status queries) runs
//! after the lock is released.
//!
//! ## Usage
//!
//! ```no_run
//! use modflow_core::factory::FactoryCatalog;
//! use modflow_core::flow::DataFlowOptions;
//! use modflow_core::manager::ModuleManager;
//! use modflow_core::module::{DataRequest, ModuleUrn};
//! use std::sync::Arc;
//!
//! # fn example(catalog: FactoryCatalog) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ModuleManager::builder().source(Arc::new(catalog)).build()?;
//!
//! let source = manager.create_module(&ModuleUrn::parse("copier")?, &[])?;
//! let flow = manager.create_data_flow_with(
//!     &[DataRequest::with_parameter(source, "a,b,c")],
//!     DataFlowOptions::default().with_sink(),
//! )?;
//! manager.stop_data_flow(flow)?;
//! # Ok(())
//! # }
//! ```

pub mod flow_support;
pub mod info;
pub mod refresh;
pub(crate) mod registry;
pub mod sink;

pub use flow_support::DataFlowSupport;
pub use info::{ManagerSnapshot, ModuleInfo, ProviderInfo};
pub use refresh::RefreshListener;
pub use sink::{sink_urn, SinkListener, SinkModule};

use crate::config::RuntimeSettings;
use crate::errors::{ManagementError, ModuleError, ModuleResult};
use crate::factory::{FactoryCatalog, FactorySource, ModuleFactory};
use crate::flow::{
    CouplerTracker, DataFlow, DataFlowId, DataFlowInfo, DataFlowOptions, DataFlowState,
};
use crate::module::{
    parse_flow_requests, split_param_list, DataRequest, Module, ModuleState, ModuleUrn,
    ParamValue,
};
use crate::monitoring::RuntimeMetrics;
use parking_lot::{Mutex, MutexGuard, RwLock};
use registry::{ModuleEntry, Registry};
use sink::SinkListeners;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// Parameters as given by the caller
enum Params<'a> {
    Typed(&'a [ParamValue]),
    /// Comma-separated, converted with the factory's parameter types
    Raw(&'a str),
}

pub struct ModuleManager {
    this: Weak<ModuleManager>,
    registry: Mutex<Registry>,
    sources: Vec<Arc<dyn FactorySource>>,
    refresh_listeners: RwLock<Vec<Arc<dyn RefreshListener>>>,
    sink_listeners: SinkListeners,
    sink_urn: ModuleUrn,
    defaults: DataFlowOptions,
    metrics: Option<Arc<RuntimeMetrics>>,
    tracker: CouplerTracker,
    shut_down: AtomicBool,
}

/// Builder for [`ModuleManager`]
#[derive(Default)]
pub struct ModuleManagerBuilder {
    settings: RuntimeSettings,
    sources: Vec<Arc<dyn FactorySource>>,
    extra: FactoryCatalog,
    refresh_listeners: Vec<Arc<dyn RefreshListener>>,
    sink_listeners: Vec<Arc<dyn SinkListener>>,
    metrics: Option<Arc<RuntimeMetrics>>,
}

impl ModuleManagerBuilder {
    pub fn settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Add a factory source, scanned at init and on every refresh
    pub fn source(mut self, source: Arc<dyn FactorySource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Add one factory
    pub fn factory(mut self, factory: Arc<dyn ModuleFactory>) -> Self {
        self.extra.register(factory);
        self
    }

    pub fn refresh_listener(mut self, listener: Arc<dyn RefreshListener>) -> Self {
        self.refresh_listeners.push(listener);
        self
    }

    pub fn sink_listener(mut self, listener: Arc<dyn SinkListener>) -> Self {
        self.sink_listeners.push(listener);
        self
    }

    pub fn metrics(mut self, metrics: Arc<RuntimeMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register every factory, then auto-instantiate
    ///
    /// Duplicate providers across sources are a configuration error here;
    /// on refresh they are skipped.
    pub fn build(self) -> ModuleResult<Arc<ModuleManager>> {
        let sink_listeners = SinkListeners::default();
        for listener in self.sink_listeners {
            sink_listeners.add(listener);
        }

        let mut sources = self.sources;
        if !self.extra.is_empty() {
            sources.push(Arc::new(self.extra));
        }

        let sink_urn = sink_urn()?;
        let settings = self.settings;
        let refresh_listeners = self.refresh_listeners;
        let metrics = self.metrics;

        // Modules get a weak handle back to the manager for their own flows
        let manager = Arc::new_cyclic(|this| ModuleManager {
            this: this.clone(),
            registry: Mutex::new(Registry::new(settings.max_flow_history)),
            sources,
            refresh_listeners: RwLock::new(refresh_listeners),
            sink_urn,
            sink_listeners,
            defaults: settings.flow_options(),
            metrics,
            tracker: CouplerTracker::new(),
            shut_down: AtomicBool::new(false),
        });

        {
            let mut registry = manager.registry.lock();
            registry.register_factory(sink::sink_factory(manager.sink_listeners.clone())?)?;
            for source in &manager.sources {
                for factory in source.factories() {
                    registry.register_factory(factory)?;
                }
            }

            let providers: Vec<ModuleUrn> = registry.factories.keys().cloned().collect();
            for provider in &providers {
                manager.auto_instantiate(&mut registry, provider);
            }
        }

        info!(
            providers = manager.registry.lock().factories.len(),
            "module manager initialized"
        );
        Ok(manager)
    }
}

impl ModuleManager {
    pub fn builder() -> ModuleManagerBuilder {
        ModuleManagerBuilder::default()
    }

    // ===== MODULE LIFECYCLE =====

    /// Create a module through the factory matching `provider`
    ///
    /// Checks run in order: cardinality, arity, types, then the factory's own
    /// validation. Auto-start factories start the new module before this
    /// returns; if that fails nothing is registered.
    pub fn create_module(&self, provider: &ModuleUrn, params: &[ParamValue]) -> ModuleResult<ModuleUrn> {
        self.ensure_running()?;
        let mut registry = self.registry.lock();
        let factory = registry.resolve_factory(provider)?;
        self.instantiate(&mut registry, &factory, Params::Typed(params))
    }

    /// Console form: `create_module_from_str("echo", "hello")`
    pub fn create_module_from_str(&self, provider: &str, params: &str) -> ModuleResult<ModuleUrn> {
        let provider = ModuleUrn::parse(provider)?;
        self.ensure_running()?;
        let mut registry = self.registry.lock();
        let factory = registry.resolve_factory(&provider)?;
        self.instantiate(&mut registry, &factory, Params::Raw(params))
    }

    /// Remove a `Created` or `Stopped` module that no active flow uses
    pub fn delete_module(&self, urn: &ModuleUrn) -> ModuleResult<()> {
        let mut registry = self.lock_registry();

        let entry = registry.entry(urn)?;
        let state = entry.state.load();
        if !matches!(state, ModuleState::Created | ModuleState::Stopped) {
            return Err(ModuleError::InvalidModuleState {
                urn: urn.clone(),
                operation: "delete",
                state,
            });
        }

        let flows: Vec<DataFlowId> = registry
            .active_flows_using(urn)
            .into_iter()
            .filter(|id| {
                registry
                    .flows
                    .get(id)
                    .map_or(true, |flow| flow.requester() != Some(urn))
            })
            .collect();
        if !flows.is_empty() {
            return Err(ModuleError::ModuleInUse {
                urn: urn.clone(),
                flows,
            });
        }

        entry
            .state
            .transition(ModuleState::Deleted)
            .map_err(|state| ModuleError::InvalidModuleState {
                urn: urn.clone(),
                operation: "delete",
                state,
            })?;
        registry.modules.remove(urn);
        let owned = registry.flows_requested_by(urn);
        drop(registry);

        info!(module = %urn, "module deleted");
        self.cancel_owned(urn, owned);
        Ok(())
    }

    /// Start a module; starting a started module is a no-op
    pub fn start_module(&self, urn: &ModuleUrn) -> ModuleResult<()> {
        self.ensure_running()?;
        let mut registry = self.registry.lock();
        registry.entry_mut(urn)?.start()?;
        Ok(())
    }

    /// Stop a module; flows using it stay up but couplers refuse delivery into it
    ///
    /// Flows the module created through its [`DataFlowSupport`] are cancelled.
    pub fn stop_module(&self, urn: &ModuleUrn) -> ModuleResult<()> {
        let owned = {
            let mut registry = self.registry.lock();
            registry.entry_mut(urn)?.stop()?;
            registry.flows_requested_by(urn)
        };
        self.cancel_owned(urn, owned);
        Ok(())
    }

    // ===== DATA FLOWS =====

    /// Create and start a flow with the manager's default options
    pub fn create_data_flow(&self, requests: &[DataRequest]) -> ModuleResult<DataFlowId> {
        self.create_data_flow_with(requests, self.defaults)
    }

    /// Console form: `copier:list:instance-1;a,b^echo:text:single`
    ///
    /// The system sink is appended when the last module can emit.
    pub fn create_data_flow_from_str(&self, requests: &str) -> ModuleResult<DataFlowId> {
        let requests = parse_flow_requests(requests)?;
        self.create_data_flow_with(&requests, self.defaults.with_sink())
    }

    /// Create and start a flow
    ///
    /// Participants that are not started are started when their factory is
    /// auto-start; otherwise the call fails with `ModuleNotStarted`. Modules
    /// started here are stopped again if the flow cannot start.
    pub fn create_data_flow_with(
        &self,
        requests: &[DataRequest],
        options: DataFlowOptions,
    ) -> ModuleResult<DataFlowId> {
        self.create_flow(requests, options, None)
    }

    /// Shared by manager callers (`requester` is `None`) and modules
    pub(crate) fn create_flow(
        &self,
        requests: &[DataRequest],
        options: DataFlowOptions,
        requester: Option<&ModuleUrn>,
    ) -> ModuleResult<DataFlowId> {
        self.ensure_running()?;
        let Some(last) = requests.last() else {
            return Err(ModuleError::EmptyDataFlow);
        };

        let (flow, auto_started) = {
            let mut registry = self.lock_registry();

            if let Some(requester) = requester {
                let state = registry.entry(requester)?.state.load();
                if state != ModuleState::Started {
                    return Err(ModuleError::ModuleNotStarted {
                        urn: requester.clone(),
                        state,
                    });
                }
            }

            let mut requests = requests.to_vec();
            if options.append_sink
                && last.urn != self.sink_urn
                && registry.entry(&last.urn)?.module.capabilities().emit
            {
                requests.push(DataRequest::new(self.sink_urn.clone()));
            }

            let participants = requests
                .iter()
                .map(|request| {
                    registry
                        .entry(&request.urn)
                        .map(|entry| entry.participant(request.clone()))
                })
                .collect::<ModuleResult<Vec<_>>>()?;
            DataFlow::validate_chain(&participants)?;

            let auto_started = Self::start_participants(&mut registry, &requests)?;

            let id = registry.next_flow_id();
            let created = DataFlow::create_requested(
                id,
                participants,
                options,
                &self.tracker,
                requester.cloned(),
            );
            let flow = match created {
                Ok(flow) => flow,
                Err(e) => {
                    Self::stop_auto_started(&mut registry, &auto_started);
                    return Err(e);
                }
            };
            registry.flows.insert(id, flow.clone());
            (flow, auto_started)
        };

        let id = flow.id();
        if let Err(e) = flow.start() {
            warn!(flow = %id, error = %e, "data flow failed to start");
            flow.cancel();
            let mut registry = self.registry.lock();
            if let Some(state) = registry.retire(id) {
                self.record_finished(state);
            }
            Self::stop_auto_started(&mut registry, &auto_started);
            return Err(e);
        }

        if let Some(metrics) = &self.metrics {
            metrics.flows_started_total.inc();
        }
        Ok(id)
    }

    /// Orderly shutdown of a flow; stopping a finished flow is a no-op
    ///
    /// Module-created flows are refused with `NotFlowOwner`.
    pub fn stop_data_flow(&self, id: DataFlowId) -> ModuleResult<()> {
        self.teardown_flow(id, None, true)
    }

    /// Forced teardown of a flow; cancelling a finished flow is a no-op
    ///
    /// Module-created flows are refused with `NotFlowOwner`.
    pub fn cancel_data_flow(&self, id: DataFlowId) -> ModuleResult<()> {
        self.teardown_flow(id, None, false)
    }

    /// Stop (`orderly`) or cancel a flow on behalf of its creator
    pub(crate) fn teardown_flow(
        &self,
        id: DataFlowId,
        caller: Option<&ModuleUrn>,
        orderly: bool,
    ) -> ModuleResult<()> {
        let Some(flow) = self.active_flow(id)? else {
            return Ok(());
        };
        if flow.requester() != caller {
            return Err(ModuleError::NotFlowOwner {
                id,
                owner: flow.requester().cloned(),
            });
        }

        if orderly {
            flow.stop()?;
        } else {
            flow.cancel();
        }
        self.retire(id);
        Ok(())
    }

    /// Handle to an active flow, e.g. to subscribe to its error channel
    pub fn data_flow(&self, id: DataFlowId) -> ModuleResult<DataFlow> {
        self.lock_registry()
            .flows
            .get(&id)
            .cloned()
            .ok_or(ModuleError::DataFlowNotFound(id))
    }

    pub fn set_max_flow_history(&self, max: usize) {
        self.registry.lock().set_max_flow_history(max);
        debug!(max, "flow history bound changed");
    }

    pub fn max_flow_history(&self) -> usize {
        self.registry.lock().max_flow_history
    }

    pub fn default_flow_options(&self) -> DataFlowOptions {
        self.defaults
    }

    // ===== REFRESH =====

    pub fn add_refresh_listener(&self, listener: Arc<dyn RefreshListener>) {
        self.refresh_listeners.write().push(listener);
    }

    pub fn add_sink_listener(&self, listener: Arc<dyn SinkListener>) {
        self.sink_listeners.add(listener);
    }

    /// Ask every listener, then reload factory sources
    ///
    /// Listeners run in registration order; the first `false` or error
    /// aborts the refresh and nothing is reloaded.
    pub fn refresh(&self) -> bool {
        let listeners = self.refresh_listeners.read().clone();
        for (index, listener) in listeners.iter().enumerate() {
            match listener.refresh() {
                Ok(true) => {}
                Ok(false) => {
                    info!(listener = index, "refresh vetoed");
                    self.record_refresh("vetoed");
                    return false;
                }
                Err(e) => {
                    error!(listener = index, error = %e, "refresh listener failed");
                    self.record_refresh("failed");
                    return false;
                }
            }
        }

        let added = self.reload();
        self.record_refresh("accepted");
        info!(new_providers = added.len(), "refresh complete");
        true
    }

    /// Re-scan factory sources and register factories not seen before
    ///
    /// Existing factories are left untouched. New auto-instantiate factories
    /// get their instance. Returns the newly registered providers.
    pub fn reload(&self) -> Vec<ModuleUrn> {
        if self.is_shut_down() {
            return Vec::new();
        }

        let mut registry = self.registry.lock();
        let mut added = Vec::new();
        for source in &self.sources {
            for factory in source.factories() {
                let provider = factory.descriptor().provider.clone();
                if registry.factories.contains_key(&provider) {
                    continue;
                }
                match registry.register_factory(factory) {
                    Ok(()) => added.push(provider),
                    Err(e) => warn!(provider = %provider, error = %e, "factory skipped on reload"),
                }
            }
        }

        for provider in &added {
            self.auto_instantiate(&mut registry, provider);
        }
        added
    }

    /// Cancel every active flow and stop every started module
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let flows: Vec<DataFlow> = self.registry.lock().flows.values().cloned().collect();
        for flow in &flows {
            flow.cancel();
        }

        let mut registry = self.lock_registry();
        for entry in registry.modules.values_mut() {
            if entry.state.is_started() {
                if let Err(e) = entry.stop() {
                    warn!(module = %entry.urn, error = %e, "module failed to stop during shutdown");
                }
            }
        }

        info!(
            cancelled_flows = flows.len(),
            modules = registry.modules.len(),
            "module manager shut down"
        );
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    // ===== INTROSPECTION =====

    pub fn providers(&self) -> Vec<ModuleUrn> {
        self.registry.lock().factories.keys().cloned().collect()
    }

    pub fn provider_info(&self, provider: &ModuleUrn) -> ModuleResult<ProviderInfo> {
        let registry = self.registry.lock();
        let factory = registry
            .factories
            .get(provider)
            .ok_or_else(|| ModuleError::FactoryNotFound(provider.clone()))?;

        Ok(ProviderInfo {
            descriptor: factory.descriptor().clone(),
            instances: registry.instances_of(provider),
        })
    }

    /// Live instance URNs, optionally filtered by prefix
    pub fn module_instances(&self, prefix: Option<&ModuleUrn>) -> Vec<ModuleUrn> {
        self.registry
            .lock()
            .modules
            .keys()
            .filter(|urn| prefix.map_or(true, |p| urn.matches(p)))
            .cloned()
            .collect()
    }

    pub fn module_info(&self, urn: &ModuleUrn) -> ModuleResult<ModuleInfo> {
        let (module, info) = {
            let registry = self.lock_registry();
            let entry = registry.entry(urn)?;
            (
                Arc::clone(&entry.module),
                Self::describe_module(entry, registry.active_flows_using(urn)),
            )
        };
        Ok(Self::with_management(module.as_ref(), info))
    }

    /// Invoke the module's optional reconnect operation
    pub fn reconnect_module(&self, urn: &ModuleUrn) -> ModuleResult<()> {
        let module = Arc::clone(&self.registry.lock().entry(urn)?.module);
        let managed = module.management().ok_or(ManagementError::Unsupported {
            operation: "reconnect",
        })?;
        managed.reconnect()?;
        info!(module = %urn, "module reconnected");
        Ok(())
    }

    /// Ids of active flows; flows created by modules only when asked for
    pub fn data_flows(&self, include_module_created: bool) -> Vec<DataFlowId> {
        self.lock_registry()
            .flows
            .values()
            .filter(|flow| include_module_created || flow.requester().is_none())
            .map(DataFlow::id)
            .collect()
    }

    /// Active flow, or finished flow still in history
    pub fn data_flow_info(&self, id: DataFlowId) -> ModuleResult<DataFlowInfo> {
        let registry = self.lock_registry();
        if let Some(flow) = registry.flows.get(&id) {
            return Ok(flow.info());
        }
        registry
            .history
            .iter()
            .find(|info| info.id == id)
            .cloned()
            .ok_or(ModuleError::DataFlowNotFound(id))
    }

    /// Finished flows, oldest first
    pub fn data_flow_history(&self) -> Vec<DataFlowInfo> {
        self.lock_registry().history.iter().cloned().collect()
    }

    pub fn live_couplers(&self) -> usize {
        self.tracker.live()
    }

    pub fn sink_urn(&self) -> &ModuleUrn {
        &self.sink_urn
    }

    pub fn snapshot(&self) -> ManagerSnapshot {
        let (providers, modules, flows, history) = {
            let registry = self.lock_registry();
            let providers = registry
                .factories
                .iter()
                .map(|(provider, factory)| ProviderInfo {
                    descriptor: factory.descriptor().clone(),
                    instances: registry.instances_of(provider),
                })
                .collect::<Vec<_>>();
            let modules = registry
                .modules
                .values()
                .map(|entry| {
                    (
                        Arc::clone(&entry.module),
                        Self::describe_module(entry, registry.active_flows_using(&entry.urn)),
                    )
                })
                .collect::<Vec<_>>();
            let flows = registry.flows.values().map(DataFlow::info).collect::<Vec<_>>();
            let history = registry.history.iter().cloned().collect::<Vec<_>>();
            (providers, modules, flows, history)
        };

        ManagerSnapshot {
            providers,
            modules: modules
                .into_iter()
                .map(|(module, info)| Self::with_management(module.as_ref(), info))
                .collect(),
            flows,
            history,
            live_couplers: self.tracker.live(),
        }
    }

    pub fn metrics(&self) -> Option<&Arc<RuntimeMetrics>> {
        self.metrics.as_ref()
    }

    // ===== INTERNALS =====

    fn ensure_running(&self) -> ModuleResult<()> {
        if self.is_shut_down() {
            return Err(ModuleError::ShutDown);
        }
        Ok(())
    }

    /// Lock the registry, retiring flows that finished on their own first
    fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        let mut registry = self.registry.lock();
        for state in registry.retire_finished() {
            self.record_finished(state);
        }
        registry
    }

    fn instantiate(
        &self,
        registry: &mut Registry,
        factory: &Arc<dyn ModuleFactory>,
        params: Params<'_>,
    ) -> ModuleResult<ModuleUrn> {
        let provider = factory.descriptor().provider.clone();
        let result = self.try_instantiate(registry, factory, params);

        match &result {
            Ok(urn) => {
                info!(module = %urn, "module created");
                if let Some(metrics) = &self.metrics {
                    metrics
                        .modules_created_total
                        .with_label_values(&[&provider.to_string()])
                        .inc();
                }
            }
            Err(e) => {
                warn!(provider = %provider, error = %e, "module creation failed");
                if let Some(metrics) = &self.metrics {
                    metrics
                        .module_failures_total
                        .with_label_values(&[&provider.to_string()])
                        .inc();
                }
            }
        }
        result
    }

    fn try_instantiate(
        &self,
        registry: &mut Registry,
        factory: &Arc<dyn ModuleFactory>,
        params: Params<'_>,
    ) -> ModuleResult<ModuleUrn> {
        let descriptor = factory.descriptor();
        let provider = &descriptor.provider;

        registry.check_cardinality(descriptor)?;

        let converted;
        let params = match params {
            Params::Typed(values) => values,
            Params::Raw(raw) => {
                let parts = split_param_list(raw);
                if parts.len() != descriptor.params.len() {
                    return Err(ModuleError::ParameterCount {
                        provider: provider.clone(),
                        expected: descriptor.params.len(),
                        actual: parts.len(),
                    });
                }
                converted = parts
                    .iter()
                    .zip(&descriptor.params)
                    .enumerate()
                    .map(|(index, (raw, expected))| {
                        ParamValue::parse(*expected, raw).map_err(|source| {
                            ModuleError::ParameterConversion {
                                provider: provider.clone(),
                                index,
                                source,
                            }
                        })
                    })
                    .collect::<ModuleResult<Vec<_>>>()?;
                &converted[..]
            }
        };

        if params.len() != descriptor.params.len() {
            return Err(ModuleError::ParameterCount {
                provider: provider.clone(),
                expected: descriptor.params.len(),
                actual: params.len(),
            });
        }
        for (index, (value, expected)) in params.iter().zip(&descriptor.params).enumerate() {
            if value.param_type() != *expected {
                return Err(ModuleError::ParameterType {
                    provider: provider.clone(),
                    index,
                    expected: *expected,
                    actual: value.param_type(),
                });
            }
        }

        let urn = registry.mint_urn(descriptor)?;
        let creation_failed = |cause: String| ModuleError::ModuleCreation {
            provider: provider.clone(),
            cause,
        };

        let module = factory
            .create(&urn, params)
            .map_err(|e| creation_failed(e.cause))?;
        if module.urn() != &urn {
            return Err(creation_failed(format!(
                "module reports URN {} instead of {}",
                module.urn(),
                urn
            )));
        }
        if module.capabilities().is_empty() {
            return Err(creation_failed("no capabilities".to_string()));
        }
        module.set_flow_support(DataFlowSupport::new(self.this.clone(), urn.clone()));

        let mut entry = ModuleEntry::new(urn.clone(), provider.clone(), module);
        if descriptor.auto_start {
            if let Err(e) = entry.start() {
                // Never registered, so nothing else can hold this state cell
                let _ = entry.state.transition(ModuleState::Deleted);
                return Err(e);
            }
        }

        registry.modules.insert(urn.clone(), entry);
        Ok(urn)
    }

    /// Create the instance of an auto-instantiate factory if it has none yet
    fn auto_instantiate(&self, registry: &mut Registry, provider: &ModuleUrn) {
        let Some(factory) = registry.factories.get(provider).cloned() else {
            return;
        };
        let descriptor = factory.descriptor();
        if !descriptor.auto_instantiate {
            return;
        }
        if !descriptor.params.is_empty() {
            warn!(provider = %provider, "auto-instantiate factory needs parameters, skipped");
            return;
        }
        if descriptor.singleton && !registry.instances_of(provider).is_empty() {
            return;
        }

        if let Err(e) = self.instantiate(registry, &factory, Params::Typed(&[])) {
            error!(provider = %provider, error = %e, "auto-instantiation failed");
        }
    }

    /// Start flow participants that are not started yet
    ///
    /// On failure, modules started here are stopped again.
    fn start_participants(
        registry: &mut Registry,
        requests: &[DataRequest],
    ) -> ModuleResult<Vec<ModuleUrn>> {
        let mut started = Vec::new();
        for request in requests {
            let result = {
                let Registry {
                    factories, modules, ..
                } = &mut *registry;
                let entry = modules
                    .get_mut(&request.urn)
                    .ok_or_else(|| ModuleError::ModuleNotFound(request.urn.clone()))?;

                let state = entry.state.load();
                if state == ModuleState::Started {
                    continue;
                }

                let auto_start = factories
                    .get(&entry.provider)
                    .map_or(false, |f| f.descriptor().auto_start);
                if auto_start {
                    entry.start().map(|_| ())
                } else {
                    Err(ModuleError::ModuleNotStarted {
                        urn: request.urn.clone(),
                        state,
                    })
                }
            };

            if let Err(e) = result {
                Self::stop_auto_started(registry, &started);
                return Err(e);
            }
            started.push(request.urn.clone());
        }
        Ok(started)
    }

    fn stop_auto_started(registry: &mut Registry, started: &[ModuleUrn]) {
        for urn in started {
            if !registry.active_flows_using(urn).is_empty() {
                continue;
            }
            if let Ok(entry) = registry.entry_mut(urn) {
                if let Err(e) = entry.stop() {
                    warn!(module = %urn, error = %e, "could not roll back auto-started module");
                }
            }
        }
    }

    /// Active flow for `id`; `None` if it already finished and is in history
    fn active_flow(&self, id: DataFlowId) -> ModuleResult<Option<DataFlow>> {
        let registry = self.registry.lock();
        match registry.flows.get(&id) {
            Some(flow) => Ok(Some(flow.clone())),
            None if registry.in_history(id) => Ok(None),
            None => Err(ModuleError::DataFlowNotFound(id)),
        }
    }

    /// Cancel flows a stopped or deleted module left behind
    fn cancel_owned(&self, owner: &ModuleUrn, flows: Vec<DataFlow>) {
        for flow in flows {
            if flow.cancel() {
                info!(flow = %flow.id(), module = %owner, "module-created data flow cancelled");
            }
            self.retire(flow.id());
        }
    }

    fn retire(&self, id: DataFlowId) {
        if let Some(state) = self.registry.lock().retire(id) {
            self.record_finished(state);
        }
    }

    fn record_finished(&self, state: DataFlowState) {
        if let Some(metrics) = &self.metrics {
            metrics
                .flows_finished_total
                .with_label_values(&[&state.to_string()])
                .inc();
        }
    }

    fn record_refresh(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.refresh_total.with_label_values(&[outcome]).inc();
        }
    }

    fn describe_module(entry: &ModuleEntry, flows: Vec<DataFlowId>) -> ModuleInfo {
        ModuleInfo {
            urn: entry.urn.clone(),
            provider: entry.provider.clone(),
            state: entry.state.load(),
            capabilities: entry.module.capabilities().tags(),
            created_at: entry.created_at,
            started_at: entry.started_at,
            stopped_at: entry.stopped_at,
            flows,
            status: None,
            feature_tags: Vec::new(),
        }
    }

    /// Fill in the management fields; runs outside the registry lock
    fn with_management(module: &dyn Module, mut info: ModuleInfo) -> ModuleInfo {
        if let Some(managed) = module.management() {
            info.status = Some(managed.status());
            info.feature_tags = managed.feature_tags();
        }
        info
    }
}

impl Drop for ModuleManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::FactoryDescriptor;
    use crate::module::ParamType;
    use crate::testing::{urn, ManualSource, RecordingReceiver, TestFactory};

    fn manager() -> Arc<ModuleManager> {
        let source = TestFactory::simple(
            FactoryDescriptor::new(urn("test:source"), "Source").auto_start(),
            ManualSource::new,
        );
        let sink = TestFactory::simple(
            FactoryDescriptor::new(urn("test:recorder"), "Recorder").auto_start(),
            RecordingReceiver::new,
        );
        let typed = TestFactory::simple(
            FactoryDescriptor::new(urn("test:typed"), "Typed")
                .params([ParamType::Int, ParamType::Bool]),
            RecordingReceiver::new,
        );

        ModuleManager::builder()
            .factory(Arc::new(source))
            .factory(Arc::new(sink))
            .factory(Arc::new(typed))
            .build()
            .unwrap()
    }

    #[test]
    fn test_init_registers_system_sink() {
        let manager = manager();
        assert!(manager.providers().contains(&urn("modflow:sink")));

        let info = manager.module_info(manager.sink_urn()).unwrap();
        assert_eq!(info.state, ModuleState::Started);
        assert_eq!(info.capabilities, vec!["receive"]);
        assert_eq!(info.feature_tags, vec!["system", "sink"]);
    }

    #[test]
    fn test_create_module_from_str_converts_params() {
        let manager = manager();

        let created = manager.create_module_from_str("test:typed", "42,true").unwrap();
        assert_eq!(created, urn("test:typed:instance-1"));

        assert!(matches!(
            manager.create_module_from_str("test:typed", "42"),
            Err(ModuleError::ParameterCount { expected: 2, actual: 1, .. })
        ));
        assert!(matches!(
            manager.create_module_from_str("test:typed", "42,maybe"),
            Err(ModuleError::ParameterConversion { index: 1, .. })
        ));
        assert_eq!(manager.module_instances(Some(&urn("test:typed"))).len(), 1);
    }

    #[test]
    fn test_typed_params_are_checked() {
        let manager = manager();
        let err = manager
            .create_module(&urn("test:typed"), &[ParamValue::Int(1), ParamValue::Int(2)])
            .unwrap_err();

        match err {
            ModuleError::ParameterType {
                index,
                expected,
                actual,
                ..
            } => {
                assert_eq!(index, 1);
                assert_eq!(expected, ParamType::Bool);
                assert_eq!(actual, ParamType::Int);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_shutdown_refuses_new_work() {
        let manager = manager();
        manager.shutdown();
        assert!(manager.is_shut_down());
        assert!(matches!(
            manager.create_module(&urn("test:source"), &[]),
            Err(ModuleError::ShutDown)
        ));

        let info = manager.module_info(manager.sink_urn()).unwrap();
        assert_eq!(info.state, ModuleState::Stopped);
    }
}
