//! Built-in system sink
//!
//! A singleton receiver (`modflow:sink:single`) that flows can end in when
//! their last module only emits. Every unit it receives is shown to the
//! [`SinkListener`]s registered on the manager.

use crate::config::{SINGLETON_INSTANCE, SINK_PROVIDER, SINK_TYPE};
use crate::errors::{ReceiveError, UrnError};
use crate::factory::{FactoryDescriptor, FnFactory, ModuleFactory};
use crate::flow::DataFlowId;
use crate::module::{Data, DataReceiver, ManagedModule, Module, ModuleUrn};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Observes data arriving at the system sink
pub trait SinkListener: Send + Sync {
    fn on_data(&self, flow_id: &DataFlowId, data: &Data);
}

impl<F> SinkListener for F
where
    F: Fn(&DataFlowId, &Data) + Send + Sync,
{
    fn on_data(&self, flow_id: &DataFlowId, data: &Data) {
        self(flow_id, data)
    }
}

#[derive(Clone, Default)]
pub(crate) struct SinkListeners {
    listeners: Arc<RwLock<Vec<Arc<dyn SinkListener>>>>,
}

impl SinkListeners {
    pub(crate) fn add(&self, listener: Arc<dyn SinkListener>) {
        self.listeners.write().push(listener);
    }

    fn notify(&self, flow_id: &DataFlowId, data: &Data) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_data(flow_id, data);
        }
    }
}

pub struct SinkModule {
    urn: ModuleUrn,
    listeners: SinkListeners,
    received: AtomicU64,
}

impl SinkModule {
    pub(crate) fn new(urn: ModuleUrn, listeners: SinkListeners) -> Self {
        Self {
            urn,
            listeners,
            received: AtomicU64::new(0),
        }
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl Module for SinkModule {
    fn urn(&self) -> &ModuleUrn {
        &self.urn
    }

    fn as_receiver(&self) -> Option<&dyn DataReceiver> {
        Some(self)
    }

    fn management(&self) -> Option<&dyn ManagedModule> {
        Some(self)
    }
}

impl DataReceiver for SinkModule {
    fn receive(&self, flow_id: &DataFlowId, data: Data) -> Result<(), ReceiveError> {
        self.received.fetch_add(1, Ordering::Relaxed);
        self.listeners.notify(flow_id, &data);
        Ok(())
    }
}

impl ManagedModule for SinkModule {
    fn status(&self) -> String {
        format!("received {} unit(s)", self.received())
    }

    fn feature_tags(&self) -> Vec<String> {
        vec!["system".to_string(), "sink".to_string()]
    }
}

pub(crate) fn sink_provider() -> Result<ModuleUrn, UrnError> {
    ModuleUrn::provider(SINK_PROVIDER, SINK_TYPE)
}

/// URN of the one system sink instance
pub fn sink_urn() -> Result<ModuleUrn, UrnError> {
    sink_provider()?.with_instance(SINGLETON_INSTANCE)
}

pub(crate) fn sink_factory(listeners: SinkListeners) -> Result<Arc<dyn ModuleFactory>, UrnError> {
    let descriptor = FactoryDescriptor::new(sink_provider()?, "System sink")
        .singleton()
        .auto_instantiate()
        .auto_start();

    Ok(Arc::new(FnFactory::new(descriptor, move |urn, _params| {
        Ok(Arc::new(SinkModule::new(urn.clone(), listeners.clone())) as Arc<dyn Module>)
    })))
}
