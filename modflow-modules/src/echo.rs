//! Prefixes strings on their way through a flow
//!
//! `echo:text` is a singleton taking one `Str` parameter, the prefix. It sits
//! in the middle of a flow: `String` units come out as `"{prefix}{value}"`,
//! anything else passes through untouched.

use dashmap::DashMap;
use modflow_core::errors::{DataRequestError, ModuleCreationError, ReceiveError, UrnError};
use modflow_core::factory::{FactoryDescriptor, FnFactory, ModuleFactory};
use modflow_core::flow::{DataEmitterSupport, DataFlowId};
use modflow_core::module::{
    Data, DataEmitter, DataReceiver, DataRequest, ManagedModule, Module, ModuleUrn, ParamType,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const PROVIDER: &str = "echo:text";

pub struct EchoModule {
    urn: ModuleUrn,
    prefix: String,
    downstream: DashMap<DataFlowId, DataEmitterSupport>,
    echoed: AtomicU64,
}

impl EchoModule {
    pub fn new(urn: ModuleUrn, prefix: impl Into<String>) -> Self {
        Self {
            urn,
            prefix: prefix.into(),
            downstream: DashMap::new(),
            echoed: AtomicU64::new(0),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn echoed(&self) -> u64 {
        self.echoed.load(Ordering::Relaxed)
    }
}

impl Module for EchoModule {
    fn urn(&self) -> &ModuleUrn {
        &self.urn
    }

    fn as_emitter(&self) -> Option<&dyn DataEmitter> {
        Some(self)
    }

    fn as_receiver(&self) -> Option<&dyn DataReceiver> {
        Some(self)
    }

    fn management(&self) -> Option<&dyn ManagedModule> {
        Some(self)
    }
}

impl DataEmitter for EchoModule {
    fn request_data(
        &self,
        _request: &DataRequest,
        support: DataEmitterSupport,
    ) -> Result<(), DataRequestError> {
        self.downstream.insert(support.flow_id(), support);
        Ok(())
    }

    fn cancel_request(&self, flow_id: &DataFlowId) {
        self.downstream.remove(flow_id);
    }
}

impl DataReceiver for EchoModule {
    fn receive(&self, flow_id: &DataFlowId, data: Data) -> Result<(), ReceiveError> {
        // Clone out of the map so a downstream teardown can remove the entry
        let Some(support) = self.downstream.get(flow_id).map(|s| s.value().clone()) else {
            // Last module of its flow
            self.echoed.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };

        let prefixed = data
            .downcast_ref::<String>()
            .map(|text| format!("{}{}", self.prefix, text));
        let out = match prefixed {
            Some(text) => Data::new(text),
            None => data,
        };
        support
            .send(out)
            .map_err(|e| ReceiveError::Rejected(e.to_string()))?;
        self.echoed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl ManagedModule for EchoModule {
    fn status(&self) -> String {
        format!(
            "prefix '{}', echoed {} unit(s), {} downstream flow(s)",
            self.prefix,
            self.echoed(),
            self.downstream.len()
        )
    }

    fn feature_tags(&self) -> Vec<String> {
        vec!["echo".to_string(), "transform".to_string()]
    }
}

pub fn factory() -> Result<Arc<dyn ModuleFactory>, UrnError> {
    let descriptor = FactoryDescriptor::new(ModuleUrn::parse(PROVIDER)?, "Prefixing echo")
        .singleton()
        .auto_start()
        .params([ParamType::Str]);

    Ok(Arc::new(FnFactory::new(descriptor, |urn, params| {
        let prefix = params
            .first()
            .and_then(|p| p.as_str())
            .ok_or_else(|| ModuleCreationError::new("echo needs a prefix"))?;
        Ok(Arc::new(EchoModule::new(urn.clone(), prefix)) as Arc<dyn Module>)
    })))
}
