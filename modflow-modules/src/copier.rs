//! Emits the comma-separated items of a data request
//!
//! `copier:list:instance-1;a,b,c` sends `"a"`, `"b"`, `"c"` as `String`
//! units, in order, as soon as the flow requests data.

use modflow_core::errors::{DataRequestError, UrnError};
use modflow_core::factory::{FactoryDescriptor, FnFactory, ModuleFactory};
use modflow_core::flow::{DataEmitterSupport, DataFlowId};
use modflow_core::module::{split_param_list, Data, DataEmitter, DataRequest, Module, ModuleUrn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

pub const PROVIDER: &str = "copier:list";

pub struct CopierModule {
    urn: ModuleUrn,
    copied: AtomicU64,
}

impl CopierModule {
    pub fn new(urn: ModuleUrn) -> Self {
        Self {
            urn,
            copied: AtomicU64::new(0),
        }
    }

    /// Units handed downstream so far, across all flows
    pub fn copied(&self) -> u64 {
        self.copied.load(Ordering::Relaxed)
    }
}

impl Module for CopierModule {
    fn urn(&self) -> &ModuleUrn {
        &self.urn
    }

    fn as_emitter(&self) -> Option<&dyn DataEmitter> {
        Some(self)
    }
}

impl DataEmitter for CopierModule {
    fn request_data(
        &self,
        request: &DataRequest,
        support: DataEmitterSupport,
    ) -> Result<(), DataRequestError> {
        let Some(parameter) = request.parameter.as_deref() else {
            return Err(DataRequestError::InvalidParameter(
                "copier needs a comma-separated list of items".to_string(),
            ));
        };

        for item in split_param_list(parameter) {
            if let Err(e) = support.send(Data::new(item.trim().to_string())) {
                // Delivery problems are already on the flow's error channel
                debug!(module = %self.urn, flow = %support.flow_id(), error = %e, "copy interrupted");
                if !support.is_active() {
                    break;
                }
                continue;
            }
            self.copied.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn cancel_request(&self, _flow_id: &DataFlowId) {}
}

pub fn factory() -> Result<Arc<dyn ModuleFactory>, UrnError> {
    let descriptor = FactoryDescriptor::new(
        ModuleUrn::parse(PROVIDER)?,
        "Emits the items of its request parameter",
    )
    .auto_start();

    Ok(Arc::new(FnFactory::new(descriptor, |urn, _params| {
        Ok(Arc::new(CopierModule::new(urn.clone())) as Arc<dyn Module>)
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use modflow_core::flow::DataFlowOptions;
    use modflow_core::manager::ModuleManager;
    use modflow_core::testing::{urn, RecordingReceiver, TestFactory};

    fn manager() -> (Arc<ModuleManager>, Arc<TestFactory<RecordingReceiver>>) {
        let recorders = Arc::new(TestFactory::simple(
            FactoryDescriptor::new(urn("test:recorder"), "Recorder").auto_start(),
            RecordingReceiver::new,
        ));
        let manager = ModuleManager::builder()
            .factory(factory().unwrap())
            .factory(recorders.clone())
            .build()
            .unwrap();
        (manager, recorders)
    }

    #[test]
    fn test_copies_items_in_order() {
        let (manager, recorders) = manager();
        let copier = manager.create_module(&urn(PROVIDER), &[]).unwrap();
        let recorder = manager.create_module(&urn("test:recorder"), &[]).unwrap();

        manager
            .create_data_flow(&[
                DataRequest::with_parameter(copier, "a, b,c"),
                DataRequest::new(recorder),
            ])
            .unwrap();

        assert_eq!(
            recorders.last().unwrap().values::<String>(),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn test_missing_parameter_fails_the_request() {
        let (manager, _) = manager();
        let copier = manager.create_module(&urn(PROVIDER), &[]).unwrap();

        let err = manager
            .create_data_flow_with(
                &[DataRequest::new(copier)],
                DataFlowOptions::default().with_sink(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            modflow_core::ModuleError::DataRequestFailed {
                source: DataRequestError::InvalidParameter(_),
                ..
            }
        ));
    }
}
