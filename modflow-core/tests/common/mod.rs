//! Shared fixture for runtime integration tests

#![allow(dead_code)]

use modflow_core::errors::ModuleCreationError;
use modflow_core::factory::FactoryDescriptor;
use modflow_core::manager::ModuleManager;
use modflow_core::module::{ModuleUrn, ParamType};
use modflow_core::testing::{urn, FlowInitiator, ManualSource, RecordingReceiver, Relay, TestFactory};
use std::sync::Arc;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

pub struct Fixture {
    pub manager: Arc<ModuleManager>,
    /// `test:source`, auto-start
    pub sources: Arc<TestFactory<ManualSource>>,
    /// `test:relay`, must be started explicitly
    pub relays: Arc<TestFactory<Relay>>,
    /// `test:recorder`, auto-start, params `[delay_ms, fail_every]` (0 = never)
    pub recorders: Arc<TestFactory<RecordingReceiver>>,
    /// `test:initiator`, auto-start, runs flows of its own
    pub initiators: Arc<TestFactory<FlowInitiator>>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_history(16)
    }

    pub fn with_history(max_flow_history: usize) -> Self {
        let sources = Arc::new(TestFactory::simple(
            FactoryDescriptor::new(urn("test:source"), "Manual source").auto_start(),
            ManualSource::new,
        ));
        let relays = Arc::new(TestFactory::simple(
            FactoryDescriptor::new(urn("test:relay"), "Relay"),
            Relay::new,
        ));
        let recorders = Arc::new(TestFactory::new(
            FactoryDescriptor::new(urn("test:recorder"), "Recorder")
                .auto_start()
                .params([ParamType::Int, ParamType::Int]),
            |urn, params| {
                let delay = params[0].as_int().unwrap_or(0);
                let fail_every = params[1].as_int().unwrap_or(0);
                if delay < 0 || fail_every < 0 {
                    return Err(ModuleCreationError::new("negative parameter"));
                }

                let mut recorder = RecordingReceiver::new(urn.clone());
                if delay > 0 {
                    recorder = recorder.with_delay(Duration::from_millis(delay as u64));
                }
                if fail_every > 0 {
                    recorder = recorder.failing_every(fail_every as usize);
                }
                Ok(recorder)
            },
        ));

        let initiators = Arc::new(TestFactory::simple(
            FactoryDescriptor::new(urn("test:initiator"), "Flow initiator").auto_start(),
            FlowInitiator::new,
        ));

        let mut settings = modflow_core::config::RuntimeSettings::default();
        settings.max_flow_history = max_flow_history;

        let manager = ModuleManager::builder()
            .settings(settings)
            .factory(sources.clone())
            .factory(relays.clone())
            .factory(recorders.clone())
            .factory(initiators.clone())
            .build()
            .unwrap();

        Self {
            manager,
            sources,
            relays,
            recorders,
            initiators,
        }
    }

    pub fn source(&self) -> (ModuleUrn, Arc<ManualSource>) {
        let urn = self.manager.create_module(&urn("test:source"), &[]).unwrap();
        (urn.clone(), self.sources.get(&urn).unwrap())
    }

    pub fn recorder(&self, delay_ms: i64, fail_every: i64) -> (ModuleUrn, Arc<RecordingReceiver>) {
        let urn = self
            .manager
            .create_module(&urn("test:recorder"), &[delay_ms.into(), fail_every.into()])
            .unwrap();
        (urn.clone(), self.recorders.get(&urn).unwrap())
    }

    pub fn initiator(&self) -> (ModuleUrn, Arc<FlowInitiator>) {
        let urn = self.manager.create_module(&urn("test:initiator"), &[]).unwrap();
        (urn.clone(), self.initiators.get(&urn).unwrap())
    }

    pub fn relay(&self) -> ModuleUrn {
        self.manager.create_module(&urn("test:relay"), &[]).unwrap()
    }
}
