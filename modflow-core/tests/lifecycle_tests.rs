//! Module lifecycle through the manager
//!
//! These tests verify:
//! 1. create -> stop -> delete leaves no trace of the URN
//! 2. Singleton cardinality is checked before parameters
//! 3. Auto-start failures register nothing
//! 4. Start/stop are idempotent, delete is refused for started or in-use modules

mod common;

use common::Fixture;
use modflow_core::errors::ModuleError;
use modflow_core::factory::FactoryDescriptor;
use modflow_core::manager::ModuleManager;
use modflow_core::module::{ModuleState, ParamType, ParamValue};
use modflow_core::testing::{urn, RecordingReceiver, TestFactory};
use modflow_core::DataRequest;
use std::sync::Arc;

fn singleton_manager() -> (Arc<ModuleManager>, Arc<TestFactory<RecordingReceiver>>) {
    let factory = Arc::new(TestFactory::simple(
        FactoryDescriptor::new(urn("test:single"), "Singleton")
            .singleton()
            .params([ParamType::Str]),
        RecordingReceiver::new,
    ));
    let manager = ModuleManager::builder()
        .factory(factory.clone())
        .build()
        .unwrap();
    (manager, factory)
}

#[test]
fn test_create_stop_delete_leaves_registry_clean() {
    let fx = Fixture::new();
    let (created, _) = fx.recorder(0, 0);
    assert_eq!(
        fx.manager.module_info(&created).unwrap().state,
        ModuleState::Started
    );

    fx.manager.stop_module(&created).unwrap();
    fx.manager.delete_module(&created).unwrap();

    assert!(!fx.manager.module_instances(None).contains(&created));
    assert!(matches!(
        fx.manager.module_info(&created),
        Err(ModuleError::ModuleNotFound(_))
    ));
    assert!(fx
        .manager
        .provider_info(&urn("test:recorder"))
        .unwrap()
        .instances
        .is_empty());
}

#[test]
fn test_singleton_rejects_second_instance_regardless_of_params() {
    let (manager, _) = singleton_manager();
    let provider = urn("test:single");

    let first = manager
        .create_module(&provider, &[ParamValue::from("a")])
        .unwrap();
    assert_eq!(first, urn("test:single:single"));

    // Valid parameters
    assert!(matches!(
        manager.create_module(&provider, &[ParamValue::from("b")]),
        Err(ModuleError::CardinalityViolation { .. })
    ));
    // Wrong arity and type still report cardinality first
    assert!(matches!(
        manager.create_module(&provider, &[]),
        Err(ModuleError::CardinalityViolation { .. })
    ));
    assert!(matches!(
        manager.create_module(&provider, &[ParamValue::Int(3)]),
        Err(ModuleError::CardinalityViolation { .. })
    ));

    manager.delete_module(&first).unwrap();
    let again = manager
        .create_module(&provider, &[ParamValue::from("c")])
        .unwrap();
    assert_eq!(again, first);
}

#[test]
fn test_parameter_checks_in_order() {
    let (manager, factory) = singleton_manager();
    let provider = urn("test:single");

    assert!(matches!(
        manager.create_module(&provider, &[]),
        Err(ModuleError::ParameterCount {
            expected: 1,
            actual: 0,
            ..
        })
    ));
    assert!(matches!(
        manager.create_module(&provider, &[ParamValue::Bool(true)]),
        Err(ModuleError::ParameterType { index: 0, .. })
    ));
    // The factory never saw the invalid calls
    assert!(factory.instances().is_empty());
    assert!(manager.module_instances(Some(&provider)).is_empty());
}

#[test]
fn test_factory_validation_failure_registers_nothing() {
    let fx = Fixture::new();
    let err = fx
        .manager
        .create_module(&urn("test:recorder"), &[(-1_i64).into(), 0_i64.into()])
        .unwrap_err();

    match err {
        ModuleError::ModuleCreation { cause, .. } => assert_eq!(cause, "negative parameter"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(fx
        .manager
        .module_instances(Some(&urn("test:recorder")))
        .is_empty());
}

#[test]
fn test_auto_start_failure_rolls_back() {
    let factory = Arc::new(TestFactory::simple(
        FactoryDescriptor::new(urn("test:broken"), "Broken").auto_start(),
        |urn| RecordingReceiver::new(urn).failing_start(),
    ));
    let manager = ModuleManager::builder()
        .factory(factory.clone())
        .build()
        .unwrap();

    let err = manager.create_module(&urn("test:broken"), &[]).unwrap_err();
    assert!(matches!(err, ModuleError::LifecycleFailed { .. }));

    // Built by the factory, never registered
    assert_eq!(factory.instances().len(), 1);
    assert!(manager.module_instances(Some(&urn("test:broken"))).is_empty());

    // Instance numbers are not reused
    let err = manager.create_module(&urn("test"), &[]).unwrap_err();
    assert!(matches!(err, ModuleError::LifecycleFailed { .. }));
    assert_eq!(
        factory.last().map(|m| modflow_core::Module::urn(m.as_ref()).clone()),
        Some(urn("test:broken:instance-2"))
    );
}

#[test]
fn test_start_stop_idempotent() {
    let fx = Fixture::new();
    let relay = fx.relay();
    assert_eq!(fx.manager.module_info(&relay).unwrap().state, ModuleState::Created);

    fx.manager.start_module(&relay).unwrap();
    fx.manager.start_module(&relay).unwrap();
    let info = fx.manager.module_info(&relay).unwrap();
    assert_eq!(info.state, ModuleState::Started);
    assert!(info.started_at.is_some());

    fx.manager.stop_module(&relay).unwrap();
    fx.manager.stop_module(&relay).unwrap();
    assert_eq!(fx.manager.module_info(&relay).unwrap().state, ModuleState::Stopped);

    assert!(matches!(
        fx.manager.start_module(&urn("test:relay:instance-9")),
        Err(ModuleError::ModuleNotFound(_))
    ));
}

#[test]
fn test_delete_refused_while_started_or_in_use() {
    let fx = Fixture::new();
    let (source, _) = fx.source();
    let (recorder, _) = fx.recorder(0, 0);

    assert!(matches!(
        fx.manager.delete_module(&recorder),
        Err(ModuleError::InvalidModuleState { .. })
    ));

    let flow = fx
        .manager
        .create_data_flow(&[DataRequest::new(source), DataRequest::new(recorder.clone())])
        .unwrap();

    // Stopped but still referenced by a running flow
    fx.manager.stop_module(&recorder).unwrap();
    match fx.manager.delete_module(&recorder) {
        Err(ModuleError::ModuleInUse { flows, .. }) => assert_eq!(flows, vec![flow]),
        other => panic!("expected ModuleInUse, got {other:?}"),
    }

    fx.manager.stop_data_flow(flow).unwrap();
    fx.manager.delete_module(&recorder).unwrap();
}

#[test]
fn test_prefix_resolution_errors() {
    let fx = Fixture::new();
    assert!(matches!(
        fx.manager.create_module(&urn("test"), &[]),
        Err(ModuleError::AmbiguousFactory { .. })
    ));
    assert!(matches!(
        fx.manager.create_module(&urn("nothing"), &[]),
        Err(ModuleError::FactoryNotFound(_))
    ));

    let created = fx.manager.create_module(&urn("test:source"), &[]).unwrap();
    assert_eq!(created, urn("test:source:instance-1"));
}
