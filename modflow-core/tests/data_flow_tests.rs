//! Data flows built and driven through the manager
//!
//! These tests verify:
//! 1. Coupler allocation matches the chain, and invalid chains allocate none
//! 2. Sync delivery blocks the emitter for the receive duration
//! 3. Async delivery keeps emit order under uneven receive times
//! 4. Cancelling an async flow discards queued data and stops receives
//! 5. Fault policies: continue-on-error and fail-fast
//! 6. System sink, auto-start rules, history pruning

mod common;

use common::{Fixture, WAIT};
use modflow_core::errors::{DeliveryError, ModuleError};
use modflow_core::factory::FactoryDescriptor;
use modflow_core::flow::{CouplingMode, DataFlowOptions, DataFlowState, FaultKind, FaultPolicy};
use modflow_core::manager::ModuleManager;
use modflow_core::module::{Data, DataRequest, ModuleState};
use modflow_core::testing::{
    assert_blocks_for_at_least, urn, ManualSource, RecordingReceiver, TestFactory,
};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

fn requests(urns: &[&modflow_core::ModuleUrn]) -> Vec<DataRequest> {
    urns.iter().map(|u| DataRequest::new((*u).clone())).collect()
}

fn async_options() -> DataFlowOptions {
    DataFlowOptions::default()
        .with_coupling(CouplingMode::Async)
        .with_queue_capacity(8)
}

#[cfg(test)]
mod chain {
    use super::*;

    /// Test: N compatible modules get N-1 couplers
    #[test]
    fn test_coupler_per_adjacent_pair() {
        let fx = Fixture::new();
        let (source, handle) = fx.source();
        let first = fx.relay();
        let second = fx.relay();
        fx.manager.start_module(&first).unwrap();
        fx.manager.start_module(&second).unwrap();
        let (recorder, recorded) = fx.recorder(0, 0);

        let flow = fx
            .manager
            .create_data_flow(&requests(&[&source, &first, &second, &recorder]))
            .unwrap();

        assert_eq!(fx.manager.data_flow(flow).unwrap().coupler_count(), 3);
        assert_eq!(fx.manager.live_couplers(), 3);

        handle.emit(Data::new("through".to_string()));
        assert_eq!(recorded.values::<String>(), vec!["through".to_string()]);

        fx.manager.stop_data_flow(flow).unwrap();
        assert_eq!(fx.manager.live_couplers(), 0);
    }

    /// Test: an incompatible pair is rejected before any coupler exists
    #[test]
    fn test_incompatible_pair_allocates_nothing() {
        let fx = Fixture::new();
        let (source, _) = fx.source();
        let (recorder, _) = fx.recorder(0, 0);
        let (other, _) = fx.source();

        let err = fx
            .manager
            .create_data_flow(&requests(&[&source, &recorder, &other]))
            .unwrap_err();

        match err {
            ModuleError::IncompatibleModules {
                position,
                emitter,
                receiver,
                ..
            } => {
                assert_eq!(position, 1);
                assert_eq!(emitter, recorder);
                assert_eq!(receiver, other);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fx.manager.live_couplers(), 0);
        assert!(fx.manager.data_flows(true).is_empty());
    }

    /// Test: a module listed twice is rejected, whatever the coupling
    #[test]
    fn test_duplicate_module_allocates_nothing() {
        let fx = Fixture::new();
        let (source, handle) = fx.source();
        let relay = fx.relay();
        fx.manager.start_module(&relay).unwrap();
        let (recorder, recorded) = fx.recorder(0, 0);

        for options in [DataFlowOptions::default(), async_options()] {
            let err = fx
                .manager
                .create_data_flow_with(&requests(&[&source, &relay, &relay, &recorder]), options)
                .unwrap_err();

            match err {
                ModuleError::DuplicateModule { urn, positions } => {
                    assert_eq!(urn, relay);
                    assert_eq!(positions, vec![1, 2]);
                }
                other => panic!("unexpected error: {other}"),
            }
            assert_eq!(fx.manager.live_couplers(), 0);
            assert!(fx.manager.data_flows(true).is_empty());
        }

        assert!(handle.requests().is_empty());
        assert!(handle.emit(Data::new(1_u64)).is_empty());
        assert_eq!(recorded.count(), 0);
    }

    #[test]
    fn test_degenerate_chains() {
        let fx = Fixture::new();
        let (source, _) = fx.source();

        assert!(matches!(
            fx.manager.create_data_flow(&[]),
            Err(ModuleError::EmptyDataFlow)
        ));
        assert!(matches!(
            fx.manager.create_data_flow(&requests(&[&source])),
            Err(ModuleError::SingleModuleFlow(_))
        ));
        assert!(matches!(
            fx.manager
                .create_data_flow(&requests(&[&source, &urn("test:recorder:instance-7")])),
            Err(ModuleError::ModuleNotFound(_))
        ));
    }

    #[test]
    fn test_non_auto_start_module_must_be_started() {
        let fx = Fixture::new();
        let (source, _) = fx.source();
        let relay = fx.relay();
        let (recorder, _) = fx.recorder(0, 0);

        let err = fx
            .manager
            .create_data_flow(&requests(&[&source, &relay, &recorder]))
            .unwrap_err();
        assert!(matches!(err, ModuleError::ModuleNotStarted { .. }));
        assert_eq!(fx.manager.live_couplers(), 0);

        fx.manager.start_module(&relay).unwrap();
        assert!(fx
            .manager
            .create_data_flow(&requests(&[&source, &relay, &recorder]))
            .is_ok());
    }

    #[test]
    fn test_auto_start_participants() {
        let fx = Fixture::new();
        let (source, _) = fx.source();
        let (recorder, _) = fx.recorder(0, 0);
        fx.manager.stop_module(&recorder).unwrap();

        fx.manager
            .create_data_flow(&requests(&[&source, &recorder]))
            .unwrap();
        assert_eq!(
            fx.manager.module_info(&recorder).unwrap().state,
            ModuleState::Started
        );
    }

    #[test]
    fn test_failed_data_request_rolls_back() {
        let fx = Fixture::new();
        let (source, handle) = fx.source();
        let (recorder, _) = fx.recorder(0, 0);
        handle.set_fail_requests(true);

        let err = fx
            .manager
            .create_data_flow(&requests(&[&source, &recorder]))
            .unwrap_err();
        let id = match err {
            ModuleError::DataRequestFailed { id, urn: failed, .. } => {
                assert_eq!(failed, source);
                id
            }
            other => panic!("unexpected error: {other}"),
        };

        assert!(fx.manager.data_flows(true).is_empty());
        assert_eq!(fx.manager.live_couplers(), 0);
        let info = fx.manager.data_flow_info(id).unwrap();
        assert_eq!(info.state, DataFlowState::Cancelled);
    }
}

#[cfg(test)]
mod delivery {
    use super::*;

    /// Test: sync emit returns only after the receiver finished
    #[test]
    fn test_sync_emit_blocks_for_receive() {
        let fx = Fixture::new();
        let (source, handle) = fx.source();
        let (recorder, recorded) = fx.recorder(50, 0);
        fx.manager
            .create_data_flow(&requests(&[&source, &recorder]))
            .unwrap();

        let results = assert_blocks_for_at_least(
            Duration::from_millis(50),
            || handle.emit(Data::new(1_u64)),
            "sync emit",
        );
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(recorded.count(), 1);
    }

    /// Test: 100 async emits arrive in order with randomized receive times
    #[test]
    fn test_async_preserves_order() {
        let mut rng = rand::thread_rng();
        let delays: Vec<Duration> = (0..100)
            .map(|_| Duration::from_micros(rng.gen_range(0..2_000)))
            .collect();

        let receivers = Arc::new(TestFactory::simple(
            FactoryDescriptor::new(urn("test:jitter"), "Jitter").auto_start(),
            move |urn| RecordingReceiver::new(urn).with_delays(delays.clone()),
        ));
        let sources = Arc::new(TestFactory::simple(
            FactoryDescriptor::new(urn("test:source"), "Source").auto_start(),
            ManualSource::new,
        ));
        let manager = ModuleManager::builder()
            .factory(receivers.clone())
            .factory(sources.clone())
            .build()
            .unwrap();

        let source = manager.create_module(&urn("test:source"), &[]).unwrap();
        let receiver = manager.create_module(&urn("test:jitter"), &[]).unwrap();
        manager
            .create_data_flow_with(&requests(&[&source, &receiver]), async_options())
            .unwrap();

        let handle = sources.last().unwrap();
        for i in 0..100_u64 {
            for result in handle.emit(Data::new(i)) {
                result.unwrap();
            }
        }

        let recorded = receivers.last().unwrap();
        assert!(recorded.wait_for(100, WAIT));
        assert_eq!(recorded.values::<u64>(), (0..100).collect::<Vec<_>>());
    }

    /// Test: cancel with queued data stops the worker and drops the rest
    #[test]
    fn test_async_cancel_discards_queue() {
        let fx = Fixture::new();
        let (source, handle) = fx.source();
        let (recorder, recorded) = fx.recorder(30, 0);
        let flow = fx
            .manager
            .create_data_flow_with(&requests(&[&source, &recorder]), async_options())
            .unwrap();

        for i in 0..8_u64 {
            for result in handle.emit(Data::new(i)) {
                result.unwrap();
            }
        }
        assert!(recorded.wait_for(1, WAIT));

        fx.manager.cancel_data_flow(flow).unwrap();
        let calls = recorded.calls();
        assert!(calls < 8, "cancel should leave queued data undelivered");

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(recorded.calls(), calls, "no receive after cancel returned");

        let info = fx.manager.data_flow_info(flow).unwrap();
        assert_eq!(info.state, DataFlowState::Cancelled);
        let stats = &info.couplers[0].stats;
        assert_eq!(stats.emitted, 8);
        assert_eq!(stats.delivered + stats.failed + stats.discarded, 8);
        assert!(stats.discarded > 0);
        assert_eq!(fx.manager.live_couplers(), 0);
    }

    /// Test: an emitter blocked on a full queue is released by cancel
    #[test]
    fn test_blocked_emitter_released_on_cancel() {
        let fx = Fixture::new();
        let (source, handle) = fx.source();
        let (recorder, _) = fx.recorder(200, 0);
        let options = async_options().with_queue_capacity(1);
        let flow = fx
            .manager
            .create_data_flow_with(&requests(&[&source, &recorder]), options)
            .unwrap();
        let support = handle.support(&flow).unwrap();

        // One unit in the receiver, one queued
        support.send(Data::new(0_u64)).unwrap();
        support.send(Data::new(1_u64)).unwrap();

        let outcome = Arc::new(Mutex::new(None));
        let blocked = {
            let support = support.clone();
            let outcome = Arc::clone(&outcome);
            std::thread::spawn(move || {
                let mut result = support.send(Data::new(2_u64));
                // The worker may free a slot first; keep pushing until refused
                while result.is_ok() {
                    result = support.send(Data::new(3_u64));
                }
                *outcome.lock() = Some(result);
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        fx.manager.cancel_data_flow(flow).unwrap();
        blocked.join().unwrap();

        let result = outcome.lock().take().unwrap();
        assert!(matches!(
            result,
            Err(DeliveryError::Cancelled) | Err(DeliveryError::NotAccepting { .. })
        ));
    }

    /// Test: a stopped receiver refuses delivery without tearing the flow down
    #[test]
    fn test_stopped_receiver_refuses_delivery() {
        let fx = Fixture::new();
        let (source, handle) = fx.source();
        let (recorder, recorded) = fx.recorder(0, 0);
        let flow = fx
            .manager
            .create_data_flow(&requests(&[&source, &recorder]))
            .unwrap();

        fx.manager.stop_module(&recorder).unwrap();
        let results = handle.emit(Data::new(1_u64));
        assert!(matches!(
            results[0],
            Err(DeliveryError::ReceiverNotStarted { .. })
        ));
        assert_eq!(recorded.calls(), 0);
        assert_eq!(
            fx.manager.data_flow(flow).unwrap().state(),
            DataFlowState::Started
        );

        fx.manager.start_module(&recorder).unwrap();
        assert!(handle.emit(Data::new(2_u64))[0].is_ok());
        assert_eq!(recorded.values::<u64>(), vec![2]);
    }
}

#[cfg(test)]
mod faults {
    use super::*;

    #[test]
    fn test_continue_on_error_keeps_running() {
        let fx = Fixture::new();
        let (source, handle) = fx.source();
        let (recorder, recorded) = fx.recorder(0, 2);
        let flow = fx
            .manager
            .create_data_flow(&requests(&[&source, &recorder]))
            .unwrap();
        let errors = fx.manager.data_flow(flow).unwrap().errors();

        let results: Vec<_> = (0..4_u64)
            .flat_map(|i| handle.emit(Data::new(i)))
            .collect();
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 2);
        assert!(matches!(results[1], Err(DeliveryError::Receiver { .. })));

        assert_eq!(recorded.values::<u64>(), vec![0, 2]);
        let faults: Vec<_> = errors.try_iter().collect();
        assert_eq!(faults.len(), 2);
        assert!(faults.iter().all(|f| f.kind == FaultKind::Delivery));

        let info = fx.manager.data_flow_info(flow).unwrap();
        assert_eq!(info.state, DataFlowState::Started);
        assert_eq!(info.fault_count, 2);
        assert_eq!(info.couplers[0].stats.failed, 2);
    }

    #[test]
    fn test_fail_fast_cancels_on_first_error() {
        let fx = Fixture::new();
        let (source, handle) = fx.source();
        let (recorder, recorded) = fx.recorder(0, 1);
        let options = DataFlowOptions::default().with_fault_policy(FaultPolicy::FailFast);
        let flow = fx
            .manager
            .create_data_flow_with(&requests(&[&source, &recorder]), options)
            .unwrap();

        assert!(handle.emit(Data::new(1_u64))[0].is_err());
        assert!(handle.emit(Data::new(2_u64)).is_empty());
        assert_eq!(recorded.calls(), 1);

        // Retired on the next registry access
        assert!(fx.manager.data_flows(true).is_empty());
        let info = fx.manager.data_flow_info(flow).unwrap();
        assert_eq!(info.state, DataFlowState::Cancelled);
        assert_eq!(info.fault_policy, FaultPolicy::FailFast);
        assert_eq!(handle.cancelled(), vec![flow]);

        // Stopping a finished flow is a no-op
        fx.manager.stop_data_flow(flow).unwrap();
    }

    #[test]
    fn test_fail_fast_async() {
        let fx = Fixture::new();
        let (source, handle) = fx.source();
        let (recorder, recorded) = fx.recorder(0, 1);
        let options = async_options().with_fault_policy(FaultPolicy::FailFast);
        let flow = fx
            .manager
            .create_data_flow_with(&requests(&[&source, &recorder]), options)
            .unwrap();
        let errors = fx.manager.data_flow(flow).unwrap().errors();

        handle.emit(Data::new(1_u64));
        let fault = errors.recv_timeout(WAIT).unwrap();
        assert_eq!(fault.receiver, Some(recorder));

        let flow_handle = fx.manager.data_flow(flow);
        if let Ok(flow_handle) = flow_handle {
            // The worker cancels right after publishing
            let deadline = std::time::Instant::now() + WAIT;
            while flow_handle.state() != DataFlowState::Cancelled {
                assert!(std::time::Instant::now() < deadline);
                std::thread::yield_now();
            }
        }
        assert_eq!(recorded.count(), 0);
    }

    #[test]
    fn test_emitter_error_can_stop_flow() {
        let fx = Fixture::new();
        let (source, handle) = fx.source();
        let (recorder, _) = fx.recorder(0, 0);
        let flow = fx
            .manager
            .create_data_flow(&requests(&[&source, &recorder]))
            .unwrap();
        let support = handle.support(&flow).unwrap();

        support.emit_error("upstream hiccup", false);
        assert!(support.is_active());

        support.emit_error("upstream gone", true);
        assert!(!support.is_active());

        let info = fx.manager.data_flow_info(flow).unwrap();
        assert_eq!(info.state, DataFlowState::Cancelled);
        assert_eq!(info.fault_count, 2);
        assert_eq!(info.recent_faults[1].kind, FaultKind::Emitter);
        assert_eq!(info.recent_faults[1].message, "upstream gone");
    }
}

#[cfg(test)]
mod manager_table {
    use super::*;

    #[test]
    fn test_sink_appended_and_observed() {
        let fx = Fixture::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            fx.manager
                .add_sink_listener(Arc::new(move |_: &modflow_core::DataFlowId, data: &Data| {
                    if let Some(value) = data.downcast_ref::<u64>() {
                        seen.lock().push(*value);
                    }
                }));
        }

        let (source, handle) = fx.source();
        let flow = fx
            .manager
            .create_data_flow_with(
                &requests(&[&source]),
                DataFlowOptions::default().with_sink(),
            )
            .unwrap();

        let info = fx.manager.data_flow_info(flow).unwrap();
        assert_eq!(info.requests.len(), 2);
        assert_eq!(&info.requests[1].urn, fx.manager.sink_urn());

        handle.emit(Data::new(7_u64));
        assert_eq!(*seen.lock(), vec![7]);

        let sink = fx.manager.module_info(fx.manager.sink_urn()).unwrap();
        assert_eq!(sink.flows, vec![flow]);
        assert_eq!(sink.status.as_deref(), Some("received 1 unit(s)"));
    }

    #[test]
    fn test_sink_not_appended_after_receiver() {
        let fx = Fixture::new();
        let (source, _) = fx.source();
        let (recorder, _) = fx.recorder(0, 0);
        let flow = fx
            .manager
            .create_data_flow_with(
                &requests(&[&source, &recorder]),
                DataFlowOptions::default().with_sink(),
            )
            .unwrap();

        assert_eq!(fx.manager.data_flow_info(flow).unwrap().requests.len(), 2);
    }

    #[test]
    fn test_history_is_bounded_and_prunable() {
        let fx = Fixture::with_history(3);
        let (source, _) = fx.source();
        let (recorder, _) = fx.recorder(0, 0);

        let flows: Vec<_> = (0..5)
            .map(|_| {
                let id = fx
                    .manager
                    .create_data_flow(&requests(&[&source, &recorder]))
                    .unwrap();
                fx.manager.stop_data_flow(id).unwrap();
                id
            })
            .collect();

        let history: Vec<_> = fx
            .manager
            .data_flow_history()
            .into_iter()
            .map(|info| info.id)
            .collect();
        assert_eq!(history, flows[2..].to_vec());
        assert!(matches!(
            fx.manager.data_flow_info(flows[0]),
            Err(ModuleError::DataFlowNotFound(_))
        ));

        fx.manager.set_max_flow_history(1);
        assert_eq!(fx.manager.max_flow_history(), 1);
        assert_eq!(fx.manager.data_flow_history().len(), 1);
        assert_eq!(fx.manager.data_flow_history()[0].id, flows[4]);
        assert_eq!(
            fx.manager.data_flow_history()[0].state,
            DataFlowState::Stopped
        );
    }

    #[test]
    fn test_stop_unknown_flow() {
        let fx = Fixture::new();
        let missing = modflow_core::DataFlowId::new(42);
        assert!(matches!(
            fx.manager.stop_data_flow(missing),
            Err(ModuleError::DataFlowNotFound(_))
        ));
        assert!(matches!(
            fx.manager.cancel_data_flow(missing),
            Err(ModuleError::DataFlowNotFound(_))
        ));
    }

    #[test]
    fn test_shutdown_cancels_flows_and_stops_modules() {
        let fx = Fixture::new();
        let (source, handle) = fx.source();
        let (recorder, _) = fx.recorder(0, 0);
        let flow = fx
            .manager
            .create_data_flow_with(&requests(&[&source, &recorder]), async_options())
            .unwrap();

        fx.manager.shutdown();

        assert_eq!(handle.cancelled(), vec![flow]);
        assert_eq!(fx.manager.live_couplers(), 0);
        assert_eq!(
            fx.manager.data_flow_info(flow).unwrap().state,
            DataFlowState::Cancelled
        );
        assert_eq!(
            fx.manager.module_info(&recorder).unwrap().state,
            ModuleState::Stopped
        );
        assert!(matches!(
            fx.manager.create_data_flow(&requests(&[&source, &recorder])),
            Err(ModuleError::ShutDown)
        ));
    }
}

#[cfg(test)]
mod module_created {
    use super::*;

    /// Test: flows a module creates are tagged with it and listed on request
    #[test]
    fn test_module_flows_are_tagged_and_filtered() {
        let fx = Fixture::new();
        let (initiator, module) = fx.initiator();
        let (source, handle) = fx.source();
        let (recorder, recorded) = fx.recorder(0, 0);
        let support = module.support().unwrap();
        assert_eq!(support.requester(), &initiator);

        let owned = support
            .create_data_flow(&requests(&[&source, &recorder]))
            .unwrap();
        let (other_source, _) = fx.source();
        let plain = fx
            .manager
            .create_data_flow(&requests(&[&other_source, &recorder]))
            .unwrap();

        assert_eq!(fx.manager.data_flows(false), vec![plain]);
        assert_eq!(fx.manager.data_flows(true), vec![owned, plain]);
        assert_eq!(
            fx.manager.data_flow_info(owned).unwrap().requester,
            Some(initiator.clone())
        );
        assert_eq!(fx.manager.data_flow_info(plain).unwrap().requester, None);

        handle.emit(Data::new(3_u64));
        assert_eq!(recorded.values::<u64>(), vec![3]);
    }

    /// Test: only the creating module can tear its flow down
    #[test]
    fn test_only_the_creator_tears_down() {
        let fx = Fixture::new();
        let (initiator, module) = fx.initiator();
        let (_, stranger) = fx.initiator();
        let (source, _) = fx.source();
        let (recorder, _) = fx.recorder(0, 0);
        let support = module.support().unwrap();

        let owned = support
            .create_data_flow(&requests(&[&source, &recorder]))
            .unwrap();
        match fx.manager.stop_data_flow(owned).unwrap_err() {
            ModuleError::NotFlowOwner { id, owner } => {
                assert_eq!(id, owned);
                assert_eq!(owner, Some(initiator.clone()));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            fx.manager.cancel_data_flow(owned),
            Err(ModuleError::NotFlowOwner { .. })
        ));
        assert!(matches!(
            stranger.support().unwrap().cancel_data_flow(owned),
            Err(ModuleError::NotFlowOwner { .. })
        ));

        let (other_source, _) = fx.source();
        let plain = fx
            .manager
            .create_data_flow(&requests(&[&other_source, &recorder]))
            .unwrap();
        assert!(matches!(
            support.cancel_data_flow(plain),
            Err(ModuleError::NotFlowOwner { owner: None, .. })
        ));

        support.cancel_data_flow(owned).unwrap();
        support.cancel_data_flow(owned).unwrap();
        assert_eq!(
            fx.manager.data_flow_info(owned).unwrap().state,
            DataFlowState::Cancelled
        );
        assert_eq!(fx.manager.data_flows(true), vec![plain]);
    }

    /// Test: stopping the creator cancels its flows and leaves the rest running
    #[test]
    fn test_stopping_creator_cancels_its_flows() {
        let fx = Fixture::new();
        let (initiator, module) = fx.initiator();
        let (source, handle) = fx.source();
        let support = module.support().unwrap();

        // The initiator also receives in its own flow
        let owned = support
            .create_data_flow_with(&requests(&[&source, &initiator]), async_options())
            .unwrap();
        let (other_source, _) = fx.source();
        let (recorder, _) = fx.recorder(0, 0);
        let plain = fx
            .manager
            .create_data_flow(&requests(&[&other_source, &recorder]))
            .unwrap();

        fx.manager.stop_module(&initiator).unwrap();

        assert_eq!(handle.cancelled(), vec![owned]);
        assert_eq!(
            fx.manager.data_flow_info(owned).unwrap().state,
            DataFlowState::Cancelled
        );
        assert_eq!(fx.manager.data_flows(true), vec![plain]);
        assert_eq!(fx.manager.live_couplers(), 1);

        assert!(matches!(
            support.create_data_flow(&requests(&[&source, &recorder])),
            Err(ModuleError::ModuleNotStarted { .. })
        ));
        fx.manager.delete_module(&initiator).unwrap();
        assert!(matches!(
            support.create_data_flow(&requests(&[&source, &recorder])),
            Err(ModuleError::ModuleNotFound(_))
        ));
    }

    #[test]
    fn test_support_outliving_manager() {
        let fx = Fixture::new();
        let (_, module) = fx.initiator();
        let (source, _) = fx.source();
        let (recorder, _) = fx.recorder(0, 0);
        let support = module.support().unwrap();
        drop(fx);

        assert!(matches!(
            support.create_data_flow(&requests(&[&source, &recorder])),
            Err(ModuleError::ShutDown)
        ));
    }
}
