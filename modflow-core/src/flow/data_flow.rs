//! Data flow: an ordered chain of coupled modules
//!
//! # State Diagram
//!
//! ```text
//!  ┌─────────┐  start   ┌─────────┐  stop   ┌─────────┐
//!  │ Created │────────▶│ Started │───────▶│ Stopped │ (terminal)
//!  └────┬────┘          └────┬────┘         └─────────┘
//!       │     cancel         │ cancel
//!       └────────────────────┴──────────▶ Cancelled (terminal)
//! ```
//!
//! Position *i* must emit and position *i+1* must receive. The chain is
//! checked before any coupler exists, so an incompatible chain allocates
//! nothing.
//!
//! Ordering:
//! - start: couplers source-to-sink, then data requests sink-to-source, so
//!   every hop is ready before its upstream produces anything
//! - stop: couplers signalled sink-to-source, then emitter requests cancelled
//!   source-to-sink, then couplers settled; waits for at most the unit in flight
//! - cancel: no ordering; every coupler is signalled before any is waited on

use super::async_coupler::AsyncCoupler;
use super::coupler::{
    CouplerCore, CouplerState, CouplerStats, CouplerTracker, CouplingMode, DataCoupler,
};
use super::faults::{FaultPolicy, FlowFault, FlowFaults};
use super::support::DataEmitterSupport;
use super::sync_coupler::SyncCoupler;
use super::DataFlowId;
use crate::config::DEFAULT_ASYNC_QUEUE_CAPACITY;
use crate::errors::{ModuleError, ModuleResult};
use crate::module::{DataRequest, Module, ModuleState, ModuleStateCell, ModuleUrn};
use crate::utils::now_millis;
use crossbeam::channel::Receiver;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFlowState {
    Created,
    Started,
    Stopped,
    Cancelled,
}

impl DataFlowState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DataFlowState::Stopped | DataFlowState::Cancelled)
    }
}

impl fmt::Display for DataFlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataFlowState::Created => "created",
            DataFlowState::Started => "started",
            DataFlowState::Stopped => "stopped",
            DataFlowState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFlowOptions {
    pub coupling: CouplingMode,
    pub fault_policy: FaultPolicy,
    /// Per-coupler queue bound for async coupling
    pub queue_capacity: usize,
    /// Append the system sink when the last module can emit
    pub append_sink: bool,
}

impl Default for DataFlowOptions {
    fn default() -> Self {
        Self {
            coupling: CouplingMode::Sync,
            fault_policy: FaultPolicy::ContinueOnError,
            queue_capacity: DEFAULT_ASYNC_QUEUE_CAPACITY,
            append_sink: false,
        }
    }
}

impl DataFlowOptions {
    pub fn with_coupling(mut self, coupling: CouplingMode) -> Self {
        self.coupling = coupling;
        self
    }

    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_sink(mut self) -> Self {
        self.append_sink = true;
        self
    }
}

/// One resolved position of a flow
#[derive(Clone)]
pub struct FlowParticipant {
    pub request: DataRequest,
    pub module: Arc<dyn Module>,
    pub state: ModuleStateCell,
}

impl fmt::Debug for FlowParticipant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowParticipant")
            .field("request", &self.request)
            .field("state", &self.state.load())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CouplerInfo {
    pub emitter: ModuleUrn,
    pub receiver: ModuleUrn,
    pub mode: CouplingMode,
    pub state: CouplerState,
    pub stats: CouplerStats,
}

/// Read-only view of a flow, also what the history keeps
#[derive(Debug, Clone, Serialize)]
pub struct DataFlowInfo {
    pub id: DataFlowId,
    pub state: DataFlowState,
    /// Module that created the flow; `None` for flows created by a manager caller
    pub requester: Option<ModuleUrn>,
    pub coupling: CouplingMode,
    pub fault_policy: FaultPolicy,
    pub requests: Vec<DataRequest>,
    pub couplers: Vec<CouplerInfo>,
    pub fault_count: u64,
    pub recent_faults: Vec<FlowFault>,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
}

#[derive(Debug)]
struct Lifecycle {
    state: DataFlowState,
    started_at: Option<u64>,
    finished_at: Option<u64>,
}

pub(crate) struct FlowInner {
    id: DataFlowId,
    options: DataFlowOptions,
    requester: Option<ModuleUrn>,
    participants: Vec<FlowParticipant>,
    couplers: Vec<Arc<dyn DataCoupler>>,
    faults: Arc<FlowFaults>,
    created_at: u64,
    lifecycle: Mutex<Lifecycle>,
}

impl FlowInner {
    fn state(&self) -> DataFlowState {
        self.lifecycle.lock().state
    }

    /// Forced teardown from any non-terminal state
    pub(crate) fn cancel(&self, reason: &str) -> bool {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state.is_terminal() {
                return false;
            }
            lifecycle.state = DataFlowState::Cancelled;
            lifecycle.finished_at = Some(now_millis());
        }

        for coupler in &self.couplers {
            coupler.signal(CouplerState::Cancelled);
        }
        self.cancel_requests();
        for coupler in &self.couplers {
            coupler.settle();
        }

        info!(flow = %self.id, reason, "data flow cancelled");
        true
    }

    fn stop(&self) -> ModuleResult<bool> {
        {
            let mut lifecycle = self.lifecycle.lock();
            match lifecycle.state {
                DataFlowState::Started => {
                    lifecycle.state = DataFlowState::Stopped;
                    lifecycle.finished_at = Some(now_millis());
                }
                DataFlowState::Stopped | DataFlowState::Cancelled => return Ok(false),
                DataFlowState::Created => {
                    return Err(ModuleError::InvalidFlowState {
                        id: self.id,
                        operation: "stop",
                        state: DataFlowState::Created,
                    })
                }
            }
        }

        // Signal first: an emitter blocked on a full queue is released before
        // its request is cancelled
        for coupler in self.couplers.iter().rev() {
            coupler.signal(CouplerState::Stopped);
        }
        self.cancel_requests();
        for coupler in self.couplers.iter().rev() {
            coupler.settle();
        }

        info!(flow = %self.id, "data flow stopped");
        Ok(true)
    }

    /// Cancel outstanding requests on every emitting position, source first
    fn cancel_requests(&self) {
        for participant in &self.participants[..self.couplers.len()] {
            if let Some(emitter) = participant.module.as_emitter() {
                emitter.cancel_request(&self.id);
            }
        }
    }
}

impl Drop for FlowInner {
    fn drop(&mut self) {
        self.cancel("dropped");
    }
}

/// Handle to a data flow; clones share the same flow
#[derive(Clone)]
pub struct DataFlow {
    inner: Arc<FlowInner>,
}

impl DataFlow {
    /// Check that every module appears once and every adjacent pair can be coupled
    pub fn validate_chain(participants: &[FlowParticipant]) -> ModuleResult<()> {
        match participants {
            [] => return Err(ModuleError::EmptyDataFlow),
            [only] => return Err(ModuleError::SingleModuleFlow(only.request.urn.clone())),
            _ => {}
        }

        // Modules keep one emitter support per flow id, so each may appear once
        for (first, participant) in participants.iter().enumerate() {
            let urn = &participant.request.urn;
            let positions: Vec<usize> = participants
                .iter()
                .enumerate()
                .skip(first)
                .filter(|(_, other)| &other.request.urn == urn)
                .map(|(position, _)| position)
                .collect();
            if positions.len() > 1 {
                return Err(ModuleError::DuplicateModule {
                    urn: urn.clone(),
                    positions,
                });
            }
        }

        for (position, pair) in participants.windows(2).enumerate() {
            let (upstream, downstream) = (&pair[0], &pair[1]);
            let reason = if !upstream.module.capabilities().emit {
                Some("upstream module cannot emit")
            } else if !downstream.module.capabilities().receive {
                Some("downstream module cannot receive")
            } else {
                None
            };

            if let Some(reason) = reason {
                return Err(ModuleError::IncompatibleModules {
                    position,
                    emitter: upstream.request.urn.clone(),
                    receiver: downstream.request.urn.clone(),
                    reason,
                });
            }
        }

        Ok(())
    }

    /// Validate the chain and allocate one coupler per adjacent pair
    pub fn create(
        id: DataFlowId,
        participants: Vec<FlowParticipant>,
        options: DataFlowOptions,
        tracker: &CouplerTracker,
    ) -> ModuleResult<Self> {
        Self::create_requested(id, participants, options, tracker, None)
    }

    pub(crate) fn create_requested(
        id: DataFlowId,
        participants: Vec<FlowParticipant>,
        options: DataFlowOptions,
        tracker: &CouplerTracker,
        requester: Option<ModuleUrn>,
    ) -> ModuleResult<Self> {
        Self::validate_chain(&participants)?;

        let inner = Arc::new_cyclic(|weak| {
            let faults = Arc::new(FlowFaults::new(id, options.fault_policy, weak.clone()));

            let couplers = participants
                .windows(2)
                .map(|pair| {
                    let core = CouplerCore::new(
                        id,
                        pair[0].request.urn.clone(),
                        Arc::clone(&pair[1].module),
                        pair[1].state.clone(),
                        Arc::clone(&faults),
                        tracker,
                    );
                    match options.coupling {
                        CouplingMode::Sync => Arc::new(SyncCoupler::new(core)) as Arc<dyn DataCoupler>,
                        CouplingMode::Async => {
                            Arc::new(AsyncCoupler::new(core, options.queue_capacity))
                                as Arc<dyn DataCoupler>
                        }
                    }
                })
                .collect();

            FlowInner {
                id,
                options,
                requester,
                participants,
                couplers,
                faults,
                created_at: now_millis(),
                lifecycle: Mutex::new(Lifecycle {
                    state: DataFlowState::Created,
                    started_at: None,
                    finished_at: None,
                }),
            }
        });

        debug!(
            flow = %id,
            requester = ?inner.requester.as_ref().map(ToString::to_string),
            modules = inner.participants.len(),
            coupling = %options.coupling,
            "data flow created"
        );
        Ok(Self { inner })
    }

    /// Start couplers, then request data from every emitter
    ///
    /// A failed data request cancels the flow and returns `DataRequestFailed`.
    pub fn start(&self) -> ModuleResult<()> {
        let inner = &self.inner;
        {
            let mut lifecycle = inner.lifecycle.lock();
            if lifecycle.state != DataFlowState::Created {
                return Err(ModuleError::InvalidFlowState {
                    id: inner.id,
                    operation: "start",
                    state: lifecycle.state,
                });
            }
            for participant in &inner.participants {
                let state = participant.state.load();
                if state != ModuleState::Started {
                    return Err(ModuleError::ModuleNotStarted {
                        urn: participant.request.urn.clone(),
                        state,
                    });
                }
            }
            lifecycle.state = DataFlowState::Started;
            lifecycle.started_at = Some(now_millis());
        }

        for coupler in &inner.couplers {
            if let Err(source) = coupler.start() {
                inner.cancel("coupler start failed");
                return Err(ModuleError::CouplerStart {
                    id: inner.id,
                    source,
                });
            }
        }

        for position in (0..inner.couplers.len()).rev() {
            if inner.state() != DataFlowState::Started {
                debug!(flow = %inner.id, "data flow torn down while requesting data");
                break;
            }

            let participant = &inner.participants[position];
            let Some(emitter) = participant.module.as_emitter() else {
                continue;
            };
            let support = DataEmitterSupport::new(
                inner.id,
                participant.request.clone(),
                Arc::clone(&inner.couplers[position]),
                Arc::clone(&inner.faults),
            );

            if let Err(source) = emitter.request_data(&participant.request, support) {
                inner.cancel("data request failed");
                return Err(ModuleError::DataRequestFailed {
                    id: inner.id,
                    urn: participant.request.urn.clone(),
                    source,
                });
            }
        }

        info!(
            flow = %inner.id,
            modules = %self.describe(),
            coupling = %inner.options.coupling,
            "data flow started"
        );
        Ok(())
    }

    /// Orderly shutdown; stopping a finished flow is a no-op
    pub fn stop(&self) -> ModuleResult<()> {
        self.inner.stop().map(|_| ())
    }

    /// Forced teardown; returns false if the flow had already finished
    pub fn cancel(&self) -> bool {
        self.inner.cancel("requested")
    }

    pub fn id(&self) -> DataFlowId {
        self.inner.id
    }

    pub fn state(&self) -> DataFlowState {
        self.inner.state()
    }

    pub fn options(&self) -> &DataFlowOptions {
        &self.inner.options
    }

    /// Module that created this flow, if any
    pub fn requester(&self) -> Option<&ModuleUrn> {
        self.inner.requester.as_ref()
    }

    pub fn modules(&self) -> Vec<ModuleUrn> {
        self.inner
            .participants
            .iter()
            .map(|p| p.request.urn.clone())
            .collect()
    }

    pub fn involves(&self, urn: &ModuleUrn) -> bool {
        self.inner.participants.iter().any(|p| &p.request.urn == urn)
    }

    pub fn coupler_count(&self) -> usize {
        self.inner.couplers.len()
    }

    /// Subscribe to this flow's error channel
    pub fn errors(&self) -> Receiver<FlowFault> {
        self.inner.faults.subscribe()
    }

    pub fn fault_count(&self) -> u64 {
        self.inner.faults.total()
    }

    pub fn info(&self) -> DataFlowInfo {
        let inner = &self.inner;
        let (state, started_at, finished_at) = {
            let lifecycle = inner.lifecycle.lock();
            (lifecycle.state, lifecycle.started_at, lifecycle.finished_at)
        };

        DataFlowInfo {
            id: inner.id,
            state,
            requester: inner.requester.clone(),
            coupling: inner.options.coupling,
            fault_policy: inner.faults.policy(),
            requests: inner.participants.iter().map(|p| p.request.clone()).collect(),
            couplers: inner
                .couplers
                .iter()
                .map(|c| CouplerInfo {
                    emitter: c.emitter().clone(),
                    receiver: c.receiver().clone(),
                    mode: c.mode(),
                    state: c.state(),
                    stats: c.stats(),
                })
                .collect(),
            fault_count: inner.faults.total(),
            recent_faults: inner.faults.recent(),
            created_at: inner.created_at,
            started_at,
            finished_at,
        }
    }

    fn describe(&self) -> String {
        self.modules()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

impl fmt::Debug for DataFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFlow")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("modules", &self.modules())
            .finish()
    }
}
