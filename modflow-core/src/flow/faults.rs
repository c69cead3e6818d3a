//! Per-flow fault recording and publication
//!
//! Every delivery failure and every emitter-reported error becomes a
//! [`FlowFault`]. Faults are kept in a small ring for introspection, counted,
//! and published on the flow's error channel. Whether a fault tears the flow
//! down is decided by the flow's [`FaultPolicy`].

use super::data_flow::FlowInner;
use super::DataFlowId;
use crate::config::{FAULT_CHANNEL_CAPACITY, MAX_RECENT_FAULTS};
use crate::errors::DeliveryError;
use crate::module::ModuleUrn;
use crate::utils::now_millis;
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    /// Record and publish delivery errors; keep the flow running
    #[default]
    ContinueOnError,
    /// The first delivery error cancels the flow
    FailFast,
}

impl fmt::Display for FaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultPolicy::ContinueOnError => f.write_str("continue_on_error"),
            FaultPolicy::FailFast => f.write_str("fail_fast"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultKind {
    /// A coupler could not hand data to its receiver
    Delivery,
    /// The emitting module reported an error itself
    Emitter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowFault {
    pub flow_id: DataFlowId,
    pub kind: FaultKind,
    pub emitter: ModuleUrn,
    pub receiver: Option<ModuleUrn>,
    pub message: String,
    /// Unix millis
    pub at: u64,
}

pub(crate) struct FlowFaults {
    flow_id: DataFlowId,
    policy: FaultPolicy,
    recent: Mutex<VecDeque<FlowFault>>,
    total: AtomicU64,
    tx: Sender<FlowFault>,
    rx: Receiver<FlowFault>,
    flow: Weak<FlowInner>,
}

impl FlowFaults {
    pub(crate) fn new(flow_id: DataFlowId, policy: FaultPolicy, flow: Weak<FlowInner>) -> Self {
        let (tx, rx) = bounded(FAULT_CHANNEL_CAPACITY);
        Self {
            flow_id,
            policy,
            recent: Mutex::new(VecDeque::with_capacity(MAX_RECENT_FAULTS)),
            total: AtomicU64::new(0),
            tx,
            rx,
            flow,
        }
    }

    pub(crate) fn delivery_failed(
        &self,
        emitter: &ModuleUrn,
        receiver: &ModuleUrn,
        err: &DeliveryError,
    ) {
        let fault = FlowFault {
            flow_id: self.flow_id,
            kind: FaultKind::Delivery,
            emitter: emitter.clone(),
            receiver: Some(receiver.clone()),
            message: err.to_string(),
            at: now_millis(),
        };
        self.record(fault, self.policy == FaultPolicy::FailFast);
    }

    pub(crate) fn emitter_failed(&self, emitter: &ModuleUrn, message: String, stop_flow: bool) {
        let fault = FlowFault {
            flow_id: self.flow_id,
            kind: FaultKind::Emitter,
            emitter: emitter.clone(),
            receiver: None,
            message,
            at: now_millis(),
        };
        self.record(fault, stop_flow);
    }

    fn record(&self, fault: FlowFault, cancel_flow: bool) {
        warn!(
            flow = %fault.flow_id,
            emitter = %fault.emitter,
            kind = ?fault.kind,
            "data flow fault: {}",
            fault.message
        );

        self.total.fetch_add(1, Ordering::Relaxed);
        {
            let mut recent = self.recent.lock();
            if recent.len() == MAX_RECENT_FAULTS {
                recent.pop_front();
            }
            recent.push_back(fault.clone());
        }

        if let Err(TrySendError::Full(_)) = self.tx.try_send(fault) {
            debug!(flow = %self.flow_id, "fault channel full, fault kept in recent list only");
        }

        if cancel_flow {
            if let Some(flow) = self.flow.upgrade() {
                flow.cancel("fault");
            }
        }
    }

    pub(crate) fn subscribe(&self) -> Receiver<FlowFault> {
        self.rx.clone()
    }

    pub(crate) fn recent(&self) -> Vec<FlowFault> {
        self.recent.lock().iter().cloned().collect()
    }

    pub(crate) fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub(crate) fn policy(&self) -> FaultPolicy {
        self.policy
    }
}
