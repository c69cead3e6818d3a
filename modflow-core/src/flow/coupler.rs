//! Data coupler contract and shared delivery core
//!
//! A coupler binds one emitter to one receiver for one flow. It lives exactly
//! as long as the flow and is never reused.
//!
//! ```text
//!  ┌──────┐  start   ┌─────────┐  signal(Stopped)   ┌─────────┐
//!  │ Idle │───────▶│ Running │──────────────────▶│ Stopped │
//!  └──┬───┘          └────┬────┘                    └─────────┘
//!     │                   │ signal(Cancelled)
//!     └───────────────────┴──────────────────────▶ Cancelled
//! ```
//!
//! Shutdown is split in two phases so a flow can release every blocked
//! emitter before waiting on any worker:
//! - [`DataCoupler::signal`] flips the state and wakes blocked emitters
//! - [`DataCoupler::settle`] waits for in-flight delivery and discards leftovers

use super::faults::FlowFaults;
use super::DataFlowId;
use crate::errors::{DeliveryError, ReceiveError};
use crate::module::{Data, Module, ModuleState, ModuleStateCell, ModuleUrn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouplingMode {
    /// Delivery inline on the emitter's thread
    #[default]
    Sync,
    /// Bounded queue drained by a dedicated worker thread
    Async,
}

impl fmt::Display for CouplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CouplingMode::Sync => f.write_str("sync"),
            CouplingMode::Async => f.write_str("async"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CouplerState {
    Idle = 0,
    Running = 1,
    Stopped = 2,
    Cancelled = 3,
}

impl From<u8> for CouplerState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Stopped,
            _ => Self::Cancelled,
        }
    }
}

impl CouplerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CouplerState::Stopped | CouplerState::Cancelled)
    }
}

impl fmt::Display for CouplerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CouplerState::Idle => "idle",
            CouplerState::Running => "running",
            CouplerState::Stopped => "stopped",
            CouplerState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CouplerStats {
    /// Units accepted from the emitter
    pub emitted: u64,
    /// Units the receiver accepted
    pub delivered: u64,
    /// Units the receiver rejected or could not take
    pub failed: u64,
    /// Units dropped from the queue at shutdown
    pub discarded: u64,
    pub queue_depth: u64,
}

pub trait DataCoupler: Send + Sync {
    fn mode(&self) -> CouplingMode;

    fn emitter(&self) -> &ModuleUrn;

    fn receiver(&self) -> &ModuleUrn;

    /// Idle -> Running; spawns the worker for async couplers
    fn start(&self) -> std::io::Result<()>;

    /// Hand one unit to the receiver
    fn emit(&self, data: Data) -> Result<(), DeliveryError>;

    /// First shutdown phase; returns false if already terminal
    fn signal(&self, target: CouplerState) -> bool;

    /// Second shutdown phase
    fn settle(&self);

    fn stop(&self) {
        if self.signal(CouplerState::Stopped) {
            self.settle();
        }
    }

    fn cancel(&self) {
        if self.signal(CouplerState::Cancelled) {
            self.settle();
        }
    }

    fn state(&self) -> CouplerState;

    fn stats(&self) -> CouplerStats;
}

/// Counts live couplers across all flows of one manager
#[derive(Debug, Clone, Default)]
pub struct CouplerTracker {
    live: Arc<AtomicUsize>,
}

impl CouplerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub(crate) fn track(&self) -> CouplerGuard {
        self.live.fetch_add(1, Ordering::AcqRel);
        CouplerGuard {
            live: Arc::clone(&self.live),
        }
    }
}

/// Decrements the tracker when the owning coupler is dropped
#[derive(Debug)]
pub(crate) struct CouplerGuard {
    live: Arc<AtomicUsize>,
}

impl Drop for CouplerGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Everything one hop needs to deliver data, shared with an async worker
pub(crate) struct CouplerCore {
    pub(crate) flow_id: DataFlowId,
    pub(crate) emitter: ModuleUrn,
    pub(crate) receiver_urn: ModuleUrn,
    receiver: Arc<dyn Module>,
    receiver_state: ModuleStateCell,
    state: AtomicU8,
    emitted: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
    faults: Arc<FlowFaults>,
    _guard: CouplerGuard,
}

impl CouplerCore {
    pub(crate) fn new(
        flow_id: DataFlowId,
        emitter: ModuleUrn,
        receiver: Arc<dyn Module>,
        receiver_state: ModuleStateCell,
        faults: Arc<FlowFaults>,
        tracker: &CouplerTracker,
    ) -> Self {
        Self {
            flow_id,
            emitter,
            receiver_urn: receiver.urn().clone(),
            receiver,
            receiver_state,
            state: AtomicU8::new(CouplerState::Idle as u8),
            emitted: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            faults,
            _guard: tracker.track(),
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> CouplerState {
        CouplerState::from(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn is_running(&self) -> bool {
        self.state() == CouplerState::Running
    }

    pub(crate) fn begin(&self) -> bool {
        self.state
            .compare_exchange(
                CouplerState::Idle as u8,
                CouplerState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to a terminal state from Idle or Running
    pub(crate) fn finish(&self, target: CouplerState) -> bool {
        debug_assert!(target.is_terminal());
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if CouplerState::from(current).is_terminal() {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                target as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn not_accepting(&self) -> DeliveryError {
        DeliveryError::NotAccepting {
            state: self.state(),
        }
    }

    pub(crate) fn record_emitted(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self, count: u64) {
        if count > 0 {
            self.discarded.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Call the receiver, counting and reporting the outcome
    pub(crate) fn deliver(&self, data: Data) -> Result<(), DeliveryError> {
        let receiver_state = self.receiver_state.load();
        if receiver_state != ModuleState::Started {
            return Err(self.fail(DeliveryError::ReceiverNotStarted {
                receiver: self.receiver_urn.clone(),
                state: receiver_state,
            }));
        }

        let Some(receiver) = self.receiver.as_receiver() else {
            return Err(self.fail(DeliveryError::Receiver {
                receiver: self.receiver_urn.clone(),
                source: ReceiveError::Rejected("module has no receive capability".to_string()),
            }));
        };

        match receiver.receive(&self.flow_id, data) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(source) => Err(self.fail(DeliveryError::Receiver {
                receiver: self.receiver_urn.clone(),
                source,
            })),
        }
    }

    fn fail(&self, err: DeliveryError) -> DeliveryError {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.faults.delivery_failed(&self.emitter, &self.receiver_urn, &err);
        err
    }

    pub(crate) fn stats(&self, queue_depth: u64) -> CouplerStats {
        CouplerStats {
            emitted: self.emitted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            queue_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_counts_guards() {
        let tracker = CouplerTracker::new();
        let a = tracker.track();
        let b = tracker.track();
        assert_eq!(tracker.live(), 2);

        drop(a);
        assert_eq!(tracker.live(), 1);
        drop(b);
        assert_eq!(tracker.live(), 0);
    }

    #[test]
    fn test_coupler_state_roundtrip() {
        for state in [
            CouplerState::Idle,
            CouplerState::Running,
            CouplerState::Stopped,
            CouplerState::Cancelled,
        ] {
            assert_eq!(CouplerState::from(state as u8), state);
        }
        assert!(CouplerState::Cancelled.is_terminal());
        assert!(!CouplerState::Running.is_terminal());
    }
}
