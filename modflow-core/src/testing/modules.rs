//! Programmable modules for exercising flows

use crate::errors::{DataRequestError, DeliveryError, LifecycleError, ReceiveError};
use crate::flow::{DataEmitterSupport, DataFlowId};
use crate::manager::DataFlowSupport;
use crate::module::{Data, DataEmitter, DataReceiver, DataRequest, Module, ModuleUrn};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Receive-only module that records everything it accepts
pub struct RecordingReceiver {
    urn: ModuleUrn,
    received: Mutex<Vec<(DataFlowId, Data)>>,
    arrived: Condvar,
    calls: AtomicUsize,
    delays: Vec<Duration>,
    fail_every: Option<usize>,
    fail_start: bool,
}

impl RecordingReceiver {
    pub fn new(urn: ModuleUrn) -> Self {
        Self {
            urn,
            received: Mutex::new(Vec::new()),
            arrived: Condvar::new(),
            calls: AtomicUsize::new(0),
            delays: Vec::new(),
            fail_every: None,
            fail_start: false,
        }
    }

    /// Sleep this long inside every receive
    pub fn with_delay(self, delay: Duration) -> Self {
        self.with_delays(vec![delay])
    }

    /// Sleep `delays[n % len]` inside the n-th receive
    pub fn with_delays(mut self, delays: Vec<Duration>) -> Self {
        self.delays = delays;
        self
    }

    /// Reject every n-th unit (1-based)
    pub fn failing_every(mut self, n: usize) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    /// Make `on_start` fail
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Number of receive calls, accepted or not
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }

    pub fn count(&self) -> usize {
        self.received.lock().len()
    }

    /// Accepted values of type `T`, in arrival order
    pub fn values<T: Clone + 'static>(&self) -> Vec<T> {
        self.received
            .lock()
            .iter()
            .filter_map(|(_, data)| data.downcast_ref::<T>().cloned())
            .collect()
    }

    pub fn flows(&self) -> Vec<DataFlowId> {
        self.received.lock().iter().map(|(id, _)| *id).collect()
    }

    /// Block until `count` units were accepted or `timeout` elapsed
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut received = self.received.lock();
        while received.len() < count {
            if self.arrived.wait_until(&mut received, deadline).timed_out() {
                return received.len() >= count;
            }
        }
        true
    }
}

impl Module for RecordingReceiver {
    fn urn(&self) -> &ModuleUrn {
        &self.urn
    }

    fn on_start(&self) -> Result<(), LifecycleError> {
        if self.fail_start {
            return Err(LifecycleError(format!("{} refuses to start", self.urn)));
        }
        Ok(())
    }

    fn as_receiver(&self) -> Option<&dyn DataReceiver> {
        Some(self)
    }
}

impl DataReceiver for RecordingReceiver {
    fn receive(&self, flow_id: &DataFlowId, data: Data) -> Result<(), ReceiveError> {
        let call = self.calls.fetch_add(1, Ordering::AcqRel);

        if !self.delays.is_empty() {
            std::thread::sleep(self.delays[call % self.delays.len()]);
        }

        if let Some(n) = self.fail_every {
            if (call + 1) % n == 0 {
                return Err(ReceiveError::Rejected(format!("unit {} rejected", call + 1)));
            }
        }

        self.received.lock().push((*flow_id, data));
        self.arrived.notify_all();
        Ok(())
    }
}

/// Emit-only module; the test decides when data goes out
pub struct ManualSource {
    urn: ModuleUrn,
    supports: DashMap<DataFlowId, DataEmitterSupport>,
    requests: Mutex<Vec<DataRequest>>,
    cancelled: Mutex<Vec<DataFlowId>>,
    fail_requests: AtomicBool,
}

impl ManualSource {
    pub fn new(urn: ModuleUrn) -> Self {
        Self {
            urn,
            supports: DashMap::new(),
            requests: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            fail_requests: AtomicBool::new(false),
        }
    }

    /// Make subsequent data requests fail
    pub fn set_fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::Release);
    }

    /// Send `data` into every flow this source currently serves
    pub fn emit(&self, data: Data) -> Vec<Result<(), DeliveryError>> {
        // Clone first: a send may tear the flow down and call back into cancel_request
        let supports: Vec<DataEmitterSupport> =
            self.supports.iter().map(|s| s.value().clone()).collect();
        supports.iter().map(|s| s.send(data.clone())).collect()
    }

    /// Send into one flow; `None` if this source does not serve it
    pub fn emit_to(&self, flow_id: &DataFlowId, data: Data) -> Option<Result<(), DeliveryError>> {
        let support = self.support(flow_id)?;
        Some(support.send(data))
    }

    pub fn support(&self, flow_id: &DataFlowId) -> Option<DataEmitterSupport> {
        self.supports.get(flow_id).map(|s| s.value().clone())
    }

    pub fn active_flows(&self) -> Vec<DataFlowId> {
        self.supports.iter().map(|s| *s.key()).collect()
    }

    pub fn requests(&self) -> Vec<DataRequest> {
        self.requests.lock().clone()
    }

    pub fn cancelled(&self) -> Vec<DataFlowId> {
        self.cancelled.lock().clone()
    }
}

impl Module for ManualSource {
    fn urn(&self) -> &ModuleUrn {
        &self.urn
    }

    fn as_emitter(&self) -> Option<&dyn DataEmitter> {
        Some(self)
    }
}

impl DataEmitter for ManualSource {
    fn request_data(
        &self,
        request: &DataRequest,
        support: DataEmitterSupport,
    ) -> Result<(), DataRequestError> {
        if self.fail_requests.load(Ordering::Acquire) {
            return Err(DataRequestError::Failed(format!(
                "{} refuses requests",
                self.urn
            )));
        }
        self.requests.lock().push(request.clone());
        self.supports.insert(support.flow_id(), support);
        Ok(())
    }

    fn cancel_request(&self, flow_id: &DataFlowId) {
        if self.supports.remove(flow_id).is_some() {
            self.cancelled.lock().push(*flow_id);
        }
    }
}

/// Receive-only module that keeps the handle for running flows of its own
pub struct FlowInitiator {
    urn: ModuleUrn,
    support: Mutex<Option<DataFlowSupport>>,
    received: AtomicUsize,
}

impl FlowInitiator {
    pub fn new(urn: ModuleUrn) -> Self {
        Self {
            urn,
            support: Mutex::new(None),
            received: AtomicUsize::new(0),
        }
    }

    /// Set by the manager at creation
    pub fn support(&self) -> Option<DataFlowSupport> {
        self.support.lock().clone()
    }

    pub fn received(&self) -> usize {
        self.received.load(Ordering::Acquire)
    }
}

impl Module for FlowInitiator {
    fn urn(&self) -> &ModuleUrn {
        &self.urn
    }

    fn as_receiver(&self) -> Option<&dyn DataReceiver> {
        Some(self)
    }

    fn set_flow_support(&self, support: DataFlowSupport) {
        *self.support.lock() = Some(support);
    }
}

impl DataReceiver for FlowInitiator {
    fn receive(&self, _flow_id: &DataFlowId, _data: Data) -> Result<(), ReceiveError> {
        self.received.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// Forwards every received unit downstream unchanged
pub struct Relay {
    urn: ModuleUrn,
    supports: DashMap<DataFlowId, DataEmitterSupport>,
}

impl Relay {
    pub fn new(urn: ModuleUrn) -> Self {
        Self {
            urn,
            supports: DashMap::new(),
        }
    }
}

impl Module for Relay {
    fn urn(&self) -> &ModuleUrn {
        &self.urn
    }

    fn as_emitter(&self) -> Option<&dyn DataEmitter> {
        Some(self)
    }

    fn as_receiver(&self) -> Option<&dyn DataReceiver> {
        Some(self)
    }
}

impl DataEmitter for Relay {
    fn request_data(
        &self,
        _request: &DataRequest,
        support: DataEmitterSupport,
    ) -> Result<(), DataRequestError> {
        self.supports.insert(support.flow_id(), support);
        Ok(())
    }

    fn cancel_request(&self, flow_id: &DataFlowId) {
        self.supports.remove(flow_id);
    }
}

impl DataReceiver for Relay {
    fn receive(&self, flow_id: &DataFlowId, data: Data) -> Result<(), ReceiveError> {
        let support = self.supports.get(flow_id).map(|s| s.value().clone());
        match support {
            Some(support) => support
                .send(data)
                .map_err(|e| ReceiveError::Rejected(e.to_string())),
            None => Ok(()),
        }
    }
}
