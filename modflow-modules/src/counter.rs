//! Emits an increasing `u64` sequence on a timer
//!
//! `counter:seq` takes one `Int` parameter, the tick interval in
//! milliseconds. Each flow gets its own ticker thread; all tickers of one
//! instance share the sequence. `reconnect` restarts it from zero.

use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use dashmap::DashMap;
use modflow_core::errors::{DataRequestError, ManagementError, ModuleCreationError, UrnError};
use modflow_core::factory::{FactoryDescriptor, FnFactory, ModuleFactory};
use modflow_core::flow::{DataEmitterSupport, DataFlowId};
use modflow_core::module::{
    Data, DataEmitter, DataRequest, ManagedModule, Module, ModuleUrn, ParamType,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

pub const PROVIDER: &str = "counter:seq";

struct Ticker {
    /// Dropping it stops the thread
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl Ticker {
    fn stop(self) {
        drop(self.stop_tx);
        // A fail-fast teardown can run on the ticker thread itself
        if self.handle.thread().id() == thread::current().id() {
            return;
        }
        if self.handle.join().is_err() {
            warn!("counter ticker panicked");
        }
    }
}

pub struct CounterModule {
    urn: ModuleUrn,
    interval: Duration,
    next: Arc<AtomicU64>,
    tickers: DashMap<DataFlowId, Ticker>,
}

impl CounterModule {
    pub fn new(urn: ModuleUrn, interval: Duration) -> Self {
        Self {
            urn,
            interval,
            next: Arc::new(AtomicU64::new(0)),
            tickers: DashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Value the next tick will emit
    pub fn next_value(&self) -> u64 {
        self.next.load(Ordering::Acquire)
    }

    pub fn active_flows(&self) -> usize {
        self.tickers.len()
    }

    fn spawn_ticker(&self, support: DataEmitterSupport) -> std::io::Result<Ticker> {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let next = Arc::clone(&self.next);
        let interval = self.interval;
        let urn = self.urn.clone();

        let handle = thread::Builder::new()
            .name(format!("counter-{}", support.flow_id()))
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let value = next.fetch_add(1, Ordering::AcqRel);
                        if let Err(e) = support.send(Data::new(value)) {
                            debug!(module = %urn, flow = %support.flow_id(), error = %e, "tick not delivered");
                            if !support.is_active() {
                                break;
                            }
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Ticker { stop_tx, handle })
    }
}

impl Module for CounterModule {
    fn urn(&self) -> &ModuleUrn {
        &self.urn
    }

    fn as_emitter(&self) -> Option<&dyn DataEmitter> {
        Some(self)
    }

    fn management(&self) -> Option<&dyn ManagedModule> {
        Some(self)
    }
}

impl DataEmitter for CounterModule {
    fn request_data(
        &self,
        _request: &DataRequest,
        support: DataEmitterSupport,
    ) -> Result<(), DataRequestError> {
        let flow_id = support.flow_id();
        let ticker = self
            .spawn_ticker(support)
            .map_err(|e| DataRequestError::Failed(format!("cannot spawn ticker: {e}")))?;
        if let Some(previous) = self.tickers.insert(flow_id, ticker) {
            previous.stop();
        }
        Ok(())
    }

    fn cancel_request(&self, flow_id: &DataFlowId) {
        // Remove first so the map guard is released before joining
        if let Some((_, ticker)) = self.tickers.remove(flow_id) {
            ticker.stop();
        }
    }
}

impl ManagedModule for CounterModule {
    fn status(&self) -> String {
        format!(
            "next {}, every {:?}, {} active flow(s)",
            self.next_value(),
            self.interval,
            self.active_flows()
        )
    }

    fn feature_tags(&self) -> Vec<String> {
        vec!["timer".to_string()]
    }

    fn reconnect(&self) -> Result<(), ManagementError> {
        self.next.store(0, Ordering::Release);
        Ok(())
    }
}

impl Drop for CounterModule {
    fn drop(&mut self) {
        let flows: Vec<DataFlowId> = self.tickers.iter().map(|t| *t.key()).collect();
        for flow_id in flows {
            self.cancel_request(&flow_id);
        }
    }
}

pub fn factory() -> Result<Arc<dyn ModuleFactory>, UrnError> {
    let descriptor = FactoryDescriptor::new(ModuleUrn::parse(PROVIDER)?, "Timed sequence")
        .params([ParamType::Int]);

    Ok(Arc::new(FnFactory::new(descriptor, |urn, params| {
        let interval_ms = params.first().and_then(|p| p.as_int()).unwrap_or(0);
        if interval_ms <= 0 {
            return Err(ModuleCreationError::new(format!(
                "interval must be positive, got {interval_ms} ms"
            )));
        }
        Ok(Arc::new(CounterModule::new(
            urn.clone(),
            Duration::from_millis(interval_ms as u64),
        )) as Arc<dyn Module>)
    })))
}
