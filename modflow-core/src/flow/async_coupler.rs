//! Asynchronous coupler: bounded FIFO plus one worker thread
//!
//! The emitter only waits while the queue is full; nothing is ever dropped
//! on the way in. A single worker preserves emit order.
//!
//! Shutdown uses a zero-capacity channel that never carries a message:
//! dropping its only sender disconnects it, which wakes both the worker and
//! any emitter blocked on a full queue in the same `select!`.

use super::coupler::{CouplerCore, CouplerState, CouplerStats, CouplingMode, DataCoupler};
use crate::errors::DeliveryError;
use crate::module::{Data, ModuleUrn};
use crossbeam::channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

pub struct AsyncCoupler {
    core: Arc<CouplerCore>,
    data_tx: Sender<Data>,
    data_rx: Receiver<Data>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncCoupler {
    pub(crate) fn new(core: CouplerCore, capacity: usize) -> Self {
        let (data_tx, data_rx) = bounded(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = bounded(0);

        Self {
            core: Arc::new(core),
            data_tx,
            data_rx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            worker: Mutex::new(None),
        }
    }

    fn worker_loop(core: Arc<CouplerCore>, data: Receiver<Data>, shutdown: Receiver<()>) {
        loop {
            select! {
                recv(shutdown) -> _ => break,
                recv(data) -> msg => match msg {
                    Ok(unit) if core.is_running() => {
                        // Failures are counted and published by the core
                        let _ = core.deliver(unit);
                    }
                    Ok(_) => core.record_discarded(1),
                    Err(_) => break,
                },
            }
        }

        debug!(
            flow = %core.flow_id,
            receiver = %core.receiver_urn,
            "async coupler worker stopping"
        );
    }

    /// Drop whatever is still queued
    fn drain(&self) -> u64 {
        let discarded = self.data_rx.try_iter().count() as u64;
        self.core.record_discarded(discarded);
        discarded
    }
}

impl DataCoupler for AsyncCoupler {
    fn mode(&self) -> CouplingMode {
        CouplingMode::Async
    }

    fn emitter(&self) -> &ModuleUrn {
        &self.core.emitter
    }

    fn receiver(&self) -> &ModuleUrn {
        &self.core.receiver_urn
    }

    fn start(&self) -> std::io::Result<()> {
        if !self.core.begin() {
            return Ok(());
        }

        let core = Arc::clone(&self.core);
        let data = self.data_rx.clone();
        let shutdown = self.shutdown_rx.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-{}", core.flow_id, core.receiver_urn.instance()))
            .spawn(move || Self::worker_loop(core, data, shutdown))?;

        *self.worker.lock() = Some(handle);
        debug!(
            flow = %self.core.flow_id,
            emitter = %self.core.emitter,
            receiver = %self.core.receiver_urn,
            capacity = self.data_tx.capacity().unwrap_or_default(),
            "async coupler running"
        );
        Ok(())
    }

    fn emit(&self, data: Data) -> Result<(), DeliveryError> {
        if !self.core.is_running() {
            return Err(self.core.not_accepting());
        }

        select! {
            send(self.data_tx, data) -> res => {
                if res.is_err() {
                    return Err(DeliveryError::Cancelled);
                }
            }
            recv(self.shutdown_rx) -> _ => return Err(DeliveryError::Cancelled),
        }
        self.core.record_emitted();

        // Lost the race with shutdown after the queue already drained
        if !self.core.is_running() {
            self.drain();
        }
        Ok(())
    }

    fn signal(&self, target: CouplerState) -> bool {
        if !self.core.finish(target) {
            return false;
        }
        self.shutdown_tx.lock().take();
        true
    }

    fn settle(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Tearing down from inside our own worker; it exits on its next turn
                debug!(flow = %self.core.flow_id, "async coupler settled from its worker");
            } else if handle.join().is_err() {
                error!(
                    flow = %self.core.flow_id,
                    receiver = %self.core.receiver_urn,
                    "async coupler worker panicked"
                );
            }
        }

        let discarded = self.drain();
        if discarded > 0 {
            debug!(
                flow = %self.core.flow_id,
                receiver = %self.core.receiver_urn,
                discarded,
                "discarded undelivered data"
            );
        }
    }

    fn state(&self) -> CouplerState {
        self.core.state()
    }

    fn stats(&self) -> CouplerStats {
        self.core.stats(self.data_rx.len() as u64)
    }
}

impl Drop for AsyncCoupler {
    fn drop(&mut self) {
        self.signal(CouplerState::Cancelled);
        self.settle();
    }
}
