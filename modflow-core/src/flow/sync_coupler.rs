//! Synchronous coupler: the emitter's thread runs the receiver
//!
//! `emit` returns only after `receive` returns, so receiver errors reach the
//! emitter directly. Shutdown only flips the state; a receive already in
//! progress finishes normally.

use super::coupler::{CouplerCore, CouplerState, CouplerStats, CouplingMode, DataCoupler};
use crate::errors::DeliveryError;
use crate::module::{Data, ModuleUrn};
use tracing::debug;

pub struct SyncCoupler {
    core: CouplerCore,
}

impl SyncCoupler {
    pub(crate) fn new(core: CouplerCore) -> Self {
        Self { core }
    }
}

impl DataCoupler for SyncCoupler {
    fn mode(&self) -> CouplingMode {
        CouplingMode::Sync
    }

    fn emitter(&self) -> &ModuleUrn {
        &self.core.emitter
    }

    fn receiver(&self) -> &ModuleUrn {
        &self.core.receiver_urn
    }

    fn start(&self) -> std::io::Result<()> {
        if self.core.begin() {
            debug!(
                flow = %self.core.flow_id,
                emitter = %self.core.emitter,
                receiver = %self.core.receiver_urn,
                "sync coupler running"
            );
        }
        Ok(())
    }

    fn emit(&self, data: Data) -> Result<(), DeliveryError> {
        if !self.core.is_running() {
            return Err(self.core.not_accepting());
        }
        self.core.record_emitted();
        self.core.deliver(data)
    }

    fn signal(&self, target: CouplerState) -> bool {
        self.core.finish(target)
    }

    fn settle(&self) {}

    fn state(&self) -> CouplerState {
        self.core.state()
    }

    fn stats(&self) -> CouplerStats {
        self.core.stats(0)
    }
}
