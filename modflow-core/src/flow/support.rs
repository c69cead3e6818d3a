use super::coupler::{CouplerState, DataCoupler};
use super::faults::FlowFaults;
use super::DataFlowId;
use crate::errors::DeliveryError;
use crate::module::{Data, DataRequest, ModuleUrn};
use std::fmt;
use std::sync::Arc;

/// Handle an emitter uses to push data into its flow
///
/// One handle per (flow, emitter). It is cheap to clone, so modules that
/// emit from their own threads can keep a copy per flow.
#[derive(Clone)]
pub struct DataEmitterSupport {
    flow_id: DataFlowId,
    emitter: ModuleUrn,
    request: DataRequest,
    coupler: Arc<dyn DataCoupler>,
    faults: Arc<FlowFaults>,
}

impl DataEmitterSupport {
    pub(crate) fn new(
        flow_id: DataFlowId,
        request: DataRequest,
        coupler: Arc<dyn DataCoupler>,
        faults: Arc<FlowFaults>,
    ) -> Self {
        Self {
            flow_id,
            emitter: request.urn.clone(),
            request,
            coupler,
            faults,
        }
    }

    pub fn flow_id(&self) -> DataFlowId {
        self.flow_id
    }

    pub fn request(&self) -> &DataRequest {
        &self.request
    }

    /// Push one unit downstream
    ///
    /// Sync flows return the receiver's verdict; async flows return once the
    /// unit is queued.
    pub fn send(&self, data: Data) -> Result<(), DeliveryError> {
        self.coupler.emit(data)
    }

    /// Report a problem on the emitting side; `stop_flow` cancels the flow
    pub fn emit_error(&self, message: impl Into<String>, stop_flow: bool) {
        self.faults
            .emitter_failed(&self.emitter, message.into(), stop_flow);
    }

    /// False once the flow started tearing down
    pub fn is_active(&self) -> bool {
        self.coupler.state() == CouplerState::Running
    }
}

impl fmt::Debug for DataEmitterSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataEmitterSupport")
            .field("flow_id", &self.flow_id)
            .field("emitter", &self.emitter)
            .field("receiver", self.coupler.receiver())
            .finish()
    }
}
