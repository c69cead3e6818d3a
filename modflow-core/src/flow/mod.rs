//! Data flows and the couplers that move data between modules
//!
//! Data never passes through the manager: each hop of a flow is a
//! [`DataCoupler`] owned by the flow, and emitters push into it through
//! their [`DataEmitterSupport`].

pub mod async_coupler;
pub mod coupler;
pub mod data_flow;
pub mod faults;
pub mod id;
pub mod support;
pub mod sync_coupler;

pub use async_coupler::AsyncCoupler;
pub use coupler::{CouplerState, CouplerStats, CouplerTracker, CouplingMode, DataCoupler};
pub use data_flow::{
    CouplerInfo, DataFlow, DataFlowInfo, DataFlowOptions, DataFlowState, FlowParticipant,
};
pub use faults::{FaultKind, FaultPolicy, FlowFault};
pub use id::DataFlowId;
pub use support::DataEmitterSupport;
pub use sync_coupler::SyncCoupler;
