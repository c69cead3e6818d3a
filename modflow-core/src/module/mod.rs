//! Module contract
//!
//! A module is any component the manager can instantiate and wire into data
//! flows. It exposes an identity ([`ModuleUrn`]), lifecycle hooks, and at
//! least one capability:
//!
//! - **Emit** ([`DataEmitter`]): produces data when a flow requests it, pushing
//!   each unit through the [`DataEmitterSupport`] handed to it.
//! - **Receive** ([`DataReceiver`]): consumes data delivered by a coupler.
//!
//! Modules in the middle of a flow implement both. A module that implements
//! neither is rejected at creation.
//!
//! A module may also run flows of its own through the
//! [`DataFlowSupport`] passed to [`Module::set_flow_support`].

pub mod data;
pub mod params;
pub mod state;
pub mod urn;

pub use data::{parse_flow_requests, Data, DataRequest};
pub use params::{split_param_list, ParamType, ParamValue};
pub use state::{ModuleState, ModuleStateCell};
pub use urn::ModuleUrn;

use crate::errors::{DataRequestError, LifecycleError, ManagementError, ReceiveError};
use crate::flow::{DataEmitterSupport, DataFlowId};
use crate::manager::DataFlowSupport;
use serde::Serialize;

/// A pluggable runtime component
pub trait Module: Send + Sync {
    fn urn(&self) -> &ModuleUrn;

    /// Called before the module enters `Started`; an error keeps the previous state
    fn on_start(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    /// Called before the module enters `Stopped`
    fn on_stop(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    fn as_emitter(&self) -> Option<&dyn DataEmitter> {
        None
    }

    fn as_receiver(&self) -> Option<&dyn DataReceiver> {
        None
    }

    fn management(&self) -> Option<&dyn ManagedModule> {
        None
    }

    /// Receives the handle for creating flows of its own; ignored by default
    fn set_flow_support(&self, _support: DataFlowSupport) {}

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            emit: self.as_emitter().is_some(),
            receive: self.as_receiver().is_some(),
        }
    }
}

/// Emit capability
pub trait DataEmitter: Send + Sync {
    /// Begin producing data for a flow
    ///
    /// May emit synchronously before returning or hand `support` to a thread
    /// of its own. Returning an error rolls the whole flow back.
    fn request_data(
        &self,
        request: &DataRequest,
        support: DataEmitterSupport,
    ) -> Result<(), DataRequestError>;

    /// Stop producing data for a flow
    ///
    /// Must not block on the emitting thread: it can be invoked from that
    /// thread when the flow cancels itself. Unknown ids are ignored.
    fn cancel_request(&self, flow_id: &DataFlowId);
}

/// Receive capability
pub trait DataReceiver: Send + Sync {
    fn receive(&self, flow_id: &DataFlowId, data: Data) -> Result<(), ReceiveError>;
}

/// Optional management contract exposed through the introspection surface
pub trait ManagedModule: Send + Sync {
    /// Short human-readable status line
    fn status(&self) -> String;

    fn feature_tags(&self) -> Vec<String> {
        Vec::new()
    }

    fn reconnect(&self) -> Result<(), ManagementError> {
        Err(ManagementError::Unsupported {
            operation: "reconnect",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Capabilities {
    pub emit: bool,
    pub receive: bool,
}

impl Capabilities {
    pub fn is_empty(&self) -> bool {
        !self.emit && !self.receive
    }

    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags = Vec::with_capacity(2);
        if self.emit {
            tags.push("emit");
        }
        if self.receive {
            tags.push("receive");
        }
        tags
    }
}
