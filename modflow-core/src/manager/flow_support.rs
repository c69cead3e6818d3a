//! Handle through which a module runs data flows of its own

use super::ModuleManager;
use crate::errors::{ModuleError, ModuleResult};
use crate::flow::{DataFlowId, DataFlowOptions};
use crate::module::{DataRequest, ModuleUrn};
use std::fmt;
use std::sync::{Arc, Weak};

/// Lets a module create and cancel flows tagged with its URN
///
/// Handed to every module right after creation. Flows created here are
/// listed as module-created, can only be torn down through this handle (or
/// manager shutdown), and are cancelled when the module stops or is deleted.
///
/// `on_start` and `on_stop` run under the manager lock; calling into this
/// handle from them blocks forever. Use it from data callbacks or threads.
#[derive(Clone)]
pub struct DataFlowSupport {
    manager: Weak<ModuleManager>,
    requester: ModuleUrn,
}

impl DataFlowSupport {
    pub(crate) fn new(manager: Weak<ModuleManager>, requester: ModuleUrn) -> Self {
        Self { manager, requester }
    }

    /// URN every flow created through this handle is tagged with
    pub fn requester(&self) -> &ModuleUrn {
        &self.requester
    }

    /// Create and start a flow with the manager's default options
    pub fn create_data_flow(&self, requests: &[DataRequest]) -> ModuleResult<DataFlowId> {
        let manager = self.manager()?;
        let options = manager.default_flow_options();
        manager.create_flow(requests, options, Some(&self.requester))
    }

    pub fn create_data_flow_with(
        &self,
        requests: &[DataRequest],
        options: DataFlowOptions,
    ) -> ModuleResult<DataFlowId> {
        self.manager()?
            .create_flow(requests, options, Some(&self.requester))
    }

    /// Cancel a flow this module created; finished flows are a no-op
    pub fn cancel_data_flow(&self, id: DataFlowId) -> ModuleResult<()> {
        self.manager()?.teardown_flow(id, Some(&self.requester), false)
    }

    fn manager(&self) -> ModuleResult<Arc<ModuleManager>> {
        self.manager.upgrade().ok_or(ModuleError::ShutDown)
    }
}

impl fmt::Debug for DataFlowSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFlowSupport")
            .field("requester", &self.requester)
            .finish()
    }
}
