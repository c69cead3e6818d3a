//! Modflow Core - Module Runtime and Data-Flow Engine
//!
//! Modflow hosts pluggable modules, created through factories, and wires them
//! into linear data flows. Data moves hop by hop through couplers owned by each
//! flow; the manager only builds, starts, stops and inspects.
//!
//! ## Architecture
//! - **Factories** describe a provider (`provider:type`) and build instances
//!   (`provider:type:instance`)
//! - **Modules** emit, receive, or both, and move through
//!   `Created -> Started -> Stopped -> Deleted`
//! - **Data flows** chain an emitter, any number of relays, and a receiver
//! - **Couplers** deliver synchronously on the emitter's thread or through a
//!   bounded queue and a worker thread
//! - **Faults** go to each flow's error channel; the fault policy decides
//!   whether the flow keeps running
//!
//! ## Core Modules
//! - `module`: module contract, URNs, parameters, data units
//! - `factory`: factory descriptors and sources
//! - `flow`: data flows, couplers, fault handling
//! - `manager`: registry, lifecycle, refresh, management views
//! - `monitoring`: Prometheus metrics and the management HTTP server
//! - `config`: runtime configuration
//! - `testing`: programmable modules for tests

pub mod config;
pub mod errors;
pub mod factory;
pub mod flow;
pub mod manager;
pub mod module;
pub mod monitoring;
pub mod testing;
pub mod utils;

// Re-export the main types
pub use errors::{ModuleError, ModuleResult};
pub use factory::{FactoryCatalog, FactoryDescriptor, FactorySource, FnFactory, ModuleFactory};
pub use flow::{
    CouplingMode, DataFlow, DataFlowId, DataFlowOptions, DataFlowState, FaultPolicy, FlowFault,
};
pub use manager::{ModuleManager, ModuleManagerBuilder};
pub use module::{
    Data, DataEmitter, DataReceiver, DataRequest, Module, ModuleState, ModuleUrn, ParamType,
    ParamValue,
};

/// Prelude for convenient imports
pub mod prelude {
    // Module contract
    pub use crate::module::{
        Capabilities, Data, DataEmitter, DataReceiver, DataRequest, ManagedModule, Module,
        ModuleState, ModuleUrn, ParamType, ParamValue,
    };

    // Factories
    pub use crate::factory::{FactoryCatalog, FactoryDescriptor, FactorySource, FnFactory, ModuleFactory};

    // Flows
    pub use crate::flow::{
        CouplingMode, DataEmitterSupport, DataFlowId, DataFlowOptions, DataFlowState,
        FaultPolicy,
    };

    // Manager
    pub use crate::manager::{DataFlowSupport, ModuleManager, RefreshListener, SinkListener};

    // Error types
    pub use crate::errors::{
        DataRequestError, LifecycleError, ManagementError, ModuleCreationError, ModuleError,
        ModuleResult, ReceiveError,
    };
}
