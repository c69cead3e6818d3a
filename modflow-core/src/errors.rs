//! Error taxonomy for the module runtime
//!
//! Each layer gets its own enum so callers can match on exactly what failed:
//! - [`UrnError`] / [`ParamError`]: malformed input
//! - [`ModuleCreationError`], [`LifecycleError`], [`ReceiveError`],
//!   [`DataRequestError`], [`ManagementError`]: failures reported by module code
//! - [`DeliveryError`]: coupler-level delivery outcome
//! - [`ModuleError`]: everything the [`ModuleManager`](crate::manager::ModuleManager)
//!   and [`DataFlow`](crate::flow::DataFlow) surface to callers
//!
//! A failed manager operation never leaves the registry changed.

use crate::flow::{CouplerState, DataFlowId, DataFlowState};
use crate::module::{ModuleState, ModuleUrn, ParamType};
use thiserror::Error;

/// Malformed module URN text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrnError {
    #[error("module URN is empty")]
    Empty,

    #[error("module URN '{0}' has more than three components")]
    TooManyComponents(String),

    #[error("module URN '{0}' has an empty component")]
    EmptyComponent(String),

    #[error("module URN '{urn}' contains invalid character {ch:?}")]
    InvalidCharacter { urn: String, ch: char },

    #[error("'{0}' is not a provider URN (expected provider:type)")]
    NotProvider(String),
}

/// A raw string could not be converted to the requested parameter type
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("cannot convert '{raw}' to {expected}: {reason}")]
    Conversion {
        raw: String,
        expected: ParamType,
        reason: String,
    },
}

/// Factory-level (semantic) rejection of a module instance
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{cause}")]
pub struct ModuleCreationError {
    pub cause: String,
}

impl ModuleCreationError {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }
}

/// Failure inside a module's start/stop hook
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct LifecycleError(pub String);

/// A receiver refused one unit of data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiveError {
    #[error("data rejected: {0}")]
    Rejected(String),

    #[error("unsupported data: expected {expected}, got {actual}")]
    UnsupportedData {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Outcome of pushing one unit of data through a coupler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("coupler is not accepting data (state: {state})")]
    NotAccepting { state: CouplerState },

    #[error("receiver {receiver} is not started (state: {state})")]
    ReceiverNotStarted {
        receiver: ModuleUrn,
        state: ModuleState,
    },

    #[error("receiver {receiver} failed: {source}")]
    Receiver {
        receiver: ModuleUrn,
        #[source]
        source: ReceiveError,
    },

    #[error("coupler was stopped while the emitter was waiting")]
    Cancelled,
}

/// An emitter could not serve a data request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataRequestError {
    #[error("invalid request parameter: {0}")]
    InvalidParameter(String),

    #[error("data request failed: {0}")]
    Failed(String),
}

/// Optional management operations on a module
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagementError {
    #[error("operation '{operation}' is not supported by this module")]
    Unsupported { operation: &'static str },

    #[error("management operation failed: {0}")]
    Failed(String),
}

/// Errors surfaced by the module manager and data flows
#[derive(Debug, Error)]
pub enum ModuleError {
    // ----- configuration -----
    #[error(transparent)]
    InvalidUrn(#[from] UrnError),

    #[error("no factory matches {0}")]
    FactoryNotFound(ModuleUrn),

    #[error("{prefix} matches more than one factory: {candidates:?}")]
    AmbiguousFactory {
        prefix: ModuleUrn,
        candidates: Vec<ModuleUrn>,
    },

    #[error("a factory for {0} is already registered")]
    DuplicateFactory(ModuleUrn),

    #[error("{provider} expects {expected} parameter(s), got {actual}")]
    ParameterCount {
        provider: ModuleUrn,
        expected: usize,
        actual: usize,
    },

    #[error("{provider} parameter {index}: expected {expected}, got {actual}")]
    ParameterType {
        provider: ModuleUrn,
        index: usize,
        expected: ParamType,
        actual: ParamType,
    },

    #[error("{provider} parameter {index}: {source}")]
    ParameterConversion {
        provider: ModuleUrn,
        index: usize,
        #[source]
        source: ParamError,
    },

    #[error("{provider} is a singleton and {existing} is still alive")]
    CardinalityViolation {
        provider: ModuleUrn,
        existing: ModuleUrn,
    },

    // ----- lifecycle -----
    #[error("{provider} could not create a module: {cause}")]
    ModuleCreation { provider: ModuleUrn, cause: String },

    #[error("module {0} not found")]
    ModuleNotFound(ModuleUrn),

    #[error("module {urn} is used by active data flow(s) {flows:?}")]
    ModuleInUse {
        urn: ModuleUrn,
        flows: Vec<DataFlowId>,
    },

    #[error("module {urn} is not started (state: {state})")]
    ModuleNotStarted { urn: ModuleUrn, state: ModuleState },

    #[error("cannot {operation} module {urn} in state {state}")]
    InvalidModuleState {
        urn: ModuleUrn,
        operation: &'static str,
        state: ModuleState,
    },

    #[error("module {urn} lifecycle hook failed: {source}")]
    LifecycleFailed {
        urn: ModuleUrn,
        #[source]
        source: LifecycleError,
    },

    #[error("modules at position {position} are incompatible: {emitter} -> {receiver} ({reason})")]
    IncompatibleModules {
        position: usize,
        emitter: ModuleUrn,
        receiver: ModuleUrn,
        reason: &'static str,
    },

    #[error("module {urn} appears more than once in a data flow, at positions {positions:?}")]
    DuplicateModule {
        urn: ModuleUrn,
        positions: Vec<usize>,
    },

    #[error("a data flow needs at least one module")]
    EmptyDataFlow,

    #[error("a data flow with only {0} needs the system sink appended")]
    SingleModuleFlow(ModuleUrn),

    #[error("data flow {0} not found")]
    DataFlowNotFound(DataFlowId),

    #[error("cannot {operation} data flow {id} in state {state}")]
    InvalidFlowState {
        id: DataFlowId,
        operation: &'static str,
        state: DataFlowState,
    },

    #[error("data flow {id} could not start a coupler worker: {source}")]
    CouplerStart {
        id: DataFlowId,
        #[source]
        source: std::io::Error,
    },

    #[error("data request to {urn} for flow {id} failed: {source}")]
    DataRequestFailed {
        id: DataFlowId,
        urn: ModuleUrn,
        #[source]
        source: DataRequestError,
    },

    #[error("data flow {id} can only be torn down by {}", flow_owner(.owner))]
    NotFlowOwner {
        id: DataFlowId,
        owner: Option<ModuleUrn>,
    },

    #[error(transparent)]
    Management(#[from] ManagementError),

    #[error("module manager has been shut down")]
    ShutDown,
}

/// Result alias for manager and flow operations
pub type ModuleResult<T> = Result<T, ModuleError>;

fn flow_owner(owner: &Option<ModuleUrn>) -> String {
    match owner {
        Some(urn) => format!("module {urn}"),
        None => "the manager's caller".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_error_keeps_receive_source() {
        use std::error::Error as _;

        let err = DeliveryError::Receiver {
            receiver: ModuleUrn::parse("test:sink:one").unwrap(),
            source: ReceiveError::Rejected("boom".to_string()),
        };

        assert!(err.to_string().contains("test:sink:one"));
        assert_eq!(err.source().unwrap().to_string(), "data rejected: boom");
    }

    #[test]
    fn test_urn_error_converts_into_module_error() {
        let err: ModuleError = UrnError::Empty.into();
        assert!(matches!(err, ModuleError::InvalidUrn(UrnError::Empty)));
    }

    #[test]
    fn test_management_default_message() {
        let err = ManagementError::Unsupported {
            operation: "reconnect",
        };
        assert_eq!(
            err.to_string(),
            "operation 'reconnect' is not supported by this module"
        );
    }
}
