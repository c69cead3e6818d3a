//! Testing utilities for runtime integration tests
//!
//! Provides:
//! - RecordingReceiver: receive-only module with programmable delays and failures
//! - ManualSource: emit-only module driven by the test
//! - Relay: pass-through module (emit + receive)
//! - TestFactory: factory that keeps every instance it builds
//! - Small helpers for URNs and timing assertions

pub mod factory;
pub mod helpers;
pub mod modules;

pub use factory::TestFactory;
pub use helpers::*;
pub use modules::{FlowInitiator, ManualSource, RecordingReceiver, Relay};
