//! Module lifecycle state
//!
//! ```text
//!  ┌─────────┐  start   ┌─────────┐  stop   ┌─────────┐
//!  │ Created │────────▶│ Started │───────▶│ Stopped │
//!  └────┬────┘          └─────────┘◀───────└────┬────┘
//!       │                            start      │
//!       │ delete                                │ delete
//!       ▼                                       ▼
//!  ┌──────────────────────────────────────────────────┐
//!  │                 Deleted (terminal)               │
//!  └──────────────────────────────────────────────────┘
//! ```
//!
//! The state lives in an atomic cell shared by the registry entry and every
//! coupler delivering into the module, so couplers see a stop immediately
//! without taking the manager lock.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ModuleState {
    Created = 0,
    Started = 1,
    Stopped = 2,
    Deleted = 3,
}

impl From<u8> for ModuleState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Started,
            2 => Self::Stopped,
            _ => Self::Deleted,
        }
    }
}

impl ModuleState {
    pub fn can_transition_to(self, next: ModuleState) -> bool {
        use ModuleState::*;
        matches!(
            (self, next),
            (Created, Started)
                | (Started, Stopped)
                | (Stopped, Started)
                | (Created, Deleted)
                | (Stopped, Deleted)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModuleState::Created => "created",
            ModuleState::Started => "started",
            ModuleState::Stopped => "stopped",
            ModuleState::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared atomic holder of a [`ModuleState`]
#[derive(Debug, Clone)]
pub struct ModuleStateCell {
    state: Arc<AtomicU8>,
}

impl ModuleStateCell {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(ModuleState::Created as u8)),
        }
    }

    #[inline]
    pub fn load(&self) -> ModuleState {
        ModuleState::from(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.load() == ModuleState::Started
    }

    /// Move to `next` if the lifecycle allows it
    ///
    /// Returns the previous state on success, the current state on refusal.
    pub fn transition(&self, next: ModuleState) -> Result<ModuleState, ModuleState> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let from = ModuleState::from(current);
            if !from.can_transition_to(next) {
                return Err(from);
            }
            match self.state.compare_exchange_weak(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(from),
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for ModuleStateCell {
    fn default() -> Self {
        Self::new()
    }
}
