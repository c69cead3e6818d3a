//! Modflow Modules - Sample plug-ins for the module runtime
//!
//! Deliberately small modules used by the demo binary and the integration
//! tests:
//!
//! - `copier:list` emits the items of its data request parameter
//! - `echo:text` prefixes every string it receives and passes it on
//! - `counter:seq` emits an increasing sequence on a timer
//! - `recorder:memory` keeps everything it receives
//!
//! [`catalog()`] bundles their factories for
//! [`ModuleManagerBuilder::source`](modflow_core::manager::ModuleManagerBuilder::source).

pub mod copier;
pub mod counter;
pub mod echo;
pub mod recorder;

pub use copier::CopierModule;
pub use counter::CounterModule;
pub use echo::EchoModule;
pub use recorder::MemoryRecorder;

use modflow_core::errors::UrnError;
use modflow_core::factory::FactoryCatalog;

/// Factories for every sample module
pub fn catalog() -> Result<FactoryCatalog, UrnError> {
    Ok(FactoryCatalog::new()
        .with(copier::factory()?)
        .with(echo::factory()?)
        .with(counter::factory()?)
        .with(recorder::factory()?))
}
