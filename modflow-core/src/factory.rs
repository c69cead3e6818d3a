//! Module factories and the static factory catalog
//!
//! Every module type is described by a [`FactoryDescriptor`] and built by a
//! [`ModuleFactory`]. The manager performs cardinality, arity and type checks
//! against the descriptor before the factory sees the parameters; the factory
//! only does semantic validation.
//!
//! Factories reach the manager through [`FactorySource`]s. A
//! [`FactoryCatalog`] is the plain static list; a `RwLock<FactoryCatalog>`
//! is a source whose contents can grow between refreshes.

use crate::errors::ModuleCreationError;
use crate::module::{Module, ModuleUrn, ParamType, ParamValue};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactoryDescriptor {
    /// `provider:type`
    pub provider: ModuleUrn,
    pub label: String,
    /// At most one live instance
    pub singleton: bool,
    /// Instantiated by the manager at init and on refresh (requires no parameters)
    pub auto_instantiate: bool,
    /// New instances are started in the same call that creates them, and
    /// flow participants are started on demand
    pub auto_start: bool,
    pub params: Vec<ParamType>,
}

impl FactoryDescriptor {
    pub fn new(provider: ModuleUrn, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
            singleton: false,
            auto_instantiate: false,
            auto_start: false,
            params: Vec::new(),
        }
    }

    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    pub fn auto_instantiate(mut self) -> Self {
        self.auto_instantiate = true;
        self
    }

    pub fn auto_start(mut self) -> Self {
        self.auto_start = true;
        self
    }

    pub fn params(mut self, params: impl Into<Vec<ParamType>>) -> Self {
        self.params = params.into();
        self
    }
}

pub trait ModuleFactory: Send + Sync {
    fn descriptor(&self) -> &FactoryDescriptor;

    /// Build the module addressed by `urn`
    ///
    /// `params` already match the descriptor's arity and types. The returned
    /// module must report `urn` as its own URN.
    fn create(
        &self,
        urn: &ModuleUrn,
        params: &[ParamValue],
    ) -> Result<Arc<dyn Module>, ModuleCreationError>;
}

type BuildFn =
    dyn Fn(&ModuleUrn, &[ParamValue]) -> Result<Arc<dyn Module>, ModuleCreationError> + Send + Sync;

/// Factory backed by a closure
pub struct FnFactory {
    descriptor: FactoryDescriptor,
    build: Box<BuildFn>,
}

impl FnFactory {
    pub fn new<F>(descriptor: FactoryDescriptor, build: F) -> Self
    where
        F: Fn(&ModuleUrn, &[ParamValue]) -> Result<Arc<dyn Module>, ModuleCreationError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            descriptor,
            build: Box::new(build),
        }
    }
}

impl ModuleFactory for FnFactory {
    fn descriptor(&self) -> &FactoryDescriptor {
        &self.descriptor
    }

    fn create(
        &self,
        urn: &ModuleUrn,
        params: &[ParamValue],
    ) -> Result<Arc<dyn Module>, ModuleCreationError> {
        (self.build)(urn, params)
    }
}

impl fmt::Debug for FnFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFactory")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Supplies factories to the manager, scanned at init and on every refresh
pub trait FactorySource: Send + Sync {
    fn factories(&self) -> Vec<Arc<dyn ModuleFactory>>;
}

/// Explicit list of factories
#[derive(Clone, Default)]
pub struct FactoryCatalog {
    factories: Vec<Arc<dyn ModuleFactory>>,
}

impl FactoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, factory: Arc<dyn ModuleFactory>) -> Self {
        self.factories.push(factory);
        self
    }

    pub fn register(&mut self, factory: Arc<dyn ModuleFactory>) {
        self.factories.push(factory);
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn providers(&self) -> Vec<ModuleUrn> {
        self.factories
            .iter()
            .map(|f| f.descriptor().provider.clone())
            .collect()
    }
}

impl FactorySource for FactoryCatalog {
    fn factories(&self) -> Vec<Arc<dyn ModuleFactory>> {
        self.factories.clone()
    }
}

impl FactorySource for RwLock<FactoryCatalog> {
    fn factories(&self) -> Vec<Arc<dyn ModuleFactory>> {
        self.read().factories()
    }
}
