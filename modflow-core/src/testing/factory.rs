use crate::errors::ModuleCreationError;
use crate::factory::{FactoryDescriptor, ModuleFactory};
use crate::module::{Module, ModuleUrn, ParamValue};
use parking_lot::Mutex;
use std::sync::Arc;

type BuildFn<M> = dyn Fn(&ModuleUrn, &[ParamValue]) -> Result<M, ModuleCreationError> + Send + Sync;

/// Factory that keeps a handle to every module it builds
///
/// Lets a test reach the concrete module (e.g. a [`ManualSource`](super::ManualSource))
/// behind a URN the manager minted.
pub struct TestFactory<M> {
    descriptor: FactoryDescriptor,
    build: Box<BuildFn<M>>,
    created: Mutex<Vec<Arc<M>>>,
}

impl<M: Module + 'static> TestFactory<M> {
    pub fn new<F>(descriptor: FactoryDescriptor, build: F) -> Self
    where
        F: Fn(&ModuleUrn, &[ParamValue]) -> Result<M, ModuleCreationError> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            build: Box::new(build),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Factory whose modules only need their URN
    pub fn simple<F>(descriptor: FactoryDescriptor, build: F) -> Self
    where
        F: Fn(ModuleUrn) -> M + Send + Sync + 'static,
    {
        Self::new(descriptor, move |urn, _params| Ok(build(urn.clone())))
    }

    pub fn instances(&self) -> Vec<Arc<M>> {
        self.created.lock().clone()
    }

    pub fn last(&self) -> Option<Arc<M>> {
        self.created.lock().last().cloned()
    }

    pub fn get(&self, urn: &ModuleUrn) -> Option<Arc<M>> {
        self.created
            .lock()
            .iter()
            .find(|m| m.urn() == urn)
            .cloned()
    }
}

impl<M: Module + 'static> ModuleFactory for TestFactory<M> {
    fn descriptor(&self) -> &FactoryDescriptor {
        &self.descriptor
    }

    fn create(
        &self,
        urn: &ModuleUrn,
        params: &[ParamValue],
    ) -> Result<Arc<dyn Module>, ModuleCreationError> {
        let module = Arc::new((self.build)(urn, params)?);
        self.created.lock().push(Arc::clone(&module));
        Ok(module)
    }
}
