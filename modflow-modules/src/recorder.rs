//! Keeps every unit it receives

use modflow_core::errors::{ManagementError, ReceiveError, UrnError};
use modflow_core::factory::{FactoryDescriptor, FnFactory, ModuleFactory};
use modflow_core::flow::DataFlowId;
use modflow_core::module::{Data, DataReceiver, ManagedModule, Module, ModuleUrn};
use parking_lot::Mutex;
use std::sync::Arc;

pub const PROVIDER: &str = "recorder:memory";

pub struct MemoryRecorder {
    urn: ModuleUrn,
    units: Mutex<Vec<(DataFlowId, Data)>>,
}

impl MemoryRecorder {
    pub fn new(urn: ModuleUrn) -> Self {
        Self {
            urn,
            units: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.units.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.lock().is_empty()
    }

    /// Recorded units of type `T`, in arrival order
    pub fn values<T: Clone + 'static>(&self) -> Vec<T> {
        self.units
            .lock()
            .iter()
            .filter_map(|(_, data)| data.downcast_ref::<T>().cloned())
            .collect()
    }

    /// Units received through one flow
    pub fn from_flow(&self, flow_id: DataFlowId) -> Vec<Data> {
        self.units
            .lock()
            .iter()
            .filter(|(id, _)| *id == flow_id)
            .map(|(_, data)| data.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.units.lock().clear();
    }
}

impl Module for MemoryRecorder {
    fn urn(&self) -> &ModuleUrn {
        &self.urn
    }

    fn as_receiver(&self) -> Option<&dyn DataReceiver> {
        Some(self)
    }

    fn management(&self) -> Option<&dyn ManagedModule> {
        Some(self)
    }
}

impl DataReceiver for MemoryRecorder {
    fn receive(&self, flow_id: &DataFlowId, data: Data) -> Result<(), ReceiveError> {
        self.units.lock().push((*flow_id, data));
        Ok(())
    }
}

impl ManagedModule for MemoryRecorder {
    fn status(&self) -> String {
        format!("recorded {} unit(s)", self.len())
    }

    fn reconnect(&self) -> Result<(), ManagementError> {
        Err(ManagementError::Unsupported {
            operation: "reconnect",
        })
    }
}

pub fn factory() -> Result<Arc<dyn ModuleFactory>, UrnError> {
    let descriptor =
        FactoryDescriptor::new(ModuleUrn::parse(PROVIDER)?, "In-memory recorder").auto_start();

    Ok(Arc::new(FnFactory::new(descriptor, |urn, _params| {
        Ok(Arc::new(MemoryRecorder::new(urn.clone())) as Arc<dyn Module>)
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn recorder() -> MemoryRecorder {
        MemoryRecorder::new(ModuleUrn::parse("recorder:memory:instance-1").unwrap())
    }

    #[test]
    fn test_records_by_flow() {
        let recorder = recorder();
        let (a, b) = (DataFlowId::new(1), DataFlowId::new(2));
        recorder.receive(&a, Data::new(1_u64)).unwrap();
        recorder.receive(&b, Data::new("x".to_string())).unwrap();
        recorder.receive(&a, Data::new(2_u64)).unwrap();

        assert_eq!(recorder.len(), 3);
        assert_eq!(recorder.values::<u64>(), vec![1, 2]);
        assert_eq!(recorder.from_flow(b).len(), 1);
        assert_eq!(recorder.status(), "recorded 3 unit(s)");
        assert!(recorder.reconnect().is_err());

        recorder.clear();
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_order_is_arrival_order() {
        proptest!(|(values in prop::collection::vec(any::<i64>(), 0..64))| {
            let recorder = recorder();
            for value in &values {
                recorder.receive(&DataFlowId::new(1), Data::new(*value)).unwrap();
            }
            prop_assert_eq!(recorder.values::<i64>(), values);
        });
    }
}
