//! Output buffers of the enclosing node
//!
//! Each declared output is a single-assignment slot: it can be allocated at
//! most once per frame, whether eagerly before execution or through a
//! deferred allocation during it.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::controlflow::{BranchError, BranchResult};
use crate::tensor::{ElementType, MemoryLocation, Tensor, TensorHandle, TensorShape};

use super::allocator::OuterOutputAllocator;
use super::locations::MemoryLocationResolver;

/// Declared output slots of one node invocation
#[derive(Debug)]
pub struct OutputFrame {
    names: Vec<String>,
    locations: Vec<MemoryLocation>,
    slots: Vec<Mutex<Option<TensorHandle>>>,
    allocations: AtomicUsize,
}

impl OutputFrame {
    /// Creates a frame whose outputs are placed wherever `resolver` says
    pub fn new(names: &[String], resolver: &dyn MemoryLocationResolver) -> Self {
        Self {
            names: names.to_vec(),
            locations: names.iter().map(|n| resolver.location_of(n)).collect(),
            slots: names.iter().map(|_| Mutex::new(None)).collect(),
            allocations: AtomicUsize::new(0),
        }
    }

    /// Creates a frame with every output on the host
    pub fn on_host(names: &[String]) -> Self {
        Self {
            names: names.to_vec(),
            locations: vec![MemoryLocation::Host; names.len()],
            slots: names.iter().map(|_| Mutex::new(None)).collect(),
            allocations: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Handle currently held by output `index`, if allocated
    pub fn get(&self, index: usize) -> Option<TensorHandle> {
        self.slots.get(index).and_then(|slot| slot.lock().clone())
    }

    /// Copy of output `index`'s current contents
    pub fn tensor(&self, index: usize) -> Option<Tensor> {
        self.get(index).map(|handle| handle.snapshot())
    }

    /// True once every declared output holds a buffer
    pub fn is_populated(&self) -> bool {
        self.slots.iter().all(|slot| slot.lock().is_some())
    }

    /// Number of successful allocations made against this frame
    pub fn allocation_count(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    pub fn into_outputs(self) -> Vec<Option<TensorHandle>> {
        self.slots.into_iter().map(Mutex::into_inner).collect()
    }
}

impl OuterOutputAllocator for OutputFrame {
    fn allocate(
        &self,
        output_index: usize,
        shape: &TensorShape,
        element_type: ElementType,
    ) -> BranchResult<TensorHandle> {
        let slot = self
            .slots
            .get(output_index)
            .ok_or_else(|| BranchError::AllocationFailed {
                index: output_index,
                reason: format!("node declares only {} outputs", self.slots.len()),
            })?;

        let mut slot = slot.lock();
        if slot.is_some() {
            return Err(BranchError::AllocationFailed {
                index: output_index,
                reason: "output is already assigned".to_string(),
            });
        }

        let location = self.locations[output_index];
        let handle = TensorHandle::new(Tensor::zeros(shape.clone(), element_type, location));
        *slot = Some(handle.clone());
        self.allocations.fetch_add(1, Ordering::Relaxed);
        Ok(handle)
    }
}
