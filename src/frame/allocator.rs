//! Enclosing-scope output allocation contract

use crate::controlflow::BranchResult;
use crate::tensor::{ElementType, TensorHandle, TensorShape};

/// Allocates the enclosing node's declared outputs.
///
/// Used eagerly for outputs whose shape is known before execution, and
/// lazily, through a `DeferredAllocation`, once a subgraph has produced a
/// concrete shape.
pub trait OuterOutputAllocator: Send + Sync {
    fn allocate(
        &self,
        output_index: usize,
        shape: &TensorShape,
        element_type: ElementType,
    ) -> BranchResult<TensorHandle>;
}
