//! Subgraph runner contract

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::controlflow::{BranchResult, FeedsFetchesPlan};
use crate::frame::OuterOutputAllocator;
use crate::graph::Subgraph;
use crate::observability::{Logger, MetricsRegistry};
use crate::tensor::{ElementType, TensorHandle, TensorShape};

use super::cancel::CancellationFlag;

/// How the runner schedules independent nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One node at a time, in topological order
    #[default]
    Sequential,
    /// Independent nodes of a level run as one task batch
    Parallel,
}

/// Deferred allocation of one enclosing output.
///
/// Handed to the runner in place of a buffer when the output's shape is not
/// known before execution. The runner calls `allocate` once it has the
/// produced shape; the buffer lands directly in the enclosing output slot.
#[derive(Clone, Copy)]
pub struct DeferredAllocation<'a> {
    output_index: usize,
    allocator: &'a dyn OuterOutputAllocator,
}

impl<'a> DeferredAllocation<'a> {
    pub fn new(output_index: usize, allocator: &'a dyn OuterOutputAllocator) -> Self {
        Self {
            output_index,
            allocator,
        }
    }

    pub fn output_index(&self) -> usize {
        self.output_index
    }

    pub fn allocate(
        &self,
        shape: &TensorShape,
        element_type: ElementType,
    ) -> BranchResult<TensorHandle> {
        self.allocator
            .allocate(self.output_index, shape, element_type)
    }
}

impl fmt::Debug for DeferredAllocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredAllocation")
            .field("output_index", &self.output_index)
            .finish_non_exhaustive()
    }
}

/// Destination of one subgraph output
#[derive(Debug)]
pub enum FetchSlot<'a> {
    /// Buffer allocated up front; the runner must write into exactly this one
    Preallocated(TensorHandle),
    /// Buffer allocated on demand once the shape is known
    Deferred(DeferredAllocation<'a>),
}

/// Everything one subgraph run needs
#[derive(Debug)]
pub struct RunRequest<'a> {
    /// Feed names, fetch names and transfer routes
    pub plan: &'a FeedsFetchesPlan,
    /// Feed values, in `plan.feed_names()` order
    pub feeds: Vec<TensorHandle>,
    /// One destination per subgraph output, in declared order
    pub fetches: Vec<FetchSlot<'a>>,
    pub mode: ExecutionMode,
    pub cancel: &'a CancellationFlag,
    pub logger: &'a Logger,
    /// Registry of the invoking operator; transfers are counted here
    pub metrics: &'a MetricsRegistry,
}

impl RunRequest<'_> {
    pub fn feed_names(&self) -> &[String] {
        self.plan.feed_names()
    }

    pub fn is_sequential(&self) -> bool {
        self.mode == ExecutionMode::Sequential
    }
}

/// Executes a resolved subgraph.
///
/// On success every fetch has been written: preallocated buffers in place,
/// deferred ones through their allocation. On failure nothing is retried and
/// the first failure is returned unchanged; no fetch is written or allocated
/// unless every produced value fits its destination. A set cancellation flag
/// yields `BranchError::Cancelled`, never a partial result.
pub trait SubgraphRunner: Send + Sync {
    fn run(&self, subgraph: &Subgraph, request: RunRequest<'_>) -> BranchResult<()>;
}
