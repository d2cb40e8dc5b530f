//! Per-invocation branch executor
//!
//! Lifecycle: `Created -> Initialized -> Succeeded | Failed`.
//!
//! `initialize` decides, output by output, whether the enclosing buffer can
//! be allocated now (concrete shape) or must be allocated by the subgraph
//! once its shape is known. `execute` hands the subgraph the used captures
//! and one destination per output, then runs it exactly once.

use std::fmt;

use crate::frame::OuterOutputAllocator;
use crate::graph::{GraphStructureView, Subgraph};
use crate::observability::{Event, Logger, MetricsRegistry};
use crate::runner::{
    CancellationFlag, DeferredAllocation, ExecutionMode, FetchSlot, RunRequest, SubgraphRunner,
};
use crate::tensor::TensorHandle;

use super::binding::SubgraphBinding;
use super::errors::{BranchError, BranchResult};
use super::operator::CapturedValue;
use super::plan::FeedsFetchesPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Created,
    Initialized,
    Succeeded,
    Failed,
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutorState::Created => "created",
            ExecutorState::Initialized => "initialized",
            ExecutorState::Succeeded => "succeeded",
            ExecutorState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How one declared output will be materialized
#[derive(Debug, Clone)]
pub enum AllocationRecord {
    /// Allocated before execution; the subgraph writes straight into it
    Resolved(TensorHandle),
    /// Allocated by the subgraph through a deferred allocation
    Deferred,
}

impl AllocationRecord {
    pub fn is_deferred(&self) -> bool {
        matches!(self, AllocationRecord::Deferred)
    }
}

/// Collaborators shared by every executor of one invocation
#[derive(Clone, Copy)]
pub struct ExecutionEnv<'a> {
    pub runner: &'a dyn SubgraphRunner,
    pub cancel: &'a CancellationFlag,
    pub logger: &'a Logger,
    pub metrics: &'a MetricsRegistry,
    pub mode: ExecutionMode,
}

/// Runs one branch subgraph for one invocation
pub struct BranchExecutor<'a> {
    subgraph: &'a Subgraph,
    binding: &'a SubgraphBinding,
    captures: &'a [CapturedValue],
    allocator: &'a dyn OuterOutputAllocator,
    records: Vec<AllocationRecord>,
    state: ExecutorState,
}

impl<'a> BranchExecutor<'a> {
    pub fn new(
        subgraph: &'a Subgraph,
        binding: &'a SubgraphBinding,
        captures: &'a [CapturedValue],
        allocator: &'a dyn OuterOutputAllocator,
    ) -> Self {
        Self {
            subgraph,
            binding,
            captures,
            allocator,
            records: Vec::new(),
            state: ExecutorState::Created,
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    /// One record per declared output, in order; empty before `initialize`
    pub fn records(&self) -> &[AllocationRecord] {
        &self.records
    }

    /// Allocates every output whose shape is already concrete and defers the rest
    pub fn initialize(&mut self, env: &ExecutionEnv<'_>) -> BranchResult<()> {
        self.expect_state(ExecutorState::Created)?;

        let result = self.allocate_outputs(env);
        self.state = match result {
            Ok(()) => ExecutorState::Initialized,
            Err(_) => ExecutorState::Failed,
        };
        result
    }

    fn allocate_outputs(&mut self, env: &ExecutionEnv<'_>) -> BranchResult<()> {
        if self.captures.len() != self.binding.capture_count() {
            return Err(BranchError::CaptureCountMismatch {
                expected: self.binding.capture_count(),
                actual: self.captures.len(),
            });
        }
        // feeds are matched by position, so the order must be the declared one
        let declared = self.binding.capture_names();
        for (index, (capture, expected)) in self.captures.iter().zip(declared).enumerate() {
            if capture.name != *expected {
                return Err(BranchError::CaptureNameMismatch {
                    index,
                    expected: expected.clone(),
                    actual: capture.name.clone(),
                });
            }
        }

        // nothing is allocated unless every output has a descriptor
        let graph = self.subgraph;
        let outputs = graph.outputs();
        let mut descriptors = Vec::with_capacity(outputs.len());
        for def in outputs {
            let descriptor = def.shape.as_ref().ok_or_else(|| BranchError::ShapeMissing {
                name: def.name.clone(),
            })?;
            descriptors.push(descriptor);
        }

        let subgraph = graph.name();
        for (index, (def, descriptor)) in outputs.iter().zip(descriptors).enumerate() {
            let record = match descriptor.to_concrete() {
                Some(shape) => {
                    let handle = self.allocator.allocate(index, &shape, def.element_type)?;
                    env.metrics.increment_eager_allocations();
                    env.logger.event(
                        Event::BranchOutputAllocated,
                        &[
                            ("subgraph", subgraph),
                            ("output", def.name.as_str()),
                            ("shape", shape.to_string().as_str()),
                        ],
                    );
                    AllocationRecord::Resolved(handle)
                }
                None => {
                    env.metrics.increment_deferred_allocations();
                    env.logger.event(
                        Event::BranchOutputDeferred,
                        &[
                            ("subgraph", subgraph),
                            ("output", def.name.as_str()),
                            ("shape", descriptor.to_string().as_str()),
                        ],
                    );
                    AllocationRecord::Deferred
                }
            };
            self.records.push(record);
        }
        Ok(())
    }

    /// Runs the subgraph once. Runner failures are returned unchanged.
    pub fn execute(&mut self, plan: &FeedsFetchesPlan, env: &ExecutionEnv<'_>) -> BranchResult<()> {
        self.expect_state(ExecutorState::Initialized)?;

        let feeds = self
            .captures
            .iter()
            .zip(self.binding.used_captures())
            .filter(|(_, used)| **used)
            .map(|(capture, _)| capture.value.clone())
            .collect();

        let allocator = self.allocator;
        let fetches = self
            .records
            .iter()
            .enumerate()
            .map(|(index, record)| match record {
                AllocationRecord::Resolved(handle) => FetchSlot::Preallocated(handle.clone()),
                AllocationRecord::Deferred => {
                    FetchSlot::Deferred(DeferredAllocation::new(index, allocator))
                }
            })
            .collect();

        let request = RunRequest {
            plan,
            feeds,
            fetches,
            mode: env.mode,
            cancel: env.cancel,
            logger: env.logger,
            metrics: env.metrics,
        };

        let result = env.runner.run(self.subgraph, request);
        self.state = match result {
            Ok(()) => ExecutorState::Succeeded,
            Err(_) => ExecutorState::Failed,
        };
        result
    }

    fn expect_state(&self, expected: ExecutorState) -> BranchResult<()> {
        if self.state != expected {
            return Err(BranchError::InvalidExecutorState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }
}
