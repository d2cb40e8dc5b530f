//! Reference subgraph runner
//!
//! Executes a resolved `Subgraph` against a `RunRequest`:
//! - binds feeds to input slots, copying only across memory spaces
//! - runs nodes one at a time, or one dependency level per task batch
//! - checks the cancellation flag before each node or level and after the last
//! - checks every produced output against its destination, then moves each
//!   one into the buffer it was handed

use std::panic::{self, AssertUnwindSafe};

use crate::config::ControlFlowConfig;
use crate::controlflow::{BranchError, BranchResult, ExecutionFailure};
use crate::graph::{GraphStructureView, KernelContext, Node, OutputDef, Subgraph};
use crate::observability::{Event, Logger};
use crate::parallel::{panic_message, TaskBatch};
use crate::tensor::{Tensor, TensorHandle};

use super::contract::{ExecutionMode, FetchSlot, RunRequest, SubgraphRunner};

/// Value slots of one run; `None` until produced or fed
type Values = Vec<Option<TensorHandle>>;

/// Runs subgraphs in-process with the crate's own kernels
#[derive(Debug, Clone)]
pub struct GraphRunner {
    workers: usize,
}

impl GraphRunner {
    /// `workers` bounds the threads of one parallel batch; clamped to at least one
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn from_config(config: &ControlFlowConfig) -> Self {
        Self::new(config.parallel_workers)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    fn bind_feeds(&self, subgraph: &Subgraph, request: &RunRequest<'_>) -> BranchResult<Values> {
        let plan = request.plan;
        let mut values: Values = vec![None; subgraph.value_count()];

        for (index, feed) in request.feeds.iter().enumerate() {
            let name = &plan.feed_names()[index];
            let slot = plan
                .feed_slot(index)
                .ok_or_else(|| BranchError::UnresolvedName {
                    subgraph: subgraph.name().to_string(),
                    name: name.clone(),
                })?;

            let bound = match plan.feed_route(index) {
                Some(route) if route.needs_transfer() => {
                    let source = route.source.to_string();
                    let target = route.target.to_string();
                    request.logger.event(
                        Event::FeedTransfer,
                        &[
                            ("name", name.as_str()),
                            ("source", source.as_str()),
                            ("target", target.as_str()),
                        ],
                    );
                    request.metrics.increment_feed_transfers();
                    TensorHandle::new(feed.snapshot().with_location(route.target))
                }
                _ => feed.clone(),
            };
            values[slot] = Some(bound);
        }

        Ok(values)
    }

    fn run_sequential(
        &self,
        subgraph: &Subgraph,
        values: &mut Values,
        request: &RunRequest<'_>,
    ) -> BranchResult<()> {
        for node in subgraph.nodes() {
            if request.cancel.is_cancelled() {
                return Err(cancelled(subgraph, request.logger));
            }
            let produced = compute_node(node, values, subgraph, request)
                .map_err(|failure| failed(failure, subgraph, request))?;
            bind_outputs(node, produced, values);
        }
        Ok(())
    }

    fn run_parallel(
        &self,
        subgraph: &Subgraph,
        values: &mut Values,
        request: &RunRequest<'_>,
    ) -> BranchResult<()> {
        for level in subgraph.levels() {
            if request.cancel.is_cancelled() {
                return Err(cancelled(subgraph, request.logger));
            }

            let mut batch = TaskBatch::new(self.workers);
            {
                let shared: &Values = values;
                for &index in level {
                    let node = &subgraph.nodes()[index];
                    batch.schedule(node.name(), move || {
                        compute_node(node, shared, subgraph, request)
                    });
                }
            }

            let results = match batch.join() {
                Ok(results) => results,
                Err(failure) => {
                    request.logger.event(
                        Event::TaskBatchFailed,
                        &[("subgraph", subgraph.name()), ("node", failure.node())],
                    );
                    return Err(failed(failure, subgraph, request));
                }
            };

            for (&index, produced) in level.iter().zip(results) {
                bind_outputs(&subgraph.nodes()[index], produced, values);
            }
        }
        Ok(())
    }

    fn write_fetches(
        &self,
        subgraph: &Subgraph,
        values: Values,
        request: RunRequest<'_>,
    ) -> BranchResult<()> {
        let plan = request.plan;
        let logger = request.logger;
        let outputs = subgraph.outputs();

        let produced = take_outputs(subgraph, values)?;

        // nothing reaches the enclosing scope unless every output fits
        for ((def, fetch), tensor) in outputs.iter().zip(&request.fetches).zip(&produced) {
            check_fetch(def, fetch, tensor)?;
        }

        for (index, (fetch, tensor)) in request.fetches.into_iter().zip(produced).enumerate() {
            let def = &outputs[index];
            let target = match fetch {
                FetchSlot::Preallocated(buffer) => buffer,
                FetchSlot::Deferred(deferred) => {
                    deferred.allocate(tensor.shape(), def.element_type)?
                }
            };

            target
                .store(tensor)
                .map_err(|e| ExecutionFailure::new(def.name.clone(), e.to_string()))?;

            if let Some(route) = plan.fetch_route(index) {
                if route.needs_transfer() {
                    let source = route.source.to_string();
                    let target = route.target.to_string();
                    logger.event(
                        Event::FetchTransfer,
                        &[
                            ("name", def.name.as_str()),
                            ("source", source.as_str()),
                            ("target", target.as_str()),
                        ],
                    );
                    request.metrics.increment_fetch_transfers();
                }
            }
        }
        Ok(())
    }
}

impl Default for GraphRunner {
    fn default() -> Self {
        Self::from_config(&ControlFlowConfig::default())
    }
}

impl SubgraphRunner for GraphRunner {
    fn run(&self, subgraph: &Subgraph, request: RunRequest<'_>) -> BranchResult<()> {
        if request.feeds.len() != request.plan.feed_count() {
            return Err(BranchError::CaptureCountMismatch {
                expected: request.plan.feed_count(),
                actual: request.feeds.len(),
            });
        }
        if request.fetches.len() != subgraph.outputs().len() {
            return Err(BranchError::ArityMismatch {
                subgraph: subgraph.name().to_string(),
                expected: subgraph.outputs().len(),
                actual: request.fetches.len(),
            });
        }

        let mut values = self.bind_feeds(subgraph, &request)?;

        match request.mode {
            ExecutionMode::Sequential => self.run_sequential(subgraph, &mut values, &request)?,
            ExecutionMode::Parallel => self.run_parallel(subgraph, &mut values, &request)?,
        }

        if request.cancel.is_cancelled() {
            return Err(cancelled(subgraph, request.logger));
        }

        self.write_fetches(subgraph, values, request)
    }
}

fn cancelled(subgraph: &Subgraph, logger: &Logger) -> BranchError {
    logger.event(Event::SubgraphCancelled, &[("subgraph", subgraph.name())]);
    BranchError::Cancelled
}

/// A node that failed because a nested run was cancelled reports cancellation
fn failed(
    failure: ExecutionFailure,
    subgraph: &Subgraph,
    request: &RunRequest<'_>,
) -> BranchError {
    if request.cancel.is_cancelled() {
        cancelled(subgraph, request.logger)
    } else {
        failure.into()
    }
}

fn bind_outputs(node: &Node, produced: Vec<Tensor>, values: &mut Values) {
    for (&slot, tensor) in node.outputs().iter().zip(produced) {
        values[slot] = Some(TensorHandle::new(tensor));
    }
}

/// Produced value of every output, in declared order.
///
/// A value fetched more than once is moved out only on its last use.
fn take_outputs(subgraph: &Subgraph, mut values: Values) -> Result<Vec<Tensor>, ExecutionFailure> {
    let mut remaining = vec![0usize; values.len()];
    for &slot in subgraph.output_value_slots() {
        remaining[slot] += 1;
    }

    let mut produced = Vec::with_capacity(subgraph.outputs().len());
    for (index, def) in subgraph.outputs().iter().enumerate() {
        let slot = subgraph.output_value_slot(index).ok_or_else(|| {
            ExecutionFailure::new(def.name.clone(), "output has no value slot")
        })?;

        remaining[slot] -= 1;
        let handle = if remaining[slot] == 0 {
            values[slot].take()
        } else {
            values[slot].clone()
        };
        let tensor = handle
            .ok_or_else(|| ExecutionFailure::new(def.name.clone(), "output was never produced"))?
            .into_tensor();
        produced.push(tensor);
    }
    Ok(produced)
}

/// Checks that `tensor` can be written to `fetch` without touching it
fn check_fetch(
    def: &OutputDef,
    fetch: &FetchSlot<'_>,
    tensor: &Tensor,
) -> Result<(), ExecutionFailure> {
    if tensor.element_type() != def.element_type {
        return Err(ExecutionFailure::new(
            def.name.clone(),
            format!(
                "produced {} but the output declares {}",
                tensor.element_type(),
                def.element_type
            ),
        ));
    }

    match fetch {
        FetchSlot::Preallocated(buffer) => {
            let buffer = buffer.read();
            if buffer.shape() != tensor.shape() || buffer.element_type() != tensor.element_type()
            {
                return Err(ExecutionFailure::new(
                    def.name.clone(),
                    format!(
                        "produced {} {} does not fit buffer of {} {}",
                        tensor.element_type(),
                        tensor.shape(),
                        buffer.element_type(),
                        buffer.shape()
                    ),
                ));
            }
        }
        FetchSlot::Deferred(_) => {
            if let Some(descriptor) = &def.shape {
                if !descriptor.admits(tensor.shape()) {
                    return Err(ExecutionFailure::new(
                        def.name.clone(),
                        format!(
                            "produced shape {} does not match declared {}",
                            tensor.shape(),
                            descriptor
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Runs one node's kernel; never panics
fn compute_node(
    node: &Node,
    values: &Values,
    subgraph: &Subgraph,
    request: &RunRequest<'_>,
) -> Result<Vec<Tensor>, ExecutionFailure> {
    let result = invoke_kernel(node, values, subgraph, request);
    if let Err(failure) = &result {
        request.logger.event(
            Event::SubgraphNodeFailed,
            &[
                ("subgraph", subgraph.name()),
                ("node", node.name()),
                ("failure_node", failure.node()),
                ("message", failure.message()),
            ],
        );
    }
    result
}

fn invoke_kernel(
    node: &Node,
    values: &Values,
    subgraph: &Subgraph,
    request: &RunRequest<'_>,
) -> Result<Vec<Tensor>, ExecutionFailure> {
    let mut inputs = Vec::with_capacity(node.inputs().len());
    for &slot in node.inputs() {
        let handle = values[slot].as_ref().ok_or_else(|| {
            ExecutionFailure::new(
                node.name(),
                format!("input '{}' has no value", subgraph.value_name(slot)),
            )
        })?;
        inputs.push(handle);
    }

    let guards: Vec<_> = inputs.iter().map(|handle| handle.read()).collect();
    let args: Vec<&Tensor> = guards.iter().map(|guard| &**guard).collect();
    let ctx = KernelContext::new(node.name(), request.cancel, request.logger, request.mode);

    let produced =
        match panic::catch_unwind(AssertUnwindSafe(|| node.kernel().compute(&ctx, &args))) {
            Ok(Ok(produced)) => produced,
            Ok(Err(e)) => return Err(e.into_failure(node.name())),
            Err(payload) => {
                return Err(ExecutionFailure::new(
                    node.name(),
                    panic_message(payload.as_ref()),
                ))
            }
        };

    if produced.len() != node.outputs().len() {
        return Err(ExecutionFailure::new(
            node.name(),
            format!(
                "kernel returned {} outputs, node declares {}",
                produced.len(),
                node.outputs().len()
            ),
        ));
    }
    Ok(produced)
}
