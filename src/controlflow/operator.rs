//! Conditional branch operator
//!
//! Holds one pre-built binding and plan per branch. Each invocation reads the
//! condition, selects exactly one branch and runs it into the node's declared
//! outputs. The other branch is never touched.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::ControlFlowConfig;
use crate::frame::{MemoryLocationResolver, OuterOutputAllocator};
use crate::graph::{KernelContext, Subgraph};
use crate::observability::{Event, Logger, MetricsRegistry, ObservationScope};
use crate::runner::{CancellationFlag, SubgraphRunner};
use crate::tensor::{Tensor, TensorHandle};

use super::binding::SubgraphBinding;
use super::branch::Branch;
use super::errors::{BranchError, BranchResult};
use super::executor::{BranchExecutor, ExecutionEnv};
use super::plan::FeedsFetchesPlan;

/// Static interface of the node in the enclosing graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSignature {
    pub name: String,
    /// Declared outputs, in order
    pub output_names: Vec<String>,
    /// Enclosing-scope values either branch may read, in order
    pub capture_names: Vec<String>,
}

impl NodeSignature {
    pub fn new<O, C>(name: impl Into<String>, output_names: O, capture_names: C) -> Self
    where
        O: IntoIterator,
        O::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            name: name.into(),
            output_names: output_names.into_iter().map(Into::into).collect(),
            capture_names: capture_names.into_iter().map(Into::into).collect(),
        }
    }
}

/// One enclosing-scope value as seen by this invocation
#[derive(Debug, Clone)]
pub struct CapturedValue {
    pub name: String,
    pub value: TensorHandle,
}

impl CapturedValue {
    pub fn new(name: impl Into<String>, value: impl Into<TensorHandle>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Per-invocation identity and the cancellation flag shared with the caller
#[derive(Debug, Clone)]
pub struct InvocationContext {
    invocation_id: Uuid,
    cancel: CancellationFlag,
}

impl InvocationContext {
    pub fn new() -> Self {
        Self::with_cancel(CancellationFlag::new())
    }

    /// Shares `cancel` with whoever else holds it
    pub fn with_cancel(cancel: CancellationFlag) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            cancel,
        }
    }

    /// Context for an `If` running as a node of another subgraph; shares the
    /// enclosing run's cancellation flag
    pub fn nested(ctx: &KernelContext<'_>) -> Self {
        Self::with_cancel(ctx.cancel_flag().clone())
    }

    pub fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }

    pub fn cancel_flag(&self) -> &CancellationFlag {
        &self.cancel
    }
}

impl Default for InvocationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct BranchState {
    subgraph: Arc<Subgraph>,
    binding: SubgraphBinding,
    plan: FeedsFetchesPlan,
}

/// The `If` node
pub struct BranchOperator {
    signature: NodeSignature,
    runner: Arc<dyn SubgraphRunner>,
    config: ControlFlowConfig,
    logger: Logger,
    metrics: Arc<MetricsRegistry>,
    then_state: Option<BranchState>,
    else_state: Option<BranchState>,
}

impl BranchOperator {
    /// Logs through `config.logger()` and counts into a fresh registry
    pub fn new(
        signature: NodeSignature,
        runner: Arc<dyn SubgraphRunner>,
        config: ControlFlowConfig,
    ) -> Self {
        let logger = config.logger();
        Self {
            signature,
            runner,
            config,
            logger,
            metrics: Arc::new(MetricsRegistry::new()),
            then_state: None,
            else_state: None,
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn signature(&self) -> &NodeSignature {
        &self.signature
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn is_set_up(&self, branch: Branch) -> bool {
        self.state(branch).is_some()
    }

    /// True once both branches have completed setup
    pub fn is_ready(&self) -> bool {
        self.then_state.is_some() && self.else_state.is_some()
    }

    /// Binds `subgraph` as the branch named by `attribute`.
    ///
    /// Runs at most once per branch. A failed setup leaves the branch unset.
    pub fn setup(
        &mut self,
        attribute: &str,
        subgraph: Arc<Subgraph>,
        locations: &dyn MemoryLocationResolver,
    ) -> BranchResult<()> {
        let outcome = attribute
            .parse::<Branch>()
            .and_then(|branch| self.build_state(branch, subgraph, locations).map(|s| (branch, s)));

        match outcome {
            Ok((branch, state)) => {
                let feeds = state.plan.feed_count().to_string();
                let fetches = state.plan.fetch_count().to_string();
                self.logger.event(
                    Event::BranchSetupComplete,
                    &[
                        ("node", self.signature.name.as_str()),
                        ("branch", branch.attribute_name()),
                        ("feeds", feeds.as_str()),
                        ("fetches", fetches.as_str()),
                    ],
                );
                match branch {
                    Branch::Then => self.then_state = Some(state),
                    Branch::Else => self.else_state = Some(state),
                }
                Ok(())
            }
            Err(err) => {
                self.logger.event(
                    Event::BranchSetupFailed,
                    &[
                        ("node", self.signature.name.as_str()),
                        ("attribute", attribute),
                        ("code", err.code()),
                        ("error", err.to_string().as_str()),
                    ],
                );
                Err(err)
            }
        }
    }

    fn build_state(
        &self,
        branch: Branch,
        subgraph: Arc<Subgraph>,
        locations: &dyn MemoryLocationResolver,
    ) -> BranchResult<BranchState> {
        if self.is_set_up(branch) {
            return Err(BranchError::SetupOrderViolation(branch));
        }

        let binding = SubgraphBinding::construct(
            subgraph.as_ref(),
            self.signature.output_names.len(),
            &self.signature.capture_names,
        )?;
        let pending = FeedsFetchesPlan::construct(
            binding.feed_names(),
            binding.output_names(),
            subgraph.as_ref(),
        )?;

        let feed_locations = pending
            .feed_names()
            .iter()
            .map(|name| locations.location_of(name))
            .collect();
        let fetch_locations = self
            .signature
            .output_names
            .iter()
            .map(|name| locations.location_of(name))
            .collect();
        let plan = pending.finalize_locations(feed_locations, fetch_locations)?;

        Ok(BranchState {
            subgraph,
            binding,
            plan,
        })
    }

    /// Runs the branch `condition` selects and returns which one ran.
    ///
    /// `captures` must follow `capture_names` order. Results land only in
    /// buffers obtained from `outputs`.
    pub fn invoke(
        &self,
        condition: &Tensor,
        captures: &[CapturedValue],
        outputs: &dyn OuterOutputAllocator,
        ctx: &InvocationContext,
    ) -> BranchResult<Branch> {
        let selected = condition.as_bool_scalar().ok_or_else(|| {
            BranchError::InvalidCondition(format!(
                "got {} tensor of shape {}",
                condition.element_type().as_str(),
                condition.shape()
            ))
        })?;
        let branch = Branch::select(selected);
        let state = self.state(branch).ok_or(BranchError::NotSetUp(branch))?;

        let invocation_id = ctx.invocation_id().to_string();
        let scope = ObservationScope::with_fields(
            &self.logger,
            "BRANCH_INVOKE",
            &[
                ("node", self.signature.name.as_str()),
                ("invocation_id", invocation_id.as_str()),
            ],
        );
        self.logger.event(
            Event::BranchSelected,
            &[
                ("node", self.signature.name.as_str()),
                ("branch", branch.attribute_name()),
                ("invocation_id", invocation_id.as_str()),
            ],
        );
        self.metrics.increment_invocations(branch);

        let result = if ctx.cancel_flag().is_cancelled() {
            Err(BranchError::Cancelled)
        } else {
            self.run_branch(state, captures, outputs, ctx)
        };

        match &result {
            Ok(()) => scope.complete_with_fields(&[("branch", branch.attribute_name())]),
            Err(err) if err.is_cancelled() => {
                self.metrics.increment_cancellations();
                scope.cancelled();
            }
            Err(err) => {
                if matches!(err, BranchError::PropagatedFailure(_)) {
                    self.metrics.increment_propagated_failures();
                }
                if err.is_fatal() {
                    scope.fail_fatal(&err.to_string());
                } else {
                    scope.fail(&err.to_string());
                }
            }
        }

        result.map(|()| branch)
    }

    fn run_branch(
        &self,
        state: &BranchState,
        captures: &[CapturedValue],
        outputs: &dyn OuterOutputAllocator,
        ctx: &InvocationContext,
    ) -> BranchResult<()> {
        let env = ExecutionEnv {
            runner: self.runner.as_ref(),
            cancel: ctx.cancel_flag(),
            logger: &self.logger,
            metrics: &self.metrics,
            mode: self.config.nested_mode,
        };

        let mut executor =
            BranchExecutor::new(state.subgraph.as_ref(), &state.binding, captures, outputs);
        executor.initialize(&env)?;
        executor.execute(&state.plan, &env)
    }

    fn state(&self, branch: Branch) -> Option<&BranchState> {
        match branch {
            Branch::Then => self.then_state.as_ref(),
            Branch::Else => self.else_state.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{LocationMap, OutputFrame};
    use crate::graph::KernelError;
    use crate::observability::Severity;
    use crate::runner::GraphRunner;
    use crate::tensor::{ElementType, MemoryLocation, ShapeDescriptor};

    fn kernel<F>(f: F) -> F
    where
        F: Fn(&KernelContext<'_>, &[&Tensor]) -> Result<Vec<Tensor>, KernelError> + Send + Sync,
    {
        f
    }

    fn identity(name: &str, input: &str) -> Arc<Subgraph> {
        Arc::new(
            Subgraph::builder(name)
                .input(input)
                .node("id", kernel(|_, i| Ok(vec![i[0].clone()])), &[input], &["out"])
                .output("out", ElementType::F32, Some(ShapeDescriptor::fixed(&[1])))
                .build()
                .unwrap(),
        )
    }

    fn operator() -> BranchOperator {
        BranchOperator::new(
            NodeSignature::new("if", ["y"], ["a", "b"]),
            Arc::new(GraphRunner::new(1)),
            ControlFlowConfig::default(),
        )
        .with_logger(Logger::memory(Severity::Trace))
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let mut op = operator();
        let err = op
            .setup("maybe_branch", identity("t", "a"), &LocationMap::new())
            .unwrap_err();
        assert_eq!(err, BranchError::UnknownBranch("maybe_branch".to_string()));
        assert!(op
            .logger()
            .lines()
            .iter()
            .any(|line| line.contains("BRANCH_SETUP_FAILED") && line.contains("BRANCH_UNKNOWN")));
    }

    #[test]
    fn test_setup_once_per_branch() {
        let mut op = operator();
        op.setup("then_branch", identity("t", "a"), &LocationMap::new())
            .unwrap();
        assert!(!op.is_ready());

        let err = op
            .setup("then_branch", identity("t2", "b"), &LocationMap::new())
            .unwrap_err();
        assert_eq!(err, BranchError::SetupOrderViolation(Branch::Then));

        op.setup("else_branch", identity("e", "b"), &LocationMap::new())
            .unwrap();
        assert!(op.is_ready());
    }

    #[test]
    fn test_failed_setup_leaves_branch_unset() {
        let mut op = operator();
        let two_outputs = Arc::new(
            Subgraph::builder("wide")
                .input("a")
                .output("a", ElementType::F32, None)
                .output("a", ElementType::F32, None)
                .build()
                .unwrap(),
        );
        assert!(op
            .setup("else_branch", two_outputs, &LocationMap::new())
            .is_err());
        assert!(!op.is_set_up(Branch::Else));

        op.setup("else_branch", identity("e", "a"), &LocationMap::new())
            .unwrap();
        assert!(op.is_set_up(Branch::Else));
    }

    #[test]
    fn test_invalid_condition() {
        let mut op = operator();
        op.setup("then_branch", identity("t", "a"), &LocationMap::new())
            .unwrap();
        let frame = OutputFrame::on_host(&op.signature().output_names);
        let captures = vec![
            CapturedValue::new("a", Tensor::from_f32(&[1], vec![1.0]).unwrap()),
            CapturedValue::new("b", Tensor::from_f32(&[1], vec![2.0]).unwrap()),
        ];

        let not_bool = Tensor::from_i64(&[], vec![1]).unwrap();
        let err = op
            .invoke(&not_bool, &captures, &frame, &InvocationContext::new())
            .unwrap_err();
        assert_eq!(err.code(), "BRANCH_INVALID_CONDITION");

        let not_scalar = Tensor::from_bool(&[2], vec![true, false]).unwrap();
        let err = op
            .invoke(&not_scalar, &captures, &frame, &InvocationContext::new())
            .unwrap_err();
        assert_eq!(err.code(), "BRANCH_INVALID_CONDITION");
        assert_eq!(frame.allocation_count(), 0);
    }

    #[test]
    fn test_fetch_locations_come_from_declared_outputs() {
        let mut op = operator();
        let locations = LocationMap::new().with("y", MemoryLocation::Device(0));
        op.setup("then_branch", identity("t", "a"), &locations)
            .unwrap();
        let plan = &op.state(Branch::Then).unwrap().plan;
        let route = plan.fetch_route(0).unwrap();
        assert_eq!(route.source, MemoryLocation::Host);
        assert_eq!(route.target, MemoryLocation::Device(0));
        assert_eq!(plan.feed_names(), &["a".to_string()][..]);
    }

    #[test]
    fn test_invocation_scope_lines() {
        let mut op = operator();
        op.setup("then_branch", identity("t", "a"), &LocationMap::new())
            .unwrap();
        op.setup("else_branch", identity("e", "b"), &LocationMap::new())
            .unwrap();
        let frame = OutputFrame::on_host(&op.signature().output_names);
        let captures = vec![
            CapturedValue::new("a", Tensor::from_f32(&[1], vec![1.0]).unwrap()),
            CapturedValue::new("b", Tensor::from_f32(&[1], vec![2.0]).unwrap()),
        ];
        let ctx = InvocationContext::new();

        let ran = op
            .invoke(&Tensor::scalar_bool(false), &captures, &frame, &ctx)
            .unwrap();

        assert_eq!(ran, Branch::Else);
        assert_eq!(frame.tensor(0).unwrap().as_f32(), Some(&[2.0][..]));
        let lines = op.logger().lines();
        let id = ctx.invocation_id().to_string();
        assert!(lines
            .iter()
            .any(|line| line.contains("BRANCH_INVOKE_BEGIN") && line.contains(&id)));
        assert!(lines
            .iter()
            .any(|line| line.contains("BRANCH_INVOKE_COMPLETE") && line.contains("else_branch")));
        assert_eq!(op.metrics().invocations(Branch::Else), 1);
        assert_eq!(op.metrics().invocations(Branch::Then), 0);
    }
}
