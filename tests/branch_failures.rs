//! Failure and cancellation tests
//!
//! Test Categories:
//! 1. Failures in the selected branch surface unchanged
//! 2. Failures in the unselected branch never leak
//! 3. Cancellation, including from inside a nested branch
//! 4. First failure wins in parallel batches

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use condgraph::config::ControlFlowConfig;
use condgraph::controlflow::{
    Branch, BranchError, BranchOperator, CapturedValue, ExecutionFailure, InvocationContext,
    NodeSignature,
};
use condgraph::frame::{LocationMap, OutputFrame};
use condgraph::graph::{Kernel, KernelContext, KernelError, Subgraph};
use condgraph::observability::{Logger, Severity};
use condgraph::parallel::TaskBatch;
use condgraph::runner::{CancellationFlag, ExecutionMode, GraphRunner};
use condgraph::tensor::{ElementType, ShapeDescriptor, Tensor};

// =============================================================================
// Test doubles
// =============================================================================

/// Always fails with a fixed message
struct Failing(&'static str);

impl Kernel for Failing {
    fn compute(
        &self,
        _ctx: &KernelContext<'_>,
        _inputs: &[&Tensor],
    ) -> Result<Vec<Tensor>, KernelError> {
        Err(KernelError::new(self.0))
    }
}

/// Emits a one-element constant and counts its runs
struct Constant {
    value: f32,
    calls: Arc<AtomicUsize>,
}

impl Kernel for Constant {
    fn compute(
        &self,
        _ctx: &KernelContext<'_>,
        _inputs: &[&Tensor],
    ) -> Result<Vec<Tensor>, KernelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Tensor::from_f32(&[1], vec![self.value])
            .map(|t| vec![t])
            .map_err(|e| KernelError::new(e.to_string()))
    }
}

/// Raises the flag of the run it executes in, then succeeds
struct RaiseCancel;

impl Kernel for RaiseCancel {
    fn compute(
        &self,
        ctx: &KernelContext<'_>,
        inputs: &[&Tensor],
    ) -> Result<Vec<Tensor>, KernelError> {
        ctx.cancel_flag().cancel();
        Ok(vec![inputs[0].clone()])
    }
}

/// Runs an inner `If` under the enclosing run's cancellation flag
struct NestedIf {
    inner: Arc<BranchOperator>,
}

impl Kernel for NestedIf {
    fn compute(
        &self,
        ctx: &KernelContext<'_>,
        inputs: &[&Tensor],
    ) -> Result<Vec<Tensor>, KernelError> {
        let frame = OutputFrame::on_host(&self.inner.signature().output_names);
        let captures = vec![CapturedValue::new("v", inputs[0].clone())];
        self.inner.invoke(
            &Tensor::scalar_bool(true),
            &captures,
            &frame,
            &InvocationContext::nested(ctx),
        )?;
        frame
            .tensor(0)
            .map(|t| vec![t])
            .ok_or_else(|| KernelError::new("inner output missing"))
    }
}

fn failing_branch() -> Arc<Subgraph> {
    Arc::new(
        Subgraph::builder("then")
            .node("broken", Failing("matmul: inner dimensions differ"), &[], &["out"])
            .output("out", ElementType::F32, Some(ShapeDescriptor::fixed(&[1])))
            .build()
            .unwrap(),
    )
}

fn constant_branch(name: &str, value: f32, calls: &Arc<AtomicUsize>) -> Arc<Subgraph> {
    Arc::new(
        Subgraph::builder(name)
            .node(
                "const",
                Constant {
                    value,
                    calls: Arc::clone(calls),
                },
                &[],
                &["out"],
            )
            .output("out", ElementType::F32, Some(ShapeDescriptor::fixed(&[1])))
            .build()
            .unwrap(),
    )
}

fn operator_with(mode: ExecutionMode) -> BranchOperator {
    let config = ControlFlowConfig {
        parallel_workers: 2,
        nested_mode: mode,
        ..ControlFlowConfig::default()
    };
    BranchOperator::new(
        NodeSignature::new("if", ["y"], Vec::<String>::new()),
        Arc::new(GraphRunner::from_config(&config)),
        config,
    )
    .with_logger(Logger::memory(Severity::Trace))
}

// =============================================================================
// FAILURE PROPAGATION
// =============================================================================

#[test]
fn test_selected_failure_surfaces_unchanged() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut op = operator_with(ExecutionMode::Sequential);
    op.setup("then_branch", failing_branch(), &LocationMap::new())
        .unwrap();
    op.setup("else_branch", constant_branch("else", 7.0, &calls), &LocationMap::new())
        .unwrap();

    let frame = OutputFrame::on_host(&op.signature().output_names);
    let err = op
        .invoke(&Tensor::scalar_bool(true), &[], &frame, &InvocationContext::new())
        .unwrap_err();

    assert_eq!(
        err,
        BranchError::PropagatedFailure(ExecutionFailure::new(
            "broken",
            "matmul: inner dimensions differ"
        ))
    );
    assert_eq!(err.to_string(), "'broken' failed: matmul: inner dimensions differ");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(op.metrics().snapshot().propagated_failures, 1);

    let lines = op.logger().lines();
    assert!(lines.iter().any(|line| line.contains("BRANCH_INVOKE_FAILED")));
    assert!(lines.iter().any(|line| line.contains("SUBGRAPH_NODE_FAILED")));
}

#[test]
fn test_unselected_failure_never_leaks() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut op = operator_with(ExecutionMode::Sequential);
    op.setup("then_branch", failing_branch(), &LocationMap::new())
        .unwrap();
    op.setup("else_branch", constant_branch("else", 7.0, &calls), &LocationMap::new())
        .unwrap();

    let frame = OutputFrame::on_host(&op.signature().output_names);
    let ran = op
        .invoke(&Tensor::scalar_bool(false), &[], &frame, &InvocationContext::new())
        .unwrap();

    assert_eq!(ran, Branch::Else);
    assert_eq!(frame.tensor(0).unwrap().as_f32(), Some(&[7.0][..]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!op
        .logger()
        .lines()
        .iter()
        .any(|line| line.contains("SUBGRAPH_NODE_FAILED")));
}

#[test]
fn test_failure_is_not_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted_failure = Arc::new(
        Subgraph::builder("then")
            .node(
                "count",
                Constant {
                    value: 0.0,
                    calls: Arc::clone(&calls),
                },
                &[],
                &["c"],
            )
            .node("broken", Failing("boom"), &["c"], &["out"])
            .output("out", ElementType::F32, Some(ShapeDescriptor::fixed(&[1])))
            .build()
            .unwrap(),
    );
    let mut op = operator_with(ExecutionMode::Sequential);
    op.setup("then_branch", counted_failure, &LocationMap::new())
        .unwrap();

    let frame = OutputFrame::on_host(&op.signature().output_names);
    assert!(op
        .invoke(&Tensor::scalar_bool(true), &[], &frame, &InvocationContext::new())
        .is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// =============================================================================
// CANCELLATION
// =============================================================================

#[test]
fn test_preset_cancellation_returns_cancelled() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut op = operator_with(ExecutionMode::Sequential);
    op.setup("then_branch", constant_branch("then", 1.0, &calls), &LocationMap::new())
        .unwrap();

    let cancel = CancellationFlag::new();
    cancel.cancel();
    let frame = OutputFrame::on_host(&op.signature().output_names);
    let err = op
        .invoke(
            &Tensor::scalar_bool(true),
            &[],
            &frame,
            &InvocationContext::with_cancel(cancel),
        )
        .unwrap_err();

    assert_eq!(err, BranchError::Cancelled);
    assert!(err.is_cancelled());
    assert_eq!(err.severity(), Severity::Info);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!frame.is_populated());
    assert_eq!(frame.allocation_count(), 0);
    assert_eq!(op.metrics().snapshot().cancellations, 1);
    assert!(op
        .logger()
        .lines()
        .iter()
        .any(|line| line.contains("BRANCH_INVOKE_CANCELLED")));
}

#[test]
fn test_cancel_raised_mid_branch_skips_remaining_nodes() {
    let cancel = CancellationFlag::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let branch = Arc::new(
        Subgraph::builder("then")
            .input("v")
            .node("raise", RaiseCancel, &["v"], &["r"])
            .node(
                "after",
                Constant {
                    value: 1.0,
                    calls: Arc::clone(&calls),
                },
                &["r"],
                &["out"],
            )
            .output("out", ElementType::F32, Some(ShapeDescriptor::fixed(&[1])))
            .build()
            .unwrap(),
    );
    let mut op = BranchOperator::new(
        NodeSignature::new("if", ["y"], ["v"]),
        Arc::new(GraphRunner::new(1)),
        ControlFlowConfig::default(),
    )
    .with_logger(Logger::memory(Severity::Info));
    op.setup("then_branch", branch, &LocationMap::new())
        .unwrap();

    let frame = OutputFrame::on_host(&op.signature().output_names);
    let captures = vec![CapturedValue::new("v", Tensor::scalar_bool(true))];
    let err = op
        .invoke(
            &Tensor::scalar_bool(true),
            &captures,
            &frame,
            &InvocationContext::with_cancel(cancel.clone()),
        )
        .unwrap_err();

    assert_eq!(err, BranchError::Cancelled);
    assert!(cancel.is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    // the eagerly allocated buffer was never written
    assert_eq!(frame.tensor(0).unwrap().as_f32(), Some(&[0.0][..]));
}

/// Outer `If` whose then-branch runs `inner_branch` through a nested `If`,
/// followed by a counted node
fn nested_operator(inner_branch: Arc<Subgraph>, calls: &Arc<AtomicUsize>) -> BranchOperator {
    let mut inner = BranchOperator::new(
        NodeSignature::new("inner_if", ["r"], ["v"]),
        Arc::new(GraphRunner::new(1)),
        ControlFlowConfig::default(),
    )
    .with_logger(Logger::memory(Severity::Info));
    inner
        .setup("then_branch", inner_branch, &LocationMap::new())
        .unwrap();

    let outer_branch = Arc::new(
        Subgraph::builder("outer_then")
            .input("v")
            .node(
                "nested",
                NestedIf {
                    inner: Arc::new(inner),
                },
                &["v"],
                &["n"],
            )
            .node(
                "after",
                Constant {
                    value: 1.0,
                    calls: Arc::clone(calls),
                },
                &["n"],
                &["out"],
            )
            .output("out", ElementType::F32, Some(ShapeDescriptor::fixed(&[1])))
            .build()
            .unwrap(),
    );
    let mut outer = BranchOperator::new(
        NodeSignature::new("outer_if", ["y"], ["v"]),
        Arc::new(GraphRunner::new(1)),
        ControlFlowConfig::default(),
    )
    .with_logger(Logger::memory(Severity::Info));
    outer
        .setup("then_branch", outer_branch, &LocationMap::new())
        .unwrap();
    outer
}

fn scalar_capture() -> Vec<CapturedValue> {
    vec![CapturedValue::new(
        "v",
        Tensor::from_f32(&[1], vec![3.0]).unwrap(),
    )]
}

#[test]
fn test_nested_cancellation_reaches_outer_caller() {
    let inner_branch = Arc::new(
        Subgraph::builder("inner_then")
            .input("v")
            .node("raise", RaiseCancel, &["v"], &["out"])
            .output("out", ElementType::F32, Some(ShapeDescriptor::fixed(&[1])))
            .build()
            .unwrap(),
    );
    let calls = Arc::new(AtomicUsize::new(0));
    let outer = nested_operator(inner_branch, &calls);

    let cancel = CancellationFlag::new();
    let frame = OutputFrame::on_host(&outer.signature().output_names);
    let err = outer
        .invoke(
            &Tensor::scalar_bool(true),
            &scalar_capture(),
            &frame,
            &InvocationContext::with_cancel(cancel.clone()),
        )
        .unwrap_err();

    assert_eq!(err, BranchError::Cancelled);
    assert!(cancel.is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_nested_run_uses_each_callers_flag() {
    let inner_branch = Arc::new(
        Subgraph::builder("inner_then")
            .input("v")
            .node("raise", RaiseCancel, &["v"], &["out"])
            .output("out", ElementType::F32, Some(ShapeDescriptor::fixed(&[1])))
            .build()
            .unwrap(),
    );
    let calls = Arc::new(AtomicUsize::new(0));
    let outer = nested_operator(inner_branch, &calls);

    let first = CancellationFlag::new();
    let second = CancellationFlag::new();

    let frame = OutputFrame::on_host(&outer.signature().output_names);
    let err = outer
        .invoke(
            &Tensor::scalar_bool(true),
            &scalar_capture(),
            &frame,
            &InvocationContext::with_cancel(first.clone()),
        )
        .unwrap_err();
    assert_eq!(err, BranchError::Cancelled);
    assert!(first.is_cancelled());
    assert!(!second.is_cancelled());

    let frame = OutputFrame::on_host(&outer.signature().output_names);
    let err = outer
        .invoke(
            &Tensor::scalar_bool(true),
            &scalar_capture(),
            &frame,
            &InvocationContext::with_cancel(second.clone()),
        )
        .unwrap_err();
    assert_eq!(err, BranchError::Cancelled);
    assert!(second.is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_nested_failure_reaches_outer_caller_unchanged() {
    let inner_branch = Arc::new(
        Subgraph::builder("inner_then")
            .input("v")
            .node("inner_broken", Failing("gather: index out of range"), &["v"], &["out"])
            .output("out", ElementType::F32, Some(ShapeDescriptor::fixed(&[1])))
            .build()
            .unwrap(),
    );
    let calls = Arc::new(AtomicUsize::new(0));
    let outer = nested_operator(inner_branch, &calls);

    let frame = OutputFrame::on_host(&outer.signature().output_names);
    let err = outer
        .invoke(
            &Tensor::scalar_bool(true),
            &scalar_capture(),
            &frame,
            &InvocationContext::new(),
        )
        .unwrap_err();

    assert_eq!(
        err,
        BranchError::PropagatedFailure(ExecutionFailure::new(
            "inner_broken",
            "gather: index out of range"
        ))
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(outer.metrics().snapshot().propagated_failures, 1);
}

// =============================================================================
// PARALLEL BATCHES
// =============================================================================

#[test]
fn test_parallel_branch_reports_first_scheduled_failure() {
    let calls = Arc::new(AtomicUsize::new(0));
    let branch = Arc::new(
        Subgraph::builder("then")
            .node(
                "ok",
                Constant {
                    value: 1.0,
                    calls: Arc::clone(&calls),
                },
                &[],
                &["a"],
            )
            .node("first", Failing("first"), &[], &["b"])
            .node(
                "ok_again",
                Constant {
                    value: 2.0,
                    calls: Arc::clone(&calls),
                },
                &[],
                &["c"],
            )
            .node("second", Failing("second"), &[], &["d"])
            .output("a", ElementType::F32, Some(ShapeDescriptor::fixed(&[1])))
            .build()
            .unwrap(),
    );
    let mut op = operator_with(ExecutionMode::Parallel);
    op.setup("then_branch", branch, &LocationMap::new())
        .unwrap();

    let frame = OutputFrame::on_host(&op.signature().output_names);
    let err = op
        .invoke(&Tensor::scalar_bool(true), &[], &frame, &InvocationContext::new())
        .unwrap_err();

    assert_eq!(
        err,
        BranchError::PropagatedFailure(ExecutionFailure::new("first", "first"))
    );
    // every task in the batch ran before the failure was reported
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    // partial results of the failed batch were never written
    assert_eq!(frame.tensor(0).unwrap().as_f32(), Some(&[0.0][..]));
}

#[test]
fn test_task_batch_waits_for_all_tasks() {
    let finished = AtomicUsize::new(0);
    let mut batch = TaskBatch::new(2);
    for i in 0..5usize {
        let finished = &finished;
        batch.schedule(format!("task{}", i), move || {
            finished.fetch_add(1, Ordering::SeqCst);
            match i {
                1 => Err(ExecutionFailure::new("task1", "one")),
                3 => Err(ExecutionFailure::new("task3", "three")),
                _ => Ok(i),
            }
        });
    }

    let err = batch.join().unwrap_err();
    assert_eq!(err, ExecutionFailure::new("task1", "one"));
    assert_eq!(finished.load(Ordering::SeqCst), 5);
}
