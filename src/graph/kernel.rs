//! Operator kernel contract
//!
//! Kernels are supplied by the host engine's kernel library. The reference
//! runner hands them their inputs together with the context of the run they
//! belong to, and collects their outputs.

use std::fmt;

use thiserror::Error;

use crate::controlflow::{BranchError, ExecutionFailure};
use crate::observability::Logger;
use crate::runner::{CancellationFlag, ExecutionMode};
use crate::tensor::Tensor;

/// Context of the subgraph run a kernel executes in.
///
/// A kernel that runs a nested subgraph (a nested `If`) passes this run's
/// cancellation flag and logger down, so one flag reaches every level.
#[derive(Debug, Clone, Copy)]
pub struct KernelContext<'a> {
    node: &'a str,
    cancel: &'a CancellationFlag,
    logger: &'a Logger,
    mode: ExecutionMode,
}

impl<'a> KernelContext<'a> {
    pub fn new(
        node: &'a str,
        cancel: &'a CancellationFlag,
        logger: &'a Logger,
        mode: ExecutionMode,
    ) -> Self {
        Self {
            node,
            cancel,
            logger,
            mode,
        }
    }

    /// Name of the node being computed
    pub fn node(&self) -> &'a str {
        self.node
    }

    pub fn cancel_flag(&self) -> &'a CancellationFlag {
        self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn logger(&self) -> &'a Logger {
        self.logger
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }
}

/// Failure raised by a kernel. The message crosses every boundary unchanged.
///
/// A failure of a nested subgraph run keeps the original `ExecutionFailure`,
/// so it reaches the outermost caller as raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct KernelError {
    message: String,
    nested: Option<ExecutionFailure>,
}

impl KernelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            nested: None,
        }
    }

    /// Wraps the failure of a nested subgraph run
    pub fn nested(failure: ExecutionFailure) -> Self {
        Self {
            message: failure.message().to_string(),
            nested: Some(failure),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn nested_failure(&self) -> Option<&ExecutionFailure> {
        self.nested.as_ref()
    }

    /// The failure to report for `node`: the nested one if any
    pub fn into_failure(self, node: &str) -> ExecutionFailure {
        match self.nested {
            Some(failure) => failure,
            None => ExecutionFailure::new(node, self.message),
        }
    }
}

impl From<BranchError> for KernelError {
    fn from(err: BranchError) -> Self {
        match err {
            BranchError::PropagatedFailure(failure) => Self::nested(failure),
            other => Self::new(other.to_string()),
        }
    }
}

/// A single operator implementation
pub trait Kernel: Send + Sync {
    /// Computes all outputs of the operator from its inputs, in declared order
    fn compute(
        &self,
        ctx: &KernelContext<'_>,
        inputs: &[&Tensor],
    ) -> Result<Vec<Tensor>, KernelError>;
}

impl<F> Kernel for F
where
    F: Fn(&KernelContext<'_>, &[&Tensor]) -> Result<Vec<Tensor>, KernelError> + Send + Sync,
{
    fn compute(
        &self,
        ctx: &KernelContext<'_>,
        inputs: &[&Tensor],
    ) -> Result<Vec<Tensor>, KernelError> {
        self(ctx, inputs)
    }
}

impl fmt::Debug for dyn Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<kernel>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::Severity;

    #[test]
    fn test_nested_failure_kept_as_raised() {
        let inner = ExecutionFailure::new("inner_div", "division by zero");
        let err = KernelError::from(BranchError::PropagatedFailure(inner.clone()));
        assert_eq!(err.nested_failure(), Some(&inner));
        assert_eq!(err.into_failure("outer_if"), inner);
    }

    #[test]
    fn test_plain_failure_attributed_to_node() {
        let err = KernelError::from(BranchError::ShapeMissing { name: "y".into() });
        assert!(err.nested_failure().is_none());
        let failure = err.into_failure("outer_if");
        assert_eq!(failure.node(), "outer_if");
        assert!(failure.message().contains("'y'"));
    }

    #[test]
    fn test_context_reads_shared_flag() {
        let cancel = CancellationFlag::new();
        let logger = Logger::memory(Severity::Info);
        let ctx = KernelContext::new("n", &cancel, &logger, ExecutionMode::Parallel);
        assert!(!ctx.is_cancelled());
        cancel.cancel();
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.mode(), ExecutionMode::Parallel);
        assert_eq!(ctx.node(), "n");
    }
}
