//! Branch operator error types
//!
//! Error codes:
//! - BRANCH_ARITY_MISMATCH (FATAL)
//! - BRANCH_UNRESOLVED_NAME (FATAL)
//! - BRANCH_SHAPE_MISSING (FATAL)
//! - BRANCH_SETUP_ORDER (FATAL)
//! - BRANCH_NOT_SET_UP (FATAL)
//! - BRANCH_UNKNOWN (FATAL)
//! - BRANCH_LOCATION_COUNT (FATAL)
//! - BRANCH_CAPTURE_COUNT (FATAL)
//! - BRANCH_CAPTURE_NAME (FATAL)
//! - BRANCH_EXECUTOR_STATE (FATAL)
//! - BRANCH_INVALID_CONDITION (ERROR)
//! - BRANCH_ALLOCATION_FAILED (ERROR)
//! - BRANCH_PROPAGATED_FAILURE (ERROR)
//! - BRANCH_CANCELLED (INFO)

use thiserror::Error;

use crate::observability::Severity;

use super::branch::Branch;
use super::executor::ExecutorState;

/// Result type for branch operator operations
pub type BranchResult<T> = Result<T, BranchError>;

/// A failure raised inside subgraph execution.
///
/// Carried through every level of nesting unchanged; equality is exact so a
/// caller can match the failure its own kernel raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{node}' failed: {message}")]
pub struct ExecutionFailure {
    node: String,
    message: String,
}

impl ExecutionFailure {
    pub fn new(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Node, task or value the failure is attributed to
    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BranchError {
    #[error("subgraph '{subgraph}' declares {actual} outputs but the node declares {expected}")]
    ArityMismatch {
        subgraph: String,
        expected: usize,
        actual: usize,
    },

    #[error("capture '{name}' has no input slot in subgraph '{subgraph}'")]
    UnresolvedName { subgraph: String, name: String },

    #[error("subgraph must have a shape for every output but '{name}' has none")]
    ShapeMissing { name: String },

    #[error("setup may only run once per branch; {0} is already set up")]
    SetupOrderViolation(Branch),

    #[error("{0} was selected but never set up")]
    NotSetUp(Branch),

    #[error("unknown branch attribute '{0}'")]
    UnknownBranch(String),

    #[error("expected {expected} {kind} locations, got {actual}")]
    LocationCountMismatch {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("node captures {expected} values but {actual} were supplied")]
    CaptureCountMismatch { expected: usize, actual: usize },

    #[error("capture {index} must be '{expected}' but '{actual}' was supplied")]
    CaptureNameMismatch {
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("condition must be a single boolean: {0}")]
    InvalidCondition(String),

    #[error("executor is {actual}, expected {expected}")]
    InvalidExecutorState {
        expected: ExecutorState,
        actual: ExecutorState,
    },

    #[error("failed to allocate output {index}: {reason}")]
    AllocationFailed { index: usize, reason: String },

    #[error(transparent)]
    PropagatedFailure(#[from] ExecutionFailure),

    #[error("execution cancelled")]
    Cancelled,
}

impl BranchError {
    /// Stable string code
    pub fn code(&self) -> &'static str {
        match self {
            BranchError::ArityMismatch { .. } => "BRANCH_ARITY_MISMATCH",
            BranchError::UnresolvedName { .. } => "BRANCH_UNRESOLVED_NAME",
            BranchError::ShapeMissing { .. } => "BRANCH_SHAPE_MISSING",
            BranchError::SetupOrderViolation(_) => "BRANCH_SETUP_ORDER",
            BranchError::NotSetUp(_) => "BRANCH_NOT_SET_UP",
            BranchError::UnknownBranch(_) => "BRANCH_UNKNOWN",
            BranchError::LocationCountMismatch { .. } => "BRANCH_LOCATION_COUNT",
            BranchError::CaptureCountMismatch { .. } => "BRANCH_CAPTURE_COUNT",
            BranchError::CaptureNameMismatch { .. } => "BRANCH_CAPTURE_NAME",
            BranchError::InvalidCondition(_) => "BRANCH_INVALID_CONDITION",
            BranchError::InvalidExecutorState { .. } => "BRANCH_EXECUTOR_STATE",
            BranchError::AllocationFailed { .. } => "BRANCH_ALLOCATION_FAILED",
            BranchError::PropagatedFailure(_) => "BRANCH_PROPAGATED_FAILURE",
            BranchError::Cancelled => "BRANCH_CANCELLED",
        }
    }

    /// Contract violations are fatal; runtime failures are errors;
    /// cancellation is informational.
    pub fn severity(&self) -> Severity {
        match self {
            BranchError::InvalidCondition(_)
            | BranchError::AllocationFailed { .. }
            | BranchError::PropagatedFailure(_) => Severity::Error,
            BranchError::Cancelled => Severity::Info,
            _ => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Callers skip error logging for cancelled runs
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BranchError::Cancelled)
    }
}
