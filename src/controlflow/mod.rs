//! Conditional branch control flow
//!
//! An `If` node carries two subgraphs, `then_branch` and `else_branch`.
//! At setup each branch gets a `SubgraphBinding` (which captures it reads,
//! which outputs it produces) and a finalized `FeedsFetchesPlan` (slots and
//! memory locations). At run time `BranchOperator::invoke` reads a boolean
//! scalar, builds a `BranchExecutor` for the selected branch and runs it
//! straight into the node's declared outputs.
//!
//! Guarantees:
//! - exactly one branch runs per invocation
//! - setup happens once per branch
//! - resolved outputs are written in place; deferred ones are allocated by
//!   the subgraph once their shape is known
//! - subgraph failures surface unchanged; cancellation is reported as
//!   `BranchError::Cancelled`

mod binding;
mod branch;
mod errors;
mod executor;
mod operator;
mod plan;

pub use binding::SubgraphBinding;
pub use branch::Branch;
pub use errors::{BranchError, BranchResult, ExecutionFailure};
pub use executor::{AllocationRecord, BranchExecutor, ExecutionEnv, ExecutorState};
pub use operator::{BranchOperator, CapturedValue, InvocationContext, NodeSignature};
pub use plan::{FeedsFetchesPlan, TransferRoute, UnfinalizedPlan};
