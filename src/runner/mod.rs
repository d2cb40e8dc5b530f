//! Subgraph execution
//!
//! `SubgraphRunner` is the contract the branch operator drives; `GraphRunner`
//! is the in-process implementation used when no host engine supplies one.

mod cancel;
mod contract;
mod graph_runner;

pub use cancel::CancellationFlag;
pub use contract::{DeferredAllocation, ExecutionMode, FetchSlot, RunRequest, SubgraphRunner};
pub use graph_runner::GraphRunner;
