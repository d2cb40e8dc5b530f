//! Observable events
//!
//! Events are explicit and typed. Each carries the severity it is logged at.

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration loaded from disk
    ConfigLoaded,

    // Setup
    /// Binding and plan built for one branch
    BranchSetupComplete,
    /// Setup rejected for one branch
    BranchSetupFailed,

    // Invocation
    /// Condition read, branch chosen
    BranchSelected,
    /// Output buffer allocated before execution
    BranchOutputAllocated,
    /// Output allocation deferred to the subgraph
    BranchOutputDeferred,

    // Subgraph execution
    /// A node inside the subgraph failed
    SubgraphNodeFailed,
    /// Execution stopped at a cancellation check
    SubgraphCancelled,
    /// A feed was moved into the subgraph's memory space
    FeedTransfer,
    /// A fetch was moved into the enclosing output's memory space
    FetchTransfer,
    /// A parallel batch completed with at least one failure
    TaskBatchFailed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::BranchSetupComplete => "BRANCH_SETUP_COMPLETE",
            Event::BranchSetupFailed => "BRANCH_SETUP_FAILED",
            Event::BranchSelected => "BRANCH_SELECTED",
            Event::BranchOutputAllocated => "BRANCH_OUTPUT_ALLOCATED",
            Event::BranchOutputDeferred => "BRANCH_OUTPUT_DEFERRED",
            Event::SubgraphNodeFailed => "SUBGRAPH_NODE_FAILED",
            Event::SubgraphCancelled => "SUBGRAPH_CANCELLED",
            Event::FeedTransfer => "FEED_TRANSFER",
            Event::FetchTransfer => "FETCH_TRANSFER",
            Event::TaskBatchFailed => "TASK_BATCH_FAILED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::BranchSetupFailed => Severity::Fatal,
            Event::SubgraphNodeFailed | Event::TaskBatchFailed => Severity::Error,
            Event::BranchOutputAllocated
            | Event::BranchOutputDeferred
            | Event::FeedTransfer
            | Event::FetchTransfer => Severity::Trace,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
