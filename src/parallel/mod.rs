//! Parallel task batches for independent subgraph nodes

mod batch;

pub(crate) use batch::panic_message;
pub use batch::TaskBatch;
