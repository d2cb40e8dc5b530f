//! Enclosing-scope frame
//!
//! The only state shared between the node and the subgraph it runs: the
//! allocator for the node's declared outputs, the output buffers themselves,
//! and the placement of enclosing-scope values.

mod allocator;
mod locations;
mod output_frame;

pub use allocator::OuterOutputAllocator;
pub use locations::{LocationMap, MemoryLocationResolver};
pub use output_frame::OutputFrame;
