//! Subgraph structure
//!
//! A resolved nested graph as the branch operator sees it: a read-only
//! interface (`GraphStructureView`) used at setup time, plus the node list
//! the reference runner walks at execution time.

mod errors;
mod kernel;
mod slot_map;
mod subgraph;
mod view;

pub use errors::{GraphError, GraphResult};
pub use kernel::{Kernel, KernelContext, KernelError};
pub use slot_map::NameSlotMap;
pub use subgraph::{Node, Subgraph, SubgraphBuilder};
pub use view::{GraphStructureView, OutputDef};
