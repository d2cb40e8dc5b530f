//! Tensor value model
//!
//! The minimal value representation the branch operator moves between the
//! enclosing scope and a subgraph: declared shapes, concrete shapes, typed
//! dense storage, memory locations and shared buffer handles.

mod errors;
mod shape;
mod value;

pub use errors::{TensorError, TensorResult};
pub use shape::{Dim, ShapeDescriptor, TensorShape};
pub use value::{ElementType, MemoryLocation, Tensor, TensorData, TensorHandle};
