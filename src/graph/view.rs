//! Read-only view of a resolved subgraph's interface

use crate::tensor::{ElementType, MemoryLocation, ShapeDescriptor};

/// A declared graph output
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDef {
    pub name: String,
    pub element_type: ElementType,
    /// `None` when shape inference produced nothing at all for this value
    pub shape: Option<ShapeDescriptor>,
}

impl OutputDef {
    pub fn new(
        name: impl Into<String>,
        element_type: ElementType,
        shape: Option<ShapeDescriptor>,
    ) -> Self {
        Self {
            name: name.into(),
            element_type,
            shape,
        }
    }
}

/// What the branch operator needs to know about a subgraph at setup time
pub trait GraphStructureView {
    fn name(&self) -> &str;

    /// Declared outputs in order
    fn outputs(&self) -> &[OutputDef];

    /// Resolves a name in the subgraph's input namespace to its slot
    fn input_slot(&self, name: &str) -> Option<usize>;

    /// Memory space the subgraph expects the input at `slot` in
    fn input_location(&self, slot: usize) -> MemoryLocation;

    /// Memory space the subgraph produces output `index` in
    fn output_location(&self, index: usize) -> MemoryLocation;
}
