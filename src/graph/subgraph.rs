//! In-memory resolved subgraph
//!
//! Nodes are appended in topological order: every node input must name a
//! graph input or an output of an earlier node, so a built subgraph is
//! acyclic by construction.

use std::sync::Arc;

use crate::tensor::{ElementType, MemoryLocation, ShapeDescriptor};

use super::errors::{GraphError, GraphResult};
use super::kernel::Kernel;
use super::slot_map::NameSlotMap;
use super::view::{GraphStructureView, OutputDef};

/// An operator instance bound to value slots
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    kernel: Arc<dyn Kernel>,
    inputs: Vec<usize>,
    outputs: Vec<usize>,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kernel(&self) -> &dyn Kernel {
        self.kernel.as_ref()
    }

    /// Value slots consumed, in kernel argument order
    pub fn inputs(&self) -> &[usize] {
        &self.inputs
    }

    /// Value slots produced, in kernel result order
    pub fn outputs(&self) -> &[usize] {
        &self.outputs
    }
}

/// A resolved subgraph ready for execution
#[derive(Debug, Clone)]
pub struct Subgraph {
    name: String,
    values: NameSlotMap,
    input_count: usize,
    input_locations: Vec<MemoryLocation>,
    nodes: Vec<Node>,
    outputs: Vec<OutputDef>,
    output_slots: Vec<usize>,
    output_locations: Vec<MemoryLocation>,
    levels: Vec<Vec<usize>>,
}

impl Subgraph {
    pub fn builder(name: impl Into<String>) -> SubgraphBuilder {
        SubgraphBuilder::new(name)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Total number of value slots (inputs plus every node output)
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn value_name(&self, slot: usize) -> &str {
        self.values.name(slot).unwrap_or("<unknown>")
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    /// Value slot holding declared output `index`
    pub fn output_value_slot(&self, index: usize) -> Option<usize> {
        self.output_slots.get(index).copied()
    }

    pub fn output_value_slots(&self) -> &[usize] {
        &self.output_slots
    }

    /// Node indices grouped so that every node only depends on earlier groups
    pub fn levels(&self) -> &[Vec<usize>] {
        &self.levels
    }
}

impl GraphStructureView for Subgraph {
    fn name(&self) -> &str {
        &self.name
    }

    fn outputs(&self) -> &[OutputDef] {
        &self.outputs
    }

    fn input_slot(&self, name: &str) -> Option<usize> {
        self.values.get(name).filter(|&slot| slot < self.input_count)
    }

    fn input_location(&self, slot: usize) -> MemoryLocation {
        self.input_locations.get(slot).copied().unwrap_or_default()
    }

    fn output_location(&self, index: usize) -> MemoryLocation {
        self.output_locations.get(index).copied().unwrap_or_default()
    }
}

struct PendingNode {
    name: String,
    kernel: Arc<dyn Kernel>,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

struct PendingOutput {
    def: OutputDef,
    location: MemoryLocation,
}

/// Builds a `Subgraph`; all validation happens in `build`
pub struct SubgraphBuilder {
    name: String,
    inputs: Vec<(String, MemoryLocation)>,
    nodes: Vec<PendingNode>,
    outputs: Vec<PendingOutput>,
}

impl SubgraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            nodes: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Declares a host-resident graph input
    pub fn input(self, name: impl Into<String>) -> Self {
        self.input_at(name, MemoryLocation::Host)
    }

    pub fn input_at(mut self, name: impl Into<String>, location: MemoryLocation) -> Self {
        self.inputs.push((name.into(), location));
        self
    }

    pub fn node(
        mut self,
        name: impl Into<String>,
        kernel: impl Kernel + 'static,
        inputs: &[&str],
        outputs: &[&str],
    ) -> Self {
        self.nodes.push(PendingNode {
            name: name.into(),
            kernel: Arc::new(kernel),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    /// Declares a host-resident graph output
    pub fn output(
        self,
        name: impl Into<String>,
        element_type: ElementType,
        shape: Option<ShapeDescriptor>,
    ) -> Self {
        self.output_at(name, element_type, shape, MemoryLocation::Host)
    }

    pub fn output_at(
        mut self,
        name: impl Into<String>,
        element_type: ElementType,
        shape: Option<ShapeDescriptor>,
        location: MemoryLocation,
    ) -> Self {
        self.outputs.push(PendingOutput {
            def: OutputDef::new(name, element_type, shape),
            location,
        });
        self
    }

    pub fn build(self) -> GraphResult<Subgraph> {
        let graph = self.name;
        let mut values = NameSlotMap::new();
        let mut input_locations = Vec::with_capacity(self.inputs.len());
        // level of the node producing each slot; graph inputs sit below level 0
        let mut producer_level: Vec<Option<usize>> = Vec::new();

        for (name, location) in self.inputs {
            if values.insert(name.clone()).is_none() {
                return Err(GraphError::DuplicateValue { graph, name });
            }
            input_locations.push(location);
            producer_level.push(None);
        }
        let input_count = values.len();

        let mut nodes = Vec::with_capacity(self.nodes.len());
        let mut levels: Vec<Vec<usize>> = Vec::new();

        for (index, pending) in self.nodes.into_iter().enumerate() {
            let mut inputs = Vec::with_capacity(pending.inputs.len());
            let mut level = 0;
            for input in &pending.inputs {
                let slot = values.get(input).ok_or_else(|| GraphError::UndefinedInput {
                    node: pending.name.clone(),
                    input: input.clone(),
                })?;
                if let Some(parent) = producer_level[slot] {
                    level = level.max(parent + 1);
                }
                inputs.push(slot);
            }

            let mut outputs = Vec::with_capacity(pending.outputs.len());
            for output in pending.outputs {
                let slot = values
                    .insert(output.clone())
                    .ok_or_else(|| GraphError::DuplicateValue {
                        graph: graph.clone(),
                        name: output,
                    })?;
                producer_level.push(Some(level));
                outputs.push(slot);
            }

            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(index);

            nodes.push(Node {
                name: pending.name,
                kernel: pending.kernel,
                inputs,
                outputs,
            });
        }

        let mut outputs = Vec::with_capacity(self.outputs.len());
        let mut output_slots = Vec::with_capacity(self.outputs.len());
        let mut output_locations = Vec::with_capacity(self.outputs.len());
        for pending in self.outputs {
            let slot = values
                .get(&pending.def.name)
                .ok_or_else(|| GraphError::UndefinedOutput {
                    graph: graph.clone(),
                    name: pending.def.name.clone(),
                })?;
            output_slots.push(slot);
            output_locations.push(pending.location);
            outputs.push(pending.def);
        }

        Ok(Subgraph {
            name: graph,
            values,
            input_count,
            input_locations,
            nodes,
            outputs,
            output_slots,
            output_locations,
            levels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{KernelContext, KernelError};
    use crate::tensor::Tensor;

    struct Passthrough;

    impl Kernel for Passthrough {
        fn compute(
            &self,
            _ctx: &KernelContext<'_>,
            inputs: &[&Tensor],
        ) -> Result<Vec<Tensor>, KernelError> {
            Ok(inputs.iter().map(|t| (*t).clone()).collect())
        }
    }

    #[test]
    fn test_input_namespace_excludes_intermediates() {
        let graph = Subgraph::builder("g")
            .input("x")
            .node("copy", Passthrough, &["x"], &["y"])
            .output("y", ElementType::F32, Some(ShapeDescriptor::scalar()))
            .build()
            .unwrap();

        assert_eq!(graph.input_slot("x"), Some(0));
        assert_eq!(graph.input_slot("y"), None);
        assert_eq!(graph.input_slot("missing"), None);
        assert_eq!(graph.output_value_slot(0), Some(1));
    }

    #[test]
    fn test_levels_group_independent_nodes() {
        let graph = Subgraph::builder("g")
            .input("x")
            .node("a", Passthrough, &["x"], &["a_out"])
            .node("b", Passthrough, &["x"], &["b_out"])
            .node("c", Passthrough, &["a_out"], &["c_out"])
            .output("c_out", ElementType::F32, None)
            .build()
            .unwrap();

        assert_eq!(graph.levels(), &[vec![0, 1], vec![2]]);
    }

    #[test]
    fn test_undefined_input_rejected() {
        let err = Subgraph::builder("g")
            .node("a", Passthrough, &["nope"], &["out"])
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::UndefinedInput {
                node: "a".to_string(),
                input: "nope".to_string(),
            }
        );
    }

    #[test]
    fn test_duplicate_value_rejected() {
        let err = Subgraph::builder("g")
            .input("x")
            .node("a", Passthrough, &["x"], &["x"])
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateValue { .. }));
    }

    #[test]
    fn test_undefined_output_rejected() {
        let err = Subgraph::builder("g")
            .input("x")
            .output("y", ElementType::I64, None)
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::UndefinedOutput { .. }));
    }

    #[test]
    fn test_locations_default_to_host() {
        let graph = Subgraph::builder("g")
            .input_at("x", MemoryLocation::Device(0))
            .output("x", ElementType::F32, None)
            .build()
            .unwrap();
        assert_eq!(graph.input_location(0), MemoryLocation::Device(0));
        assert_eq!(graph.output_location(0), MemoryLocation::Host);
        assert_eq!(graph.output_location(5), MemoryLocation::Host);
    }
}
