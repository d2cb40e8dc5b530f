//! Per-branch binding of captured values and declared outputs
//!
//! Both branches see the same candidate capture list (the node's implicit
//! inputs), but each subgraph only consumes some of them. A capture that a
//! branch does not know is pruned from that branch's feeds rather than
//! rejected: it may belong to the sibling branch.

use crate::graph::GraphStructureView;

use super::errors::{BranchError, BranchResult};

/// Immutable record of what one branch consumes and produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubgraphBinding {
    capture_names: Vec<String>,
    used_captures: Vec<bool>,
    feed_names: Vec<String>,
    output_names: Vec<String>,
}

impl SubgraphBinding {
    /// Binds `subgraph` against the node's declared output count and its
    /// candidate capture names (in enclosing-scope order).
    pub fn construct(
        subgraph: &dyn GraphStructureView,
        declared_output_count: usize,
        candidate_captures: &[String],
    ) -> BranchResult<Self> {
        let outputs = subgraph.outputs();
        if outputs.len() != declared_output_count {
            return Err(BranchError::ArityMismatch {
                subgraph: subgraph.name().to_string(),
                expected: declared_output_count,
                actual: outputs.len(),
            });
        }

        let output_names = outputs.iter().map(|o| o.name.clone()).collect();

        let mut used_captures = Vec::with_capacity(candidate_captures.len());
        let mut feed_names = Vec::new();
        for name in candidate_captures {
            let used = subgraph.input_slot(name).is_some();
            if used {
                feed_names.push(name.clone());
            }
            used_captures.push(used);
        }

        Ok(Self {
            capture_names: candidate_captures.to_vec(),
            used_captures,
            feed_names,
            output_names,
        })
    }

    /// One flag per candidate capture, in enclosing-scope order
    pub fn used_captures(&self) -> &[bool] {
        &self.used_captures
    }

    pub fn is_used(&self, capture_index: usize) -> bool {
        self.used_captures.get(capture_index).copied().unwrap_or(false)
    }

    /// Names of the captures this branch consumes, in enclosing-scope order
    pub fn feed_names(&self) -> &[String] {
        &self.feed_names
    }

    /// Subgraph output names, in declared order
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    pub fn output_count(&self) -> usize {
        self.output_names.len()
    }

    /// Candidate capture names, in enclosing-scope order
    pub fn capture_names(&self) -> &[String] {
        &self.capture_names
    }

    /// Number of candidate captures the node declares
    pub fn capture_count(&self) -> usize {
        self.capture_names.len()
    }
}
