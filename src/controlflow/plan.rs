//! Feeds/fetches plan for one branch
//!
//! Maps the captures a branch consumes onto subgraph input slots and the
//! subgraph's outputs onto the node's output slots, then records where every
//! feed and fetch lives so the runner only transfers what it must.
//!
//! Construction is two-phase: `construct` resolves names and yields an
//! `UnfinalizedPlan`; `finalize_locations` consumes it exactly once and
//! yields the immutable `FeedsFetchesPlan` used by every invocation.

use crate::graph::GraphStructureView;
use crate::tensor::MemoryLocation;

use super::errors::{BranchError, BranchResult};

/// Source and destination memory space of one feed or fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRoute {
    pub source: MemoryLocation,
    pub target: MemoryLocation,
}

impl TransferRoute {
    pub fn needs_transfer(&self) -> bool {
        self.source != self.target
    }
}

/// Plan whose names are resolved but whose locations are not yet recorded
#[derive(Debug, Clone)]
pub struct UnfinalizedPlan {
    feed_names: Vec<String>,
    feed_slots: Vec<usize>,
    fetch_names: Vec<String>,
    // where the subgraph wants each feed, and produces each fetch
    feed_targets: Vec<MemoryLocation>,
    fetch_sources: Vec<MemoryLocation>,
}

/// Immutable, finalized plan for one branch
#[derive(Debug, Clone)]
pub struct FeedsFetchesPlan {
    feed_names: Vec<String>,
    feed_slots: Vec<usize>,
    fetch_names: Vec<String>,
    feed_routes: Vec<TransferRoute>,
    fetch_routes: Vec<TransferRoute>,
}

impl FeedsFetchesPlan {
    /// Resolves every used capture name to a subgraph input slot.
    ///
    /// `used_capture_names` must already be pruned to this branch; a name
    /// that still fails to resolve is an `UnresolvedName` error.
    pub fn construct(
        used_capture_names: &[String],
        subgraph_output_names: &[String],
        subgraph: &dyn GraphStructureView,
    ) -> BranchResult<UnfinalizedPlan> {
        let mut feed_slots = Vec::with_capacity(used_capture_names.len());
        let mut feed_targets = Vec::with_capacity(used_capture_names.len());
        for name in used_capture_names {
            let slot = subgraph
                .input_slot(name)
                .ok_or_else(|| BranchError::UnresolvedName {
                    subgraph: subgraph.name().to_string(),
                    name: name.clone(),
                })?;
            feed_slots.push(slot);
            feed_targets.push(subgraph.input_location(slot));
        }

        let fetch_sources = (0..subgraph_output_names.len())
            .map(|index| subgraph.output_location(index))
            .collect();

        Ok(UnfinalizedPlan {
            feed_names: used_capture_names.to_vec(),
            feed_slots,
            fetch_names: subgraph_output_names.to_vec(),
            feed_targets,
            fetch_sources,
        })
    }

    pub fn feed_names(&self) -> &[String] {
        &self.feed_names
    }

    pub fn feed_count(&self) -> usize {
        self.feed_names.len()
    }

    /// Subgraph input slot receiving feed `index`
    pub fn feed_slot(&self, index: usize) -> Option<usize> {
        self.feed_slots.get(index).copied()
    }

    pub fn fetch_names(&self) -> &[String] {
        &self.fetch_names
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_names.len()
    }

    /// Enclosing location to subgraph input location
    pub fn feed_route(&self, index: usize) -> Option<TransferRoute> {
        self.feed_routes.get(index).copied()
    }

    /// Subgraph output location to enclosing output location
    pub fn fetch_route(&self, index: usize) -> Option<TransferRoute> {
        self.fetch_routes.get(index).copied()
    }
}

impl UnfinalizedPlan {
    pub fn feed_names(&self) -> &[String] {
        &self.feed_names
    }

    pub fn fetch_names(&self) -> &[String] {
        &self.fetch_names
    }

    /// Records where each feed currently lives and where each of the node's
    /// outputs must end up.
    pub fn finalize_locations(
        self,
        feed_locations: Vec<MemoryLocation>,
        fetch_locations: Vec<MemoryLocation>,
    ) -> BranchResult<FeedsFetchesPlan> {
        if feed_locations.len() != self.feed_names.len() {
            return Err(BranchError::LocationCountMismatch {
                kind: "feed",
                expected: self.feed_names.len(),
                actual: feed_locations.len(),
            });
        }
        if fetch_locations.len() != self.fetch_names.len() {
            return Err(BranchError::LocationCountMismatch {
                kind: "fetch",
                expected: self.fetch_names.len(),
                actual: fetch_locations.len(),
            });
        }

        let feed_routes = feed_locations
            .into_iter()
            .zip(self.feed_targets)
            .map(|(source, target)| TransferRoute { source, target })
            .collect();
        let fetch_routes = self
            .fetch_sources
            .into_iter()
            .zip(fetch_locations)
            .map(|(source, target)| TransferRoute { source, target })
            .collect();

        Ok(FeedsFetchesPlan {
            feed_names: self.feed_names,
            feed_slots: self.feed_slots,
            fetch_names: self.fetch_names,
            feed_routes,
            fetch_routes,
        })
    }
}
