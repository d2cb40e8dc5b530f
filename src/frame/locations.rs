//! Memory-location resolution for enclosing-scope values

use std::collections::HashMap;

use crate::tensor::MemoryLocation;

/// Answers "which memory space does this named value live in"
pub trait MemoryLocationResolver {
    fn location_of(&self, name: &str) -> MemoryLocation;
}

/// Precomputed placement table; unknown names live on the host
#[derive(Debug, Clone, Default)]
pub struct LocationMap {
    locations: HashMap<String, MemoryLocation>,
}

impl LocationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, location: MemoryLocation) -> Self {
        self.insert(name, location);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, location: MemoryLocation) {
        self.locations.insert(name.into(), location);
    }
}

impl MemoryLocationResolver for LocationMap {
    fn location_of(&self, name: &str) -> MemoryLocation {
        self.locations.get(name).copied().unwrap_or_default()
    }
}
