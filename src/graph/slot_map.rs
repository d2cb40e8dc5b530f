//! Name to value-slot mapping for a subgraph

use std::collections::HashMap;

/// Dense, insertion-ordered mapping from value names to slot indices
#[derive(Debug, Clone, Default)]
pub struct NameSlotMap {
    slots: HashMap<String, usize>,
    names: Vec<String>,
}

impl NameSlotMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the next slot to `name`. Returns `None` if the name is taken.
    pub fn insert(&mut self, name: impl Into<String>) -> Option<usize> {
        let name = name.into();
        if self.slots.contains_key(&name) {
            return None;
        }
        let slot = self.names.len();
        self.slots.insert(name.clone(), slot);
        self.names.push(name);
        Some(slot)
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.slots.get(name).copied()
    }

    pub fn name(&self, slot: usize) -> Option<&str> {
        self.names.get(slot).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
