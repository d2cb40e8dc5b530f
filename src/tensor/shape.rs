//! Shape descriptors and concrete tensor shapes
//!
//! A `ShapeDescriptor` is what a graph declares for a value before execution.
//! It may contain symbolic dimensions whose extent is only known once the
//! producing operator has run. A `TensorShape` is always fully concrete.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single dimension of a declared shape
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dim {
    /// Statically known extent
    Fixed(usize),
    /// Data-dependent extent, named for diagnostics
    Symbolic(String),
}

impl Dim {
    /// Creates a symbolic dimension
    pub fn symbolic(name: impl Into<String>) -> Self {
        Dim::Symbolic(name.into())
    }

    /// Returns the extent if statically known
    pub fn extent(&self) -> Option<usize> {
        match self {
            Dim::Fixed(n) => Some(*n),
            Dim::Symbolic(_) => None,
        }
    }

    /// Returns true if the extent is statically known
    pub fn is_resolved(&self) -> bool {
        matches!(self, Dim::Fixed(_))
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Fixed(n) => write!(f, "{}", n),
            Dim::Symbolic(name) if name.is_empty() => write!(f, "?"),
            Dim::Symbolic(name) => write!(f, "{}", name),
        }
    }
}

impl From<usize> for Dim {
    fn from(n: usize) -> Self {
        Dim::Fixed(n)
    }
}

/// Declared shape of a graph value, possibly with unresolved dimensions
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShapeDescriptor {
    dims: Vec<Dim>,
}

impl ShapeDescriptor {
    /// Creates a descriptor from explicit dimensions
    pub fn new(dims: Vec<Dim>) -> Self {
        Self { dims }
    }

    /// Creates a fully concrete descriptor
    pub fn fixed(dims: &[usize]) -> Self {
        Self {
            dims: dims.iter().copied().map(Dim::Fixed).collect(),
        }
    }

    /// Rank-0 descriptor
    pub fn scalar() -> Self {
        Self::default()
    }

    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Returns true if every dimension is statically known
    pub fn is_concrete(&self) -> bool {
        self.dims.iter().all(Dim::is_resolved)
    }

    /// Converts to a concrete shape, or `None` if any dimension is symbolic
    pub fn to_concrete(&self) -> Option<TensorShape> {
        self.dims
            .iter()
            .map(Dim::extent)
            .collect::<Option<Vec<_>>>()
            .map(TensorShape::new)
    }

    /// Returns true if `shape` is an instance of this descriptor.
    ///
    /// Ranks must agree and every fixed dimension must match exactly;
    /// symbolic dimensions accept any extent.
    pub fn admits(&self, shape: &TensorShape) -> bool {
        self.rank() == shape.rank()
            && self
                .dims
                .iter()
                .zip(shape.dims())
                .all(|(dim, &actual)| dim.extent().map_or(true, |n| n == actual))
    }
}

impl fmt::Display for ShapeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", dim)?;
        }
        write!(f, "]")
    }
}

/// Fully concrete tensor shape
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TensorShape(Vec<usize>);

impl TensorShape {
    pub fn new(dims: Vec<usize>) -> Self {
        Self(dims)
    }

    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Number of elements; 1 for scalars
    pub fn element_count(&self) -> usize {
        self.0.iter().product()
    }
}

impl From<&[usize]> for TensorShape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl From<Vec<usize>> for TensorShape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
