//! Tensor values, memory locations and shared buffer handles

use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use super::errors::{TensorError, TensorResult};
use super::shape::TensorShape;

/// Memory space a buffer lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLocation {
    #[default]
    Host,
    /// Accelerator memory, by device ordinal
    Device(u32),
}

impl fmt::Display for MemoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryLocation::Host => write!(f, "host"),
            MemoryLocation::Device(ordinal) => write!(f, "device:{}", ordinal),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Bool,
    F32,
    I64,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Bool => "bool",
            ElementType::F32 => "f32",
            ElementType::I64 => "i64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed, flat element storage
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    Bool(Vec<bool>),
    F32(Vec<f32>),
    I64(Vec<i64>),
}

impl TensorData {
    /// Zero-filled storage of `len` elements
    pub fn zeros(element_type: ElementType, len: usize) -> Self {
        match element_type {
            ElementType::Bool => TensorData::Bool(vec![false; len]),
            ElementType::F32 => TensorData::F32(vec![0.0; len]),
            ElementType::I64 => TensorData::I64(vec![0; len]),
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            TensorData::Bool(_) => ElementType::Bool,
            TensorData::F32(_) => ElementType::F32,
            TensorData::I64(_) => ElementType::I64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::Bool(v) => v.len(),
            TensorData::F32(v) => v.len(),
            TensorData::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A dense tensor with its shape and memory location
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: TensorShape,
    data: TensorData,
    location: MemoryLocation,
}

impl Tensor {
    /// Creates a host tensor, checking that `data` fills `shape` exactly
    pub fn new(shape: impl Into<TensorShape>, data: TensorData) -> TensorResult<Self> {
        let shape = shape.into();
        let expected = shape.element_count();
        if data.len() != expected {
            return Err(TensorError::DataLength {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            shape,
            data,
            location: MemoryLocation::Host,
        })
    }

    pub fn from_f32(dims: &[usize], values: Vec<f32>) -> TensorResult<Self> {
        Self::new(dims, TensorData::F32(values))
    }

    pub fn from_i64(dims: &[usize], values: Vec<i64>) -> TensorResult<Self> {
        Self::new(dims, TensorData::I64(values))
    }

    pub fn from_bool(dims: &[usize], values: Vec<bool>) -> TensorResult<Self> {
        Self::new(dims, TensorData::Bool(values))
    }

    /// Rank-0 boolean, the usual shape of a branch condition
    pub fn scalar_bool(value: bool) -> Self {
        Self {
            shape: TensorShape::scalar(),
            data: TensorData::Bool(vec![value]),
            location: MemoryLocation::Host,
        }
    }

    /// Zero-filled tensor placed at `location`
    pub fn zeros(shape: TensorShape, element_type: ElementType, location: MemoryLocation) -> Self {
        let data = TensorData::zeros(element_type, shape.element_count());
        Self {
            shape,
            data,
            location,
        }
    }

    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    pub fn location(&self) -> MemoryLocation {
        self.location
    }

    /// Returns the same tensor tagged with a different memory location
    pub fn with_location(mut self, location: MemoryLocation) -> Self {
        self.location = location;
        self
    }

    /// Reads a single boolean element, whatever the rank
    pub fn as_bool_scalar(&self) -> Option<bool> {
        match &self.data {
            TensorData::Bool(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.data {
            TensorData::I64(v) => Some(v),
            _ => None,
        }
    }
}

/// Shared reference to a tensor buffer.
///
/// Cloning a handle never copies tensor data; two handles are the same buffer
/// iff `same_buffer` returns true.
#[derive(Debug, Clone)]
pub struct TensorHandle(Arc<RwLock<Tensor>>);

impl TensorHandle {
    pub fn new(tensor: Tensor) -> Self {
        Self(Arc::new(RwLock::new(tensor)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Tensor> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Tensor> {
        self.0.write()
    }

    /// Copies the current contents out of the buffer
    pub fn snapshot(&self) -> Tensor {
        self.0.read().clone()
    }

    pub fn shape(&self) -> TensorShape {
        self.0.read().shape().clone()
    }

    pub fn location(&self) -> MemoryLocation {
        self.0.read().location()
    }

    /// Pointer identity
    pub fn same_buffer(&self, other: &TensorHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Moves the tensor out if this is the only handle, copies it otherwise
    pub fn into_tensor(self) -> Tensor {
        match Arc::try_unwrap(self.0) {
            Ok(lock) => lock.into_inner(),
            Err(shared) => shared.read().clone(),
        }
    }

    /// Moves `produced` into this buffer.
    ///
    /// The buffer keeps its identity and memory location; shape and element
    /// type must match what the buffer was allocated with.
    pub fn store(&self, produced: Tensor) -> TensorResult<()> {
        let mut buffer = self.0.write();
        if buffer.shape != produced.shape {
            return Err(TensorError::ShapeMismatch {
                expected: buffer.shape.clone(),
                actual: produced.shape,
            });
        }
        if buffer.element_type() != produced.element_type() {
            return Err(TensorError::TypeMismatch {
                expected: buffer.element_type(),
                actual: produced.element_type(),
            });
        }
        buffer.data = produced.data;
        Ok(())
    }
}

impl From<Tensor> for TensorHandle {
    fn from(tensor: Tensor) -> Self {
        Self::new(tensor)
    }
}
