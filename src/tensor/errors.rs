//! Tensor construction and store errors

use thiserror::Error;

use super::shape::TensorShape;
use super::value::ElementType;

/// Result type for tensor operations
pub type TensorResult<T> = Result<T, TensorError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TensorError {
    #[error("shape {shape} holds {expected} elements but {actual} were supplied")]
    DataLength {
        shape: TensorShape,
        expected: usize,
        actual: usize,
    },

    #[error("buffer has shape {expected} but produced value has shape {actual}")]
    ShapeMismatch {
        expected: TensorShape,
        actual: TensorShape,
    },

    #[error("buffer holds {expected} but produced value holds {actual}")]
    TypeMismatch {
        expected: ElementType,
        actual: ElementType,
    },
}
