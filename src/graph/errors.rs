//! Subgraph construction errors

use thiserror::Error;

/// Result type for graph construction
pub type GraphResult<T> = Result<T, GraphError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("value '{name}' is defined more than once in subgraph '{graph}'")]
    DuplicateValue { graph: String, name: String },

    #[error("node '{node}' consumes '{input}' before it is defined")]
    UndefinedInput { node: String, input: String },

    #[error("declared output '{name}' is not produced in subgraph '{graph}'")]
    UndefinedOutput { graph: String, name: String },
}
