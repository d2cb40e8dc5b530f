//! condgraph - runtime conditional branching for tensor operator graphs
//!
//! An `If` node holds two subgraphs and runs exactly one of them per
//! invocation, chosen by a boolean scalar, writing the branch's results
//! straight into the node's declared outputs.
//!
//! - `controlflow`: binding, feeds/fetches plan, executor, `BranchOperator`
//! - `runner`: the subgraph runner contract and an in-process runner
//! - `graph`, `tensor`: the minimal graph and value model both sides share
//! - `frame`: enclosing-scope output buffers and memory placement
//! - `parallel`: fire-all task batches for independent nodes
//! - `config`, `observability`: configuration, JSON logging, metrics

pub mod config;
pub mod controlflow;
pub mod frame;
pub mod graph;
pub mod observability;
pub mod parallel;
pub mod runner;
pub mod tensor;
