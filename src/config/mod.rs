//! Configuration for branch execution

mod control_flow;
mod errors;

pub use control_flow::ControlFlowConfig;
pub use errors::{ConfigError, ConfigResult};
