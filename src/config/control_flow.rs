//! Control-flow configuration
//!
//! JSON file; every field is optional and falls back to its default.

use std::fs;
use std::path::Path;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::observability::{Event, Logger, Severity};
use crate::runner::ExecutionMode;

use super::errors::{ConfigError, ConfigResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFlowConfig {
    /// Upper bound on threads per parallel batch (default: available parallelism)
    #[serde(default = "default_parallel_workers")]
    pub parallel_workers: usize,

    /// Mode branch subgraphs run in (default: sequential)
    #[serde(default)]
    pub nested_mode: ExecutionMode,

    /// Minimum severity written by `logger()` (default: INFO)
    #[serde(default = "default_log_level")]
    pub log_level: Severity,
}

fn default_parallel_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_log_level() -> Severity {
    Severity::Info
}

impl Default for ControlFlowConfig {
    fn default() -> Self {
        Self {
            parallel_workers: default_parallel_workers(),
            nested_mode: ExecutionMode::default(),
            log_level: default_log_level(),
        }
    }
}

impl ControlFlowConfig {
    /// Reads, parses and validates a config file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config: ControlFlowConfig = serde_json::from_str(&content)?;
        config.validate()?;

        let workers = config.parallel_workers.to_string();
        config.logger().event(
            Event::ConfigLoaded,
            &[
                ("path", path.display().to_string().as_str()),
                ("parallel_workers", workers.as_str()),
            ],
        );
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.parallel_workers == 0 {
            return Err(ConfigError::Invalid {
                field: "parallel_workers",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Stdout logger at the configured level
    pub fn logger(&self) -> Logger {
        Logger::stdout(self.log_level)
    }
}
