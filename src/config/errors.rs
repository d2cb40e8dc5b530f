//! Configuration errors
//!
//! All configuration errors are FATAL: nothing runs on a config that failed
//! to load or validate.

use thiserror::Error;

use crate::observability::Severity;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "BRANCH_CONFIG_READ",
            ConfigError::Parse(_) => "BRANCH_CONFIG_PARSE",
            ConfigError::Invalid { .. } => "BRANCH_CONFIG_INVALID",
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Fatal
    }
}
