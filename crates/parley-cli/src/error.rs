//! CLI error types.

use parley_agent::{ConfigError, RuntimeError};
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// The scenario file could not be read.
    #[error("failed to read scenario '{path}': {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The scenario TOML could not be parsed.
    #[error("invalid scenario TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The scenario is well-formed but inconsistent.
    #[error("invalid scenario: {0}")]
    Scenario(String),

    /// The engine configuration in the scenario is out of range.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An agent task failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// An agent task panicked or was cancelled.
    #[error("agent task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Negotiations did not finish in time.
    #[error("simulation timed out after {0}s")]
    Timeout(u64),

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
