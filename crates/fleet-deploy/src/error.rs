//! Error types for fleet operations

use thiserror::Error;

/// Errors raised while resolving, deploying to, or rebooting hosts
#[derive(Debug, Error)]
pub enum FleetError {
    /// The host inventory could not be queried or parsed. Fatal for the
    /// whole invocation: no partial host list is trusted.
    #[error("Failed to resolve target hosts: {0}")]
    Resolution(String),

    /// Copying the build closure to a host failed
    #[error("Failed to copy closure to {host}: {reason}")]
    Transfer {
        /// Host address
        host: String,
        /// What went wrong
        reason: String,
    },

    /// The activation (or reboot) command failed on a host
    #[error("Failed to activate configuration on {host}: {reason}")]
    Apply {
        /// Host address
        host: String,
        /// What went wrong
        reason: String,
    },

    /// A host did not accept connections within the configured attempts
    #[error("{host} did not come back after {attempts} connection attempts")]
    ReadinessTimeout {
        /// Host address
        host: String,
        /// Probes made before giving up
        attempts: u64,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Failed to parse a YAML configuration file
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Command execution error
    #[error(transparent)]
    Executor(#[from] command_executor::Error),

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FleetError {
    /// Create a transfer error for `host`
    pub fn transfer(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transfer {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// Create an apply error for `host`
    pub fn apply(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Apply {
            host: host.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for fleet operations
pub type Result<T> = std::result::Result<T, FleetError>;
