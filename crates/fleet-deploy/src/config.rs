//! Fleet configuration
//!
//! Every field has a default matching the nix-community fleet, so an empty
//! (or missing) `fleet.yaml` is a valid configuration:
//!
//! ```yaml
//! flake_path: /srv/infra
//! domain_suffix: .nix-community.org
//! alternate_platform_pattern: darwin
//! alternate_platform_user: hetzner
//! identity_overrides:
//!   darwin01: customer
//! readiness:
//!   max_up_attempts: 60000
//! ```

use crate::error::{FleetError, Result};
use crate::host::PlatformClassifier;
use crate::readiness::ReadinessPolicy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FleetConfig {
    /// Directory holding the flake; every local command runs relative to it
    pub flake_path: PathBuf,

    /// Suffix appended to short host names and stripped to get attribute names
    pub domain_suffix: String,

    /// Login user for hosts without a more specific identity
    pub default_user: String,

    /// SSH port used for remote commands and liveness probes
    pub ssh_port: u16,

    /// Regex selecting hosts of the alternate (darwin) platform
    pub alternate_platform_pattern: String,

    /// Login user for alternate-platform hosts
    pub alternate_platform_user: String,

    /// Exact short host name to login user. Checked before the platform rule.
    pub identity_overrides: BTreeMap<String, String>,

    /// Extra arguments passed to every ssh invocation
    pub ssh_extra_args: Vec<String>,

    /// Reboot polling settings
    pub readiness: ReadinessConfig,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            flake_path: PathBuf::from("."),
            domain_suffix: ".nix-community.org".to_string(),
            default_user: "root".to_string(),
            ssh_port: 22,
            alternate_platform_pattern: "darwin".to_string(),
            alternate_platform_user: "hetzner".to_string(),
            identity_overrides: BTreeMap::from([("darwin01".to_string(), "customer".to_string())]),
            ssh_extra_args: Vec::new(),
            readiness: ReadinessConfig::default(),
        }
    }
}

/// Reboot polling settings, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadinessConfig {
    /// TCP connect timeout per probe
    pub connect_timeout_ms: u64,
    /// Pause between probes while waiting for a host to go down
    pub down_interval_ms: u64,
    /// Pause between probes while waiting for a host to come back
    pub up_interval_ms: u64,
    /// Give up waiting for a host to come back after this many probes.
    /// Unset means wait forever.
    pub max_up_attempts: Option<u64>,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 1000,
            down_interval_ms: 1000,
            up_interval_ms: 10,
            max_up_attempts: None,
        }
    }
}

impl From<&ReadinessConfig> for ReadinessPolicy {
    fn from(config: &ReadinessConfig) -> Self {
        ReadinessPolicy {
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            down_interval: Duration::from_millis(config.down_interval_ms),
            up_interval: Duration::from_millis(config.up_interval_ms),
            max_up_attempts: config.max_up_attempts,
        }
    }
}

impl FleetConfig {
    /// Parse and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FleetError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Like [`FleetConfig::load`], but a missing file yields the defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate YAML text. Empty input yields the defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: FleetConfig = if content.trim().is_empty() {
            FleetConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.domain_suffix.is_empty() {
            return Err(FleetError::Config("domain_suffix must not be empty".into()));
        }
        if self.ssh_port == 0 {
            return Err(FleetError::Config("ssh_port must not be 0".into()));
        }
        if self.readiness.connect_timeout_ms == 0 {
            return Err(FleetError::Config(
                "readiness.connect_timeout_ms must be positive".into(),
            ));
        }
        self.classifier()?;
        Ok(())
    }

    /// Platform classifier built from `alternate_platform_pattern`
    pub fn classifier(&self) -> Result<PlatformClassifier> {
        let pattern = Regex::new(&self.alternate_platform_pattern).map_err(|e| {
            FleetError::Config(format!(
                "Invalid alternate_platform_pattern '{}': {}",
                self.alternate_platform_pattern, e
            ))
        })?;
        Ok(PlatformClassifier::new(pattern))
    }

    /// Polling policy for reboots
    pub fn readiness_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy::from(&self.readiness)
    }
}
