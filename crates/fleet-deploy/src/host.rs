//! Host descriptors and platform classification

use command_executor::backends::SshConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a host is activated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// NixOS: `sudo nixos-rebuild`
    Linux,
    /// nix-darwin: `darwin-rebuild` as the login user
    Darwin,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Linux => write!(f, "linux"),
            Platform::Darwin => write!(f, "darwin"),
        }
    }
}

/// Decides a host's [`Platform`] from its name
///
/// This is the only place that inspects host names for platform hints.
#[derive(Debug, Clone)]
pub struct PlatformClassifier {
    darwin: Regex,
}

impl PlatformClassifier {
    /// Hosts whose name matches `darwin` are classified as [`Platform::Darwin`]
    pub fn new(darwin: Regex) -> Self {
        Self { darwin }
    }

    /// Classify a host name or address
    pub fn classify(&self, name: &str) -> Platform {
        if self.darwin.is_match(name) {
            Platform::Darwin
        } else {
            Platform::Linux
        }
    }
}

/// One remote target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDescriptor {
    address: String,
    login_user: String,
    ssh_port: u16,
    platform: Platform,
}

/// The hosts targeted by one invocation, in resolution order
pub type TargetSet = Vec<HostDescriptor>;

impl HostDescriptor {
    /// Default SSH port
    pub const DEFAULT_SSH_PORT: u16 = 22;

    /// Create a descriptor with an explicit platform
    pub fn new(address: impl Into<String>, login_user: impl Into<String>, platform: Platform) -> Self {
        Self {
            address: address.into(),
            login_user: login_user.into(),
            ssh_port: Self::DEFAULT_SSH_PORT,
            platform,
        }
    }

    /// Create a descriptor whose platform is derived from `address`
    pub fn classified(
        address: impl Into<String>,
        login_user: impl Into<String>,
        classifier: &PlatformClassifier,
    ) -> Self {
        let address = address.into();
        let platform = classifier.classify(&address);
        Self::new(address, login_user, platform)
    }

    /// Use a non-default SSH port
    pub fn with_port(mut self, port: u16) -> Self {
        self.ssh_port = port;
        self
    }

    /// Fully qualified host name
    pub fn address(&self) -> &str {
        &self.address
    }

    /// User that ssh logs in as
    pub fn login_user(&self) -> &str {
        &self.login_user
    }

    /// SSH port, also the port probed for liveness
    pub fn ssh_port(&self) -> u16 {
        self.ssh_port
    }

    /// Activation platform
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Flake attribute selecting this host's configuration
    pub fn attribute_name(&self, domain_suffix: &str) -> &str {
        attribute_name(&self.address, domain_suffix)
    }

    /// SSH settings for running commands on this host
    pub fn ssh_config(&self, extra_args: &[String]) -> SshConfig {
        let mut config = SshConfig::new(&self.address).with_user(&self.login_user);
        if self.ssh_port != Self::DEFAULT_SSH_PORT {
            config = config.with_port(self.ssh_port);
        }
        for arg in extra_args {
            config = config.with_extra_arg(arg);
        }
        config
    }
}

impl fmt::Display for HostDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// Strip the fleet domain suffix from an address
///
/// Pure string transform; addresses without the suffix are returned unchanged.
pub fn attribute_name<'a>(address: &'a str, domain_suffix: &str) -> &'a str {
    if domain_suffix.is_empty() {
        return address;
    }
    address.strip_suffix(domain_suffix).unwrap_or(address)
}
