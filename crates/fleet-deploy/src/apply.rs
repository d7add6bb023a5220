//! Activating a configuration on a host, or building it locally

use crate::artifact::ArtifactReference;
use crate::config::FleetConfig;
use crate::error::{FleetError, Result};
use crate::host::{HostDescriptor, Platform};
use crate::runner::{CommandRunner, Privilege};
use command_executor::Command;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Which rebuild action to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildAction {
    /// Build and activate
    Switch,
    /// Build only
    Build,
}

impl RebuildAction {
    fn as_str(self) -> &'static str {
        match self {
            RebuildAction::Switch => "switch",
            RebuildAction::Build => "build",
        }
    }
}

/// The platform-specific rebuild command for `host`, and how to run it
///
/// NixOS needs root to switch; nix-darwin's `darwin-rebuild` runs as the
/// login user and escalates on its own.
pub fn rebuild_command(
    host: &HostDescriptor,
    action: RebuildAction,
    flake_ref: &str,
    attribute: &str,
) -> (Command, Privilege) {
    let (program, privilege) = match host.platform() {
        Platform::Linux => ("nixos-rebuild", Privilege::Escalated),
        Platform::Darwin => ("darwin-rebuild", Privilege::User),
    };
    let command = Command::builder(program)
        .arg(action.as_str())
        .args(["--option", "accept-flake-config", "true"])
        .arg("--flake")
        .arg(format!("{}#{}", flake_ref, attribute))
        .build();
    (command, privilege)
}

/// Runs the activation command on hosts
pub struct RemoteApplier<R> {
    runner: Arc<R>,
    config: Arc<FleetConfig>,
    /// Absolute flake directory, for builds run from scratch directories
    flake: PathBuf,
}

impl<R: CommandRunner> RemoteApplier<R> {
    /// Create an applier; fails if the configured flake path does not exist
    pub fn new(runner: Arc<R>, config: Arc<FleetConfig>) -> Result<Self> {
        let flake = std::fs::canonicalize(&config.flake_path).map_err(|e| {
            FleetError::Config(format!(
                "flake path {}: {}",
                config.flake_path.display(),
                e
            ))
        })?;
        Ok(Self {
            runner,
            config,
            flake,
        })
    }

    /// Switch `host` to the configuration in `artifact`
    pub async fn apply(&self, host: &HostDescriptor, artifact: &ArtifactReference) -> Result<()> {
        let attribute = host.attribute_name(&self.config.domain_suffix);
        let (command, privilege) =
            rebuild_command(host, RebuildAction::Switch, artifact.as_str(), attribute);
        info!("Activating {}#{} ({})", artifact, attribute, host.platform());

        let output = self
            .runner
            .run_remote(host, command, privilege)
            .await
            .map_err(|e| FleetError::apply(host.address(), e.to_string()))?;

        if output.success() {
            Ok(())
        } else {
            Err(FleetError::apply(
                host.address(),
                format!("rebuild switch failed with {}", output.status),
            ))
        }
    }

    /// Build `host`'s configuration on this machine without touching the host
    ///
    /// Runs in a scratch directory of its own so concurrent builds do not
    /// race on the `result` link; the directory is removed afterwards.
    pub async fn build_local(&self, host: &HostDescriptor) -> Result<()> {
        let attribute = host.attribute_name(&self.config.domain_suffix);
        let (mut command, _) = rebuild_command(
            host,
            RebuildAction::Build,
            &self.flake.to_string_lossy(),
            attribute,
        );

        let scratch = tempfile::Builder::new()
            .prefix(&format!("fleet-build-{}-", attribute))
            .tempdir()
            .map_err(|e| FleetError::apply(host.address(), e.to_string()))?;
        command.current_dir(scratch.path());
        debug!("Building in {}", scratch.path().display());

        let output = self
            .runner
            .run_local(command)
            .await
            .map_err(|e| FleetError::apply(host.address(), e.to_string()))?;

        if output.success() {
            Ok(())
        } else {
            Err(FleetError::apply(
                host.address(),
                format!("local build failed with {}", output.status),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linux_switch_is_escalated() {
        let host = HostDescriptor::new("build01.nix-community.org", "root", Platform::Linux);
        let (command, privilege) =
            rebuild_command(&host, RebuildAction::Switch, "/nix/store/aaa-source", "build01");

        assert_eq!(privilege, Privilege::Escalated);
        assert_eq!(
            command.to_string(),
            "nixos-rebuild switch --option accept-flake-config true --flake /nix/store/aaa-source#build01"
        );
    }

    #[test]
    fn test_darwin_switch_runs_as_login_user() {
        let host = HostDescriptor::new("darwin02.nix-community.org", "hetzner", Platform::Darwin);
        let (command, privilege) =
            rebuild_command(&host, RebuildAction::Switch, "/nix/store/aaa-source", "darwin02");

        assert_eq!(privilege, Privilege::User);
        assert_eq!(command.get_program(), "darwin-rebuild");
        assert_eq!(command.get_args()[0], "switch");
    }

    #[test]
    fn test_build_action() {
        let host = HostDescriptor::new("build02.nix-community.org", "root", Platform::Linux);
        let (command, _) = rebuild_command(&host, RebuildAction::Build, "/srv/infra", "build02");
        assert_eq!(
            command.to_string(),
            "nixos-rebuild build --option accept-flake-config true --flake /srv/infra#build02"
        );
    }
}
