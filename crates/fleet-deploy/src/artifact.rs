//! Copying the flake closure to a host

use crate::error::{FleetError, Result};
use crate::host::{HostDescriptor, Platform};
use crate::runner::CommandRunner;
use command_executor::Command;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Store path of the flake source as copied to a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReference(String);

impl ArtifactReference {
    /// Wrap a store path
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The store path
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Deserialize)]
struct ArchiveOutput {
    path: String,
}

/// Runs `nix flake archive` towards a host
pub struct ArtifactPublisher<R> {
    runner: Arc<R>,
    flake_path: PathBuf,
    ssh_options: Vec<String>,
}

impl<R: CommandRunner> ArtifactPublisher<R> {
    /// Publish the flake found at `flake_path`
    ///
    /// `ssh_options` go to the `ssh` that nix spawns for the copy, after any
    /// options already exported in `NIX_SSHOPTS`.
    pub fn new(runner: Arc<R>, flake_path: PathBuf, ssh_options: &[String]) -> Self {
        let inherited = std::env::var("NIX_SSHOPTS").ok();
        Self {
            runner,
            flake_path,
            ssh_options: merge_ssh_options(inherited.as_deref(), ssh_options),
        }
    }

    /// Copy the flake and its inputs to `host` and return the store path
    pub async fn publish(&self, host: &HostDescriptor) -> Result<ArtifactReference> {
        let command = archive_command(host, &self.flake_path, &self.ssh_options);
        info!("Copying flake to {}", store_uri(host));

        let output = self
            .runner
            .run_local(command)
            .await
            .map_err(|e| FleetError::transfer(host.address(), e.to_string()))?;

        if !output.success() {
            return Err(FleetError::transfer(
                host.address(),
                format!("nix flake archive failed with {}", output.status),
            ));
        }

        parse_archive_output(&output.stdout)
            .map_err(|reason| FleetError::transfer(host.address(), reason))
    }
}

/// Destination store for a host. Darwin hosts need the login user in the URI.
pub fn store_uri(host: &HostDescriptor) -> String {
    match host.platform() {
        Platform::Linux => format!("ssh://{}", host.address()),
        Platform::Darwin => format!("ssh://{}@{}", host.login_user(), host.address()),
    }
}

/// Exported `NIX_SSHOPTS` words followed by the configured ssh arguments
pub fn merge_ssh_options(inherited: Option<&str>, extra_args: &[String]) -> Vec<String> {
    inherited
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .chain(extra_args.iter().cloned())
        .collect()
}

/// `nix flake archive --to <store> --json`, run from the flake directory
///
/// Store URIs carry no port, and nix only takes ssh options from
/// `NIX_SSHOPTS`, which it splits on whitespace.
pub fn archive_command(
    host: &HostDescriptor,
    flake_path: &std::path::Path,
    ssh_options: &[String],
) -> Command {
    let mut command = Command::builder("nix")
        .args(["flake", "archive", "--to"])
        .arg(store_uri(host))
        .arg("--json")
        .current_dir(flake_path)
        .build();

    let mut options = ssh_options.to_vec();
    if host.ssh_port() != HostDescriptor::DEFAULT_SSH_PORT {
        options.push("-p".to_string());
        options.push(host.ssh_port().to_string());
    }
    if !options.is_empty() {
        command.env("NIX_SSHOPTS", options.join(" "));
    }
    command
}

/// Pull the `path` field out of `nix flake archive --json` output
pub fn parse_archive_output(stdout: &str) -> std::result::Result<ArtifactReference, String> {
    let parsed: ArchiveOutput = serde_json::from_str(stdout.trim())
        .map_err(|e| format!("unexpected nix flake archive output: {}", e))?;
    if parsed.path.is_empty() {
        return Err("nix flake archive returned an empty path".to_string());
    }
    Ok(ArtifactReference(parsed.path))
}
