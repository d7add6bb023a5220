//! Sudo launcher for privilege escalation
//!
//! This launcher does not handle password prompts. It assumes sudo is
//! configured with NOPASSWD for the invoking user, or that the command is
//! already running as root (sudo is then a no-op).
//!
//! Placement decides where escalation happens:
//!
//! ```ignore
//! use command_executor::{Command, Launcher};
//! use command_executor::backends::{LocalLauncher, SshConfig, SshLauncher, SudoLauncher};
//!
//! # async fn example() -> command_executor::Result<()> {
//! // Runs `ssh build01 sudo systemctl restart nix-gc`: sudo on the remote side
//! let ssh = SshLauncher::new(LocalLauncher, SshConfig::new("build01"));
//! let launcher = SudoLauncher::new(ssh);
//!
//! let cmd = Command::builder("systemctl").args(["restart", "nix-gc"]).build();
//! let result = launcher.execute(cmd).await?;
//! # Ok(())
//! # }
//! ```

use crate::{error::Result, launcher::Launcher, Command};
use async_trait::async_trait;

/// Launcher that wraps another launcher to execute commands with sudo
#[derive(Debug, Clone)]
pub struct SudoLauncher<L> {
    inner: L,
}

impl<L> SudoLauncher<L> {
    /// Create a new sudo launcher wrapping the given launcher
    pub fn new(inner: L) -> Self {
        Self { inner }
    }

    /// Rewrite `command` as its sudo equivalent
    pub fn wrap(&self, command: &Command) -> Command {
        let mut sudo = Command::new("sudo");
        sudo.arg(command.get_program()).args(command.get_args());

        for (key, val) in command.get_envs() {
            sudo.env(key, val);
        }
        if let Some(dir) = command.get_current_dir() {
            sudo.current_dir(dir);
        }
        sudo
    }
}

#[async_trait]
impl<L> Launcher for SudoLauncher<L>
where
    L: Launcher,
{
    type EventStream = L::EventStream;
    type Handle = L::Handle;

    async fn launch(&self, command: Command) -> Result<(Self::EventStream, Self::Handle)> {
        let sudo_command = self.wrap(&command);
        self.inner
            .launch(sudo_command)
            .await
            .map_err(|e| e.with_layer_context("Sudo"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::local::LocalLauncher;

    #[test]
    fn test_sudo_wrap_keeps_args_and_dir() {
        let launcher = SudoLauncher::new(LocalLauncher);
        let cmd = Command::builder("nixos-rebuild")
            .args(["switch", "--flake", "/nix/store/x#build01"])
            .current_dir("/tmp")
            .build();

        let wrapped = launcher.wrap(&cmd);
        assert_eq!(wrapped.get_program(), "sudo");
        assert_eq!(
            wrapped.get_args(),
            &["nixos-rebuild", "switch", "--flake", "/nix/store/x#build01"]
        );
        assert_eq!(wrapped.get_current_dir(), Some(std::path::Path::new("/tmp")));
    }
}
