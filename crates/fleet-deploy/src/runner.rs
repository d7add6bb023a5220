//! The seam between the engine and real processes

use crate::host::HostDescriptor;
use async_trait::async_trait;
use command_executor::backends::{LocalLauncher, SshLauncher, SudoLauncher};
use command_executor::{Command, ExitResult, Launcher, ProcessEvent, ProcessEventType};
use tracing::{debug, info};

/// Whether a remote command runs as the login user or through sudo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// Run as the login user
    User,
    /// Run through `sudo` on the remote host
    Escalated,
}

/// Runs commands on this machine or on a host
///
/// Everything the engine executes goes through this trait, so tests can
/// script outcomes without spawning processes.
#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    /// Run `command` on this machine
    async fn run_local(&self, command: Command) -> command_executor::Result<ExitResult>;

    /// Run `command` on `host` over ssh
    async fn run_remote(
        &self,
        host: &HostDescriptor,
        command: Command,
        privilege: Privilege,
    ) -> command_executor::Result<ExitResult>;
}

/// Production runner: local processes and the `ssh` CLI
#[derive(Debug, Clone, Default)]
pub struct SshRunner {
    ssh_extra_args: Vec<String>,
}

impl SshRunner {
    /// Create a runner passing `ssh_extra_args` to every ssh invocation
    pub fn new(ssh_extra_args: Vec<String>) -> Self {
        Self { ssh_extra_args }
    }
}

#[async_trait]
impl CommandRunner for SshRunner {
    async fn run_local(&self, command: Command) -> command_executor::Result<ExitResult> {
        LocalLauncher
            .execute_observed(command, &mut log_output)
            .await
    }

    async fn run_remote(
        &self,
        host: &HostDescriptor,
        command: Command,
        privilege: Privilege,
    ) -> command_executor::Result<ExitResult> {
        let ssh = SshLauncher::new(LocalLauncher, host.ssh_config(&self.ssh_extra_args));
        match privilege {
            Privilege::User => ssh.execute_observed(command, &mut log_output).await,
            Privilege::Escalated => {
                SudoLauncher::new(ssh)
                    .execute_observed(command, &mut log_output)
                    .await
            }
        }
    }
}

/// Forward process output to the log as it streams; the enclosing host span
/// attributes it
fn log_output(event: &ProcessEvent) {
    match (&event.event_type, &event.data) {
        (ProcessEventType::Started { pid }, _) => debug!(pid, "process started"),
        (ProcessEventType::Stdout | ProcessEventType::Stderr, Some(line)) => info!("{}", line),
        _ => {}
    }
}
