//! SSH remote execution backend using the `ssh` CLI

use async_trait::async_trait;

use crate::command::Command;
use crate::error::Result;
use crate::launcher::Launcher;

/// SSH connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfig {
    /// Target host (hostname or IP)
    host: String,
    /// SSH user (optional, uses system default if not specified)
    user: Option<String>,
    /// SSH port (optional, defaults to 22)
    port: Option<u16>,
    /// Additional SSH arguments
    extra_args: Vec<String>,
}

impl SshConfig {
    /// Create a new SSH configuration for the given host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            port: None,
            extra_args: Vec::new(),
        }
    }

    /// Set the SSH user
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the SSH port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Add extra SSH arguments
    pub fn with_extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// The `user@host` (or bare `host`) destination passed to ssh
    pub fn destination(&self) -> String {
        if let Some(user) = &self.user {
            format!("{}@{}", user, self.host)
        } else {
            self.host.clone()
        }
    }

    /// Wrap `command` into the local `ssh` invocation that runs it remotely
    ///
    /// The command's environment and working directory apply on the remote
    /// side: they are rendered into the remote command line as
    /// `cd <dir> && env K=V <program> <args>`.
    pub fn wrap(&self, command: &Command) -> Command {
        let mut ssh_cmd = Command::new("ssh");

        // Never wait on a password prompt; fleet runs are unattended
        ssh_cmd.arg("-o").arg("BatchMode=yes");

        if let Some(port) = self.port {
            ssh_cmd.arg("-p").arg(port.to_string());
        }

        for arg in &self.extra_args {
            ssh_cmd.arg(arg);
        }

        ssh_cmd.arg(self.destination());
        ssh_cmd.arg(format_remote_command(command));
        ssh_cmd
    }
}

/// SSH launcher that wraps another launcher for remote execution
///
/// The local `ssh` process itself runs with the inner launcher's defaults;
/// see [`SshConfig::wrap`] for where the wrapped command's settings go.
#[derive(Debug, Clone)]
pub struct SshLauncher<L> {
    inner: L,
    config: SshConfig,
}

impl<L> SshLauncher<L> {
    /// Create a new SSH launcher wrapping the given inner launcher
    pub fn new(inner: L, config: SshConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<L> Launcher for SshLauncher<L>
where
    L: Launcher,
{
    type EventStream = L::EventStream;
    type Handle = L::Handle;

    async fn launch(&self, command: Command) -> Result<(Self::EventStream, Self::Handle)> {
        let ssh_cmd = self.config.wrap(&command);
        self.inner
            .launch(ssh_cmd)
            .await
            .map_err(|e| e.with_layer_context("SSH"))
    }
}

/// Format a command for remote execution via SSH
fn format_remote_command(cmd: &Command) -> String {
    let mut words = Vec::new();

    if let Some(dir) = cmd.get_current_dir() {
        words.push("cd".to_string());
        words.push(shell_escape(&dir.to_string_lossy()));
        words.push("&&".to_string());
    }

    if !cmd.get_envs().is_empty() {
        words.push("env".to_string());
        for (key, val) in cmd.get_envs() {
            words.push(shell_escape(&format!(
                "{}={}",
                key.to_string_lossy(),
                val.to_string_lossy()
            )));
        }
    }

    words.push(cmd.get_program().to_string_lossy().into_owned());
    words.extend(
        cmd.get_args()
            .iter()
            .map(|arg| shell_escape(&arg.to_string_lossy())),
    );
    words.join(" ")
}

/// Escape a string for safe inclusion in a remote shell command
fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.contains(|c: char| c.is_whitespace() || "\"'\\$`!*?<>|&;()[]{}".contains(c)) {
        format!("'{}'", s.replace('\'', "'\"'\"'"))
    } else {
        s.to_string()
    }
}
