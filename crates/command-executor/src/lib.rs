//! Runtime-agnostic command execution library
//!
//! Commands are described once with [`Command`] and handed to a [`Launcher`].
//! Launchers compose: [`backends::SudoLauncher`] and [`backends::SshLauncher`]
//! rewrite the command and delegate to the launcher they wrap, so
//! `SudoLauncher<SshLauncher<LocalLauncher>>` runs `ssh host sudo <cmd>`
//! from a locally spawned process.

#![warn(missing_docs)]

pub mod backends;
pub mod command;
pub mod error;
pub mod event;
pub mod launcher;
pub mod process;

pub use command::Command;
pub use error::{Error, Result};
pub use event::{ProcessEvent, ProcessEventType};
pub use launcher::Launcher;
pub use process::{ExitResult, ExitStatus, ProcessHandle};
