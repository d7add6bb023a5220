//! Backend implementations for different execution contexts
//!
//! [`LocalLauncher`] spawns processes on this machine. [`SudoLauncher`] and
//! (with the `ssh` feature) [`SshLauncher`] are layers: they rewrite the
//! command and hand it to the launcher they wrap.

pub mod local;
pub use local::LocalLauncher;

pub mod sudo;
pub use sudo::SudoLauncher;

#[cfg(feature = "ssh")]
pub mod ssh;
#[cfg(feature = "ssh")]
pub use ssh::{SshConfig, SshLauncher};
