//! # Fleet Deploy
//!
//! Applies NixOS and nix-darwin configurations from one flake to a fleet of
//! hosts.
//!
//! - [`HostSelector`] turns a `--hosts` argument (or the flake's inventory)
//!   into a [`TargetSet`].
//! - [`Deployer`] copies the flake to each host and switches it over, one
//!   concurrent task per host via [`ParallelExecutor`].
//! - [`RebootOrchestrator`] reboots hosts one at a time, tracking each with a
//!   [`ReadinessPoller`].
//!
//! All process execution goes through [`CommandRunner`]; [`SshRunner`] is the
//! production implementation on top of `command-executor`.

#![warn(missing_docs)]

pub mod apply;
pub mod artifact;
pub mod config;
pub mod deploy;
pub mod error;
pub mod host;
pub mod maintenance;
pub mod parallel;
pub mod readiness;
pub mod reboot;
pub mod runner;
pub mod selector;

pub use apply::{RebuildAction, RemoteApplier};
pub use artifact::{ArtifactPublisher, ArtifactReference};
pub use config::{FleetConfig, ReadinessConfig};
pub use deploy::Deployer;
pub use error::{FleetError, Result};
pub use host::{HostDescriptor, Platform, PlatformClassifier, TargetSet, attribute_name};
pub use maintenance::cleanup_gcroots;
pub use parallel::{HostResult, Outcome, ParallelExecutor, ResultSet};
pub use readiness::{
    ConsoleProgress, Probe, ProgressSink, ReadinessPoller, ReadinessPolicy, ReadinessState,
    Sleeper, TcpProbe, TimerSleeper,
};
pub use reboot::RebootOrchestrator;
pub use runner::{CommandRunner, Privilege, SshRunner};
pub use selector::HostSelector;
