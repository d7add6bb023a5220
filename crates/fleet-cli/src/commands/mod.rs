pub mod build;
pub mod cleanup;
pub mod deploy;
pub mod reboot;

use anyhow::{Context as _, Result};
use fleet_deploy::{FleetConfig, HostSelector, Outcome, ResultSet, SshRunner, TargetSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Used when `--config` is not given; may be absent
const DEFAULT_CONFIG: &str = "fleet.yaml";

/// Loaded configuration plus the production runner, shared by all commands
pub struct Context {
    pub config: Arc<FleetConfig>,
    pub runner: Arc<SshRunner>,
}

impl Context {
    pub fn load(config_path: Option<&Path>, flake: Option<PathBuf>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => FleetConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => FleetConfig::load_or_default(Path::new(DEFAULT_CONFIG))
                .with_context(|| format!("Failed to load {}", DEFAULT_CONFIG))?,
        };
        if let Some(flake) = flake {
            config.flake_path = flake;
        }

        let runner = Arc::new(SshRunner::new(config.ssh_extra_args.clone()));
        Ok(Self {
            config: Arc::new(config),
            runner,
        })
    }

    /// Resolve `--hosts`; an unreadable inventory aborts the command
    pub async fn targets(&self, hosts: &str) -> Result<TargetSet> {
        let selector = HostSelector::new(Arc::clone(&self.config), Arc::clone(&self.runner))?;
        let targets = selector.resolve(hosts).await?;
        if targets.is_empty() {
            warn!("No hosts selected");
        }
        Ok(targets)
    }
}

/// Print one line per host and fail if any host failed
pub fn report(action: &str, results: &ResultSet) -> Result<()> {
    for result in results.iter() {
        match &result.outcome {
            Outcome::Success => println!("✓ {}", result.host),
            Outcome::Failure(reason) => println!("✗ {}: {}", result.host, reason),
        }
    }

    let failed = results.failures().count();
    if failed > 0 {
        anyhow::bail!("{} failed on {} of {} hosts", action, failed, results.len());
    }
    Ok(())
}
