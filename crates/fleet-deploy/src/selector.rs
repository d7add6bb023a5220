//! Target host resolution

use crate::config::FleetConfig;
use crate::error::{FleetError, Result};
use crate::host::{HostDescriptor, Platform, PlatformClassifier, TargetSet};
use crate::runner::CommandRunner;
use command_executor::Command;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves a `--hosts` argument into a [`TargetSet`]
pub struct HostSelector<R> {
    config: Arc<FleetConfig>,
    classifier: PlatformClassifier,
    runner: Arc<R>,
}

impl<R: CommandRunner> HostSelector<R> {
    /// Create a selector; fails if the configured platform pattern is invalid
    pub fn new(config: Arc<FleetConfig>, runner: Arc<R>) -> Result<Self> {
        let classifier = config.classifier()?;
        Ok(Self {
            config,
            classifier,
            runner,
        })
    }

    /// Resolve `spec` to hosts
    ///
    /// An empty spec selects every `nixosConfigurations` entry of the flake;
    /// otherwise `spec` is a comma-separated list of host names.
    pub async fn resolve(&self, spec: &str) -> Result<TargetSet> {
        let names = if spec.trim().is_empty() {
            let names = self.inventory().await?;
            info!("Resolved {} hosts from flake inventory", names.len());
            names
        } else {
            split_spec(spec)?
        };

        Ok(names.iter().map(|name| self.descriptor(name)).collect())
    }

    /// Build the descriptor for one short or fully qualified host name
    pub fn descriptor(&self, name: &str) -> HostDescriptor {
        let suffix = &self.config.domain_suffix;
        let short = name.strip_suffix(suffix.as_str()).unwrap_or(name);
        let address = format!("{}{}", short, suffix);

        let platform = self.classifier.classify(&address);
        let user = self.login_user(short, platform);
        debug!(%address, %user, %platform, "Selected host");

        HostDescriptor::new(address, user, platform).with_port(self.config.ssh_port)
    }

    /// Literal overrides win; otherwise the platform decides
    fn login_user(&self, short_name: &str, platform: Platform) -> String {
        if let Some(user) = self.config.identity_overrides.get(short_name) {
            return user.clone();
        }
        match platform {
            Platform::Linux => self.config.default_user.clone(),
            Platform::Darwin => self.config.alternate_platform_user.clone(),
        }
    }

    async fn inventory(&self) -> Result<Vec<String>> {
        let command = Command::builder("nix")
            .args(["flake", "show", "--json", "--all-systems"])
            .current_dir(&self.config.flake_path)
            .build();

        let output = self
            .runner
            .run_local(command)
            .await
            .map_err(|e| FleetError::Resolution(format!("nix flake show: {}", e)))?;

        if !output.success() {
            return Err(FleetError::Resolution(format!(
                "nix flake show exited with {}: {}",
                output.status,
                output.stderr.trim()
            )));
        }

        parse_inventory(&output.stdout)
    }
}

/// Extract the `nixosConfigurations` names from `nix flake show --json` output
pub fn parse_inventory(json: &str) -> Result<Vec<String>> {
    let document: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| FleetError::Resolution(format!("flake inventory is not JSON: {}", e)))?;

    let systems = document
        .get("nixosConfigurations")
        .and_then(|v| v.as_object())
        .ok_or_else(|| {
            FleetError::Resolution("flake inventory has no nixosConfigurations object".into())
        })?;

    Ok(systems.keys().cloned().collect())
}

fn split_spec(spec: &str) -> Result<Vec<String>> {
    spec.split(',')
        .map(|token| {
            let token = token.trim();
            if token.is_empty() {
                Err(FleetError::Resolution(format!(
                    "empty host name in '{}'",
                    spec
                )))
            } else {
                Ok(token.to_string())
            }
        })
        .collect()
}
