//! Fleet-wide deploy and local build

use crate::apply::RemoteApplier;
use crate::artifact::ArtifactPublisher;
use crate::config::FleetConfig;
use crate::error::Result;
use crate::host::HostDescriptor;
use crate::parallel::{ParallelExecutor, ResultSet};
use crate::runner::CommandRunner;
use std::sync::Arc;
use tracing::info;

/// Publishes and activates configurations, one concurrent task per host
pub struct Deployer<R> {
    publisher: ArtifactPublisher<R>,
    applier: RemoteApplier<R>,
}

impl<R: CommandRunner> Deployer<R> {
    /// Create a deployer sharing one runner and configuration
    ///
    /// The flake path is resolved here, once; a missing flake directory is a
    /// configuration error.
    pub fn new(runner: Arc<R>, config: Arc<FleetConfig>) -> Result<Self> {
        Ok(Self {
            publisher: ArtifactPublisher::new(
                Arc::clone(&runner),
                config.flake_path.clone(),
                &config.ssh_extra_args,
            ),
            applier: RemoteApplier::new(runner, config)?,
        })
    }

    /// Copy the flake to `host`, then switch it over
    pub async fn deploy(&self, host: &HostDescriptor) -> Result<()> {
        let artifact = self.publisher.publish(host).await?;
        info!("Copied {}", artifact);
        self.applier.apply(host, &artifact).await
    }

    /// Build `host`'s configuration locally
    pub async fn build_local(&self, host: &HostDescriptor) -> Result<()> {
        self.applier.build_local(host).await
    }

    /// Deploy to every host in parallel
    pub async fn deploy_all(self: Arc<Self>, targets: &[HostDescriptor]) -> ResultSet {
        ParallelExecutor
            .run_all(targets, move |host| {
                let this = Arc::clone(&self);
                async move { this.deploy(&host).await }
            })
            .await
    }

    /// Build every host's configuration locally, in parallel
    pub async fn build_all(self: Arc<Self>, targets: &[HostDescriptor]) -> ResultSet {
        ParallelExecutor
            .run_all(targets, move |host| {
                let this = Arc::clone(&self);
                async move { this.build_local(&host).await }
            })
            .await
    }
}
