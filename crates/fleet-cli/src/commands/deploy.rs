use super::{Context, report};
use anyhow::Result;
use fleet_deploy::Deployer;
use std::sync::Arc;
use tracing::info;

pub async fn run(context: &Context, hosts: &str) -> Result<()> {
    let targets = context.targets(hosts).await?;
    info!("Deploying to {} hosts", targets.len());

    let deployer = Arc::new(Deployer::new(
        Arc::clone(&context.runner),
        Arc::clone(&context.config),
    )?);
    let results = deployer.deploy_all(&targets).await;

    report("deploy", &results)
}
