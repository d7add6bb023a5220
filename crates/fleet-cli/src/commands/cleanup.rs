use super::{Context, report};
use anyhow::Result;
use fleet_deploy::cleanup_gcroots;
use std::sync::Arc;

pub async fn run(context: &Context, hosts: &str) -> Result<()> {
    let targets = context.targets(hosts).await?;
    let results = cleanup_gcroots(Arc::clone(&context.runner), &targets).await;
    report("cleanup-gcroots", &results)
}
