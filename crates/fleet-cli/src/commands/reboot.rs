use super::{Context, report};
use anyhow::Result;
use fleet_deploy::{ReadinessPoller, RebootOrchestrator};
use std::sync::Arc;

pub async fn run(context: &Context, hosts: &str, max_up_attempts: Option<u64>) -> Result<()> {
    let targets = context.targets(hosts).await?;

    let mut policy = context.config.readiness_policy();
    if max_up_attempts.is_some() {
        policy.max_up_attempts = max_up_attempts;
    }

    let orchestrator =
        RebootOrchestrator::new(Arc::clone(&context.runner), ReadinessPoller::tcp(policy));
    let results = orchestrator.reboot_all(&targets).await;

    report("reboot", &results)
}
