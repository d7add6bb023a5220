//! Rolling reboots

use crate::error::{FleetError, Result};
use crate::host::HostDescriptor;
use crate::parallel::{Outcome, ResultSet};
use crate::readiness::{Probe, ReadinessPoller, Sleeper};
use crate::runner::{CommandRunner, Privilege};
use command_executor::Command;
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span, warn};

/// Backgrounded so the ssh session can return before the host goes away
pub fn reboot_command() -> (Command, Privilege) {
    let command = Command::builder("sh").args(["-c", "reboot &"]).build();
    (command, Privilege::Escalated)
}

/// Reboots hosts one after another, waiting for each to come back
pub struct RebootOrchestrator<R, P, S> {
    runner: Arc<R>,
    poller: ReadinessPoller<P, S>,
}

impl<R: CommandRunner, P: Probe, S: Sleeper> RebootOrchestrator<R, P, S> {
    /// Create an orchestrator
    pub fn new(runner: Arc<R>, poller: ReadinessPoller<P, S>) -> Self {
        Self { runner, poller }
    }

    /// Reboot every host in order
    ///
    /// Each host's reboot, shutdown and startup completes before the next
    /// host is touched, so at most one host is down at a time. A host that
    /// fails is recorded and the rollout continues.
    pub async fn reboot_all(&self, targets: &[HostDescriptor]) -> ResultSet {
        let mut results = ResultSet::default();
        for host in targets {
            let span = info_span!("host", host = %host.address());
            let outcome = match self.reboot(host).instrument(span).await {
                Ok(()) => Outcome::Success,
                Err(e) => {
                    error!(host = %host, "{}", e);
                    Outcome::Failure(e.to_string())
                }
            };
            results.push(host.clone(), outcome);
        }
        results
    }

    /// Issue a reboot on `host`, then wait for it to go down and come back
    pub async fn reboot(&self, host: &HostDescriptor) -> Result<()> {
        let (command, privilege) = reboot_command();
        match self.runner.run_remote(host, command, privilege).await {
            Err(e) => {
                return Err(FleetError::apply(
                    host.address(),
                    format!("could not issue reboot: {}", e),
                ));
            }
            // ssh often reports the connection dropping under it
            Ok(output) if !output.success() => {
                warn!("reboot command returned {}", output.status)
            }
            Ok(_) => info!("reboot issued"),
        }

        let progress = self.poller.progress();

        progress.begin(&format!("Wait for {} to shutdown", host.address()));
        self.poller.wait_for_down(host).await;
        progress.finish();

        progress.begin(&format!("Wait for {} to start", host.address()));
        let up = self.poller.wait_for_up(host).await;
        progress.finish();
        up.map(|_| ())
    }
}
