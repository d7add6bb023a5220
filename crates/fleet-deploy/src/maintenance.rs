//! Housekeeping commands run across the fleet

use crate::host::HostDescriptor;
use crate::parallel::{ParallelExecutor, ResultSet};
use crate::runner::{CommandRunner, Privilege};
use command_executor::Command;
use std::sync::Arc;

/// Drop automatic GC roots on every host, then restart the collector
///
/// Both steps run on all hosts; a host fails if either step failed there.
pub async fn cleanup_gcroots<R: CommandRunner>(
    runner: Arc<R>,
    targets: &[HostDescriptor],
) -> ResultSet {
    let executor = ParallelExecutor;

    let remove_roots = Command::builder("find")
        .args(["/nix/var/nix/gcroots/auto", "-type", "s", "-delete"])
        .build();
    let removed = executor
        .run_command_all(Arc::clone(&runner), targets, remove_roots, Privilege::Escalated)
        .await;

    let restart_gc = Command::builder("systemctl")
        .args(["restart", "nix-gc"])
        .build();
    let restarted = executor
        .run_command_all(runner, targets, restart_gc, Privilege::Escalated)
        .await;

    removed.combine(restarted)
}
