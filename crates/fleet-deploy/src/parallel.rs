//! Run one unit of work per host, concurrently, with per-host failure isolation

use crate::error::Result;
use crate::host::HostDescriptor;
use crate::runner::{CommandRunner, Privilege};
use command_executor::Command;
use futures::FutureExt;
use futures::future::join_all;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span};

/// What happened on one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The unit completed
    Success,
    /// The unit failed or panicked
    Failure(String),
}

impl Outcome {
    /// True for [`Outcome::Success`]
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// Outcome for one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostResult {
    /// The host the unit ran against
    pub host: HostDescriptor,
    /// What happened
    pub outcome: Outcome,
}

/// One [`HostResult`] per targeted host, in target order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    results: Vec<HostResult>,
}

impl ResultSet {
    /// Append a result
    pub fn push(&mut self, host: HostDescriptor, outcome: Outcome) {
        self.results.push(HostResult { host, outcome });
    }

    /// Number of results
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// True if no host was targeted
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Iterate results in target order
    pub fn iter(&self) -> impl Iterator<Item = &HostResult> {
        self.results.iter()
    }

    /// Results whose outcome is a failure
    pub fn failures(&self) -> impl Iterator<Item = &HostResult> {
        self.results.iter().filter(|r| !r.outcome.is_success())
    }

    /// True only if every host succeeded
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.outcome.is_success())
    }

    /// Outcome for the first host with `address`
    pub fn outcome_for(&self, address: &str) -> Option<&Outcome> {
        self.results
            .iter()
            .find(|r| r.host.address() == address)
            .map(|r| &r.outcome)
    }

    /// Fold a later phase run into this one, pairing results by host in
    /// order. A host fails if it failed in either phase; hosts that appear
    /// in only one phase keep their own outcome.
    pub(crate) fn combine(self, later: ResultSet) -> ResultSet {
        let mut pending: Vec<Option<HostResult>> = later.results.into_iter().map(Some).collect();
        let mut results: Vec<HostResult> = self
            .results
            .into_iter()
            .map(|first| {
                let second = pending
                    .iter_mut()
                    .find(|slot| {
                        slot.as_ref()
                            .is_some_and(|r| r.host.address() == first.host.address())
                    })
                    .and_then(Option::take);
                match second {
                    Some(second) => HostResult {
                        outcome: merge_outcomes(first.outcome, second.outcome),
                        host: first.host,
                    },
                    None => first,
                }
            })
            .collect();
        results.extend(pending.into_iter().flatten());
        ResultSet { results }
    }
}

fn merge_outcomes(first: Outcome, second: Outcome) -> Outcome {
    match (first, second) {
        (Outcome::Success, Outcome::Success) => Outcome::Success,
        (Outcome::Failure(a), Outcome::Success) => Outcome::Failure(a),
        (Outcome::Success, Outcome::Failure(b)) => Outcome::Failure(b),
        (Outcome::Failure(a), Outcome::Failure(b)) => Outcome::Failure(format!("{}; {}", a, b)),
    }
}

impl IntoIterator for ResultSet {
    type Item = HostResult;
    type IntoIter = std::vec::IntoIter<HostResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

/// Spawns one task per host and joins them all
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelExecutor;

impl ParallelExecutor {
    /// Run `unit` against every host concurrently
    ///
    /// Every host yields exactly one result. An `Err` or a panic inside one
    /// host's unit becomes that host's [`Outcome::Failure`] and does not
    /// affect the others. Nothing is retried.
    pub async fn run_all<F, Fut>(&self, targets: &[HostDescriptor], unit: F) -> ResultSet
    where
        F: Fn(HostDescriptor) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let unit = Arc::new(unit);

        let tasks = targets.iter().cloned().map(|host| {
            let unit = Arc::clone(&unit);
            let span = info_span!("host", host = %host.address());
            smol::spawn(
                async move {
                    let work = AssertUnwindSafe(async { unit(host.clone()).await });
                    let outcome = match work.catch_unwind().await {
                        Ok(Ok(())) => {
                            info!("done");
                            Outcome::Success
                        }
                        Ok(Err(e)) => {
                            error!("{}", e);
                            Outcome::Failure(e.to_string())
                        }
                        Err(panic) => {
                            let reason = format!("task panicked: {}", panic_message(&*panic));
                            error!("{}", reason);
                            Outcome::Failure(reason)
                        }
                    };
                    HostResult { host, outcome }
                }
                .instrument(span),
            )
        });

        ResultSet {
            results: join_all(tasks).await,
        }
    }

    /// Run the same raw command on every host; a non-zero exit is recorded
    /// as that host's failure
    pub async fn run_command_all<R: CommandRunner>(
        &self,
        runner: Arc<R>,
        targets: &[HostDescriptor],
        command: Command,
        privilege: Privilege,
    ) -> ResultSet {
        self.run_all(targets, move |host| {
            let runner = Arc::clone(&runner);
            let command = command.clone();
            async move {
                let rendered = command.to_string();
                let output = runner.run_remote(&host, command, privilege).await?;
                if output.success() {
                    Ok(())
                } else {
                    Err(crate::error::FleetError::apply(
                        host.address(),
                        format!("`{}` failed with {}", rendered, output.status),
                    ))
                }
            }
        })
        .await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
