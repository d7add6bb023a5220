//! Host liveness tracking for reboots
//!
//! A host is `Up` while its SSH port accepts TCP connections and `Down`
//! otherwise. Probing, sleeping and progress output are injected so the
//! state machine can be driven by scripted probes in tests.

use crate::error::{FleetError, Result};
use crate::host::HostDescriptor;
use async_net::TcpStream;
use async_trait::async_trait;
use smol::Timer;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Observed liveness of a host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    /// SSH port accepts connections
    Up,
    /// SSH port refuses, times out, or does not resolve
    Down,
}

/// One connection attempt
#[async_trait]
pub trait Probe: Send + Sync {
    /// True if a TCP connection to `address:port` succeeds within `timeout`.
    /// Any failure, including name resolution, counts as unreachable.
    async fn is_reachable(&self, address: &str, port: u16, timeout: Duration) -> bool;
}

/// Pause between probes
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Operator-facing progress for a wait loop
pub trait ProgressSink: Send + Sync {
    /// A wait loop started
    fn begin(&self, message: &str);
    /// One more probe went by without the awaited transition
    fn tick(&self);
    /// The wait loop ended
    fn finish(&self);
}

/// TCP connect probe
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

#[async_trait]
impl Probe for TcpProbe {
    async fn is_reachable(&self, address: &str, port: u16, timeout: Duration) -> bool {
        let connect = async {
            match TcpStream::connect((address, port)).await {
                Ok(_) => true,
                Err(e) => {
                    debug!("connect to {}:{} failed: {}", address, port, e);
                    false
                }
            }
        };
        let expire = async {
            Timer::after(timeout).await;
            false
        };
        smol::future::or(connect, expire).await
    }
}

/// Sleeps on the smol timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TimerSleeper;

#[async_trait]
impl Sleeper for TimerSleeper {
    async fn sleep(&self, duration: Duration) {
        Timer::after(duration).await;
    }
}

/// Prints `message....` on stdout, one dot per probe
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn begin(&self, message: &str) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "{}", message);
        let _ = out.flush();
    }

    fn tick(&self) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, ".");
        let _ = out.flush();
    }

    fn finish(&self) {
        println!();
    }
}

/// Timing of the wait loops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// TCP connect timeout per probe
    pub connect_timeout: Duration,
    /// Pause between probes while the host is still up
    pub down_interval: Duration,
    /// Pause between probes while the host is still down
    pub up_interval: Duration,
    /// Give up on `wait_for_up` after this many probes; `None` waits forever
    pub max_up_attempts: Option<u64>,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            down_interval: Duration::from_secs(1),
            up_interval: Duration::from_millis(10),
            max_up_attempts: None,
        }
    }
}

/// Drives the Up/Down state machine for one host at a time
pub struct ReadinessPoller<P, S> {
    probe: P,
    sleeper: S,
    progress: Arc<dyn ProgressSink>,
    policy: ReadinessPolicy,
}

impl ReadinessPoller<TcpProbe, TimerSleeper> {
    /// Real network probing with console progress
    pub fn tcp(policy: ReadinessPolicy) -> Self {
        Self::new(TcpProbe, TimerSleeper, Arc::new(ConsoleProgress), policy)
    }
}

impl<P: Probe, S: Sleeper> ReadinessPoller<P, S> {
    /// Create a poller from its parts
    pub fn new(probe: P, sleeper: S, progress: Arc<dyn ProgressSink>, policy: ReadinessPolicy) -> Self {
        Self {
            probe,
            sleeper,
            progress,
            policy,
        }
    }

    /// Progress output shared with the orchestrator
    pub fn progress(&self) -> &dyn ProgressSink {
        self.progress.as_ref()
    }

    async fn probe(&self, host: &HostDescriptor) -> ReadinessState {
        let reachable = self
            .probe
            .is_reachable(host.address(), host.ssh_port(), self.policy.connect_timeout)
            .await;
        if reachable {
            ReadinessState::Up
        } else {
            ReadinessState::Down
        }
    }

    /// Block until one probe fails. A single failed connect counts as down.
    pub async fn wait_for_down(&self, host: &HostDescriptor) -> ReadinessState {
        while self.probe(host).await == ReadinessState::Up {
            self.sleeper.sleep(self.policy.down_interval).await;
            self.progress.tick();
        }
        debug!(host = %host, "host is down");
        ReadinessState::Down
    }

    /// Block until one probe succeeds
    ///
    /// Waits forever unless `max_up_attempts` is set, in which case running
    /// out of attempts is a [`FleetError::ReadinessTimeout`].
    pub async fn wait_for_up(&self, host: &HostDescriptor) -> Result<ReadinessState> {
        let mut attempts: u64 = 0;
        loop {
            attempts += 1;
            if self.probe(host).await == ReadinessState::Up {
                debug!(host = %host, attempts, "host is up");
                return Ok(ReadinessState::Up);
            }
            if let Some(max) = self.policy.max_up_attempts {
                if attempts >= max {
                    return Err(FleetError::ReadinessTimeout {
                        host: host.address().to_string(),
                        attempts,
                    });
                }
            }
            self.sleeper.sleep(self.policy.up_interval).await;
            self.progress.tick();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Platform;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers probes from a script; panics if asked more than scripted
    struct ScriptedProbe(Mutex<VecDeque<bool>>);

    impl ScriptedProbe {
        fn new(script: &[bool]) -> Self {
            Self(Mutex::new(script.iter().copied().collect()))
        }

        fn remaining(&self) -> usize {
            self.0.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Probe for ScriptedProbe {
        async fn is_reachable(&self, _: &str, _: u16, _: Duration) -> bool {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .expect("probed past the end of the script")
        }
    }

    #[derive(Default)]
    struct RecordingSleeper(Mutex<Vec<Duration>>);

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.0.lock().unwrap().push(duration);
        }
    }

    #[derive(Default)]
    struct CountingProgress(AtomicUsize);

    impl ProgressSink for CountingProgress {
        fn begin(&self, _: &str) {}
        fn tick(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn finish(&self) {}
    }

    fn host() -> HostDescriptor {
        HostDescriptor::new("build01.nix-community.org", "root", Platform::Linux)
    }

    fn poller(
        script: &[bool],
        policy: ReadinessPolicy,
    ) -> (ReadinessPoller<ScriptedProbe, RecordingSleeper>, Arc<CountingProgress>) {
        let progress = Arc::new(CountingProgress::default());
        let poller = ReadinessPoller::new(
            ScriptedProbe::new(script),
            RecordingSleeper::default(),
            progress.clone(),
            policy,
        );
        (poller, progress)
    }

    #[smol_potat::test]
    async fn test_wait_for_down_returns_on_first_failure() {
        let (poller, progress) = poller(&[true, true, true, false, true], ReadinessPolicy::default());

        assert_eq!(poller.wait_for_down(&host()).await, ReadinessState::Down);

        // Stopped at the first failure; the trailing `true` was never asked for
        assert_eq!(poller.probe.remaining(), 1);
        assert_eq!(
            *poller.sleeper.0.lock().unwrap(),
            vec![Duration::from_secs(1); 3]
        );
        assert_eq!(progress.0.load(Ordering::SeqCst), 3);
    }

    #[smol_potat::test]
    async fn test_wait_for_down_when_already_down() {
        let (poller, progress) = poller(&[false], ReadinessPolicy::default());

        assert_eq!(poller.wait_for_down(&host()).await, ReadinessState::Down);
        assert!(poller.sleeper.0.lock().unwrap().is_empty());
        assert_eq!(progress.0.load(Ordering::SeqCst), 0);
    }

    #[smol_potat::test]
    async fn test_wait_for_up_returns_on_first_success() {
        let (poller, progress) = poller(&[false, false, true, false], ReadinessPolicy::default());

        assert_eq!(poller.wait_for_up(&host()).await.unwrap(), ReadinessState::Up);

        assert_eq!(poller.probe.remaining(), 1);
        assert_eq!(
            *poller.sleeper.0.lock().unwrap(),
            vec![Duration::from_millis(10); 2]
        );
        assert_eq!(progress.0.load(Ordering::SeqCst), 2);
    }

    #[smol_potat::test]
    async fn test_wait_for_up_gives_up_when_bounded() {
        let policy = ReadinessPolicy {
            max_up_attempts: Some(3),
            ..ReadinessPolicy::default()
        };
        let (poller, _) = poller(&[false, false, false, true], policy);

        match poller.wait_for_up(&host()).await {
            Err(FleetError::ReadinessTimeout { host, attempts }) => {
                assert_eq!(host, "build01.nix-community.org");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(poller.probe.remaining(), 1);
    }

    #[smol_potat::test]
    async fn test_tcp_probe_against_local_listener() {
        let listener = async_net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(
            TcpProbe
                .is_reachable("127.0.0.1", port, Duration::from_secs(1))
                .await
        );

        drop(listener);
        assert!(
            !TcpProbe
                .is_reachable("127.0.0.1", port, Duration::from_secs(1))
                .await
        );
    }

    #[smol_potat::test]
    async fn test_tcp_probe_unresolvable_name_is_down() {
        assert!(
            !TcpProbe
                .is_reachable("host.invalid", 22, Duration::from_secs(1))
                .await
        );
    }
}
