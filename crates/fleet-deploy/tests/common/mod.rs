//! Common test utilities: a scripted command runner and readiness fakes
//! that write to one shared journal, so tests can assert on ordering.

#![allow(dead_code)]

use async_trait::async_trait;
use command_executor::{Command, ExitResult, ExitStatus};
use fleet_deploy::{CommandRunner, HostDescriptor, Privilege, Probe, ProgressSink, Sleeper};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Ordered log of everything the fakes were asked to do
pub type Journal = Arc<Mutex<Vec<String>>>;

/// One recorded runner invocation
#[derive(Debug, Clone)]
pub struct Call {
    /// `None` for local commands
    pub host: Option<String>,
    pub command: String,
    pub privilege: Option<Privilege>,
    pub current_dir: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
}

type Responder =
    dyn Fn(&Call) -> command_executor::Result<ExitResult> + Send + Sync + 'static;

/// Runner that answers from a closure instead of spawning processes
pub struct FakeRunner {
    journal: Journal,
    calls: Mutex<Vec<Call>>,
    responder: Box<Responder>,
}

impl FakeRunner {
    pub fn new<F>(journal: Journal, responder: F) -> Self
    where
        F: Fn(&Call) -> command_executor::Result<ExitResult> + Send + Sync + 'static,
    {
        Self {
            journal,
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    /// Every command succeeds with empty output
    pub fn succeeding(journal: Journal) -> Self {
        Self::new(journal, |_| Ok(exit(0, "")))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn remote_calls_for(&self, address: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.host.as_deref() == Some(address))
            .collect()
    }

    fn record(&self, call: Call) -> command_executor::Result<ExitResult> {
        let where_ = call.host.clone().unwrap_or_else(|| "local".to_string());
        self.journal
            .lock()
            .unwrap()
            .push(format!("run {}: {}", where_, call.command));
        self.calls.lock().unwrap().push(call.clone());
        (self.responder)(&call)
    }
}

fn describe(command: &Command) -> (String, Option<PathBuf>, Vec<(String, String)>) {
    let envs = command
        .get_envs()
        .iter()
        .map(|(k, v)| (k.to_string_lossy().into_owned(), v.to_string_lossy().into_owned()))
        .collect();
    (
        command.to_string(),
        command.get_current_dir().map(|p| p.to_path_buf()),
        envs,
    )
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run_local(&self, command: Command) -> command_executor::Result<ExitResult> {
        let (command, current_dir, envs) = describe(&command);
        self.record(Call {
            host: None,
            command,
            privilege: None,
            current_dir,
            envs,
        })
    }

    async fn run_remote(
        &self,
        host: &HostDescriptor,
        command: Command,
        privilege: Privilege,
    ) -> command_executor::Result<ExitResult> {
        let (command, current_dir, envs) = describe(&command);
        self.record(Call {
            host: Some(host.address().to_string()),
            command,
            privilege: Some(privilege),
            current_dir,
            envs,
        })
    }
}

/// A finished process with the given exit code and stdout
pub fn exit(code: i32, stdout: &str) -> ExitResult {
    ExitResult {
        status: ExitStatus::from_code(code),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

/// Probe answering from a per-host script, journaling each answer.
/// Clones share the scripts.
#[derive(Clone)]
pub struct ScriptedProbe {
    journal: Journal,
    scripts: Arc<Mutex<HashMap<String, VecDeque<bool>>>>,
}

impl ScriptedProbe {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            scripts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn script(self, address: &str, answers: &[bool]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(address.to_string(), answers.iter().copied().collect());
        self
    }

    pub fn remaining(&self, address: &str) -> usize {
        self.scripts
            .lock()
            .unwrap()
            .get(address)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn is_reachable(&self, address: &str, _port: u16, _timeout: Duration) -> bool {
        let answer = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(address)
            .and_then(|s| s.pop_front())
            .unwrap_or_else(|| panic!("unscripted probe of {}", address));
        self.journal.lock().unwrap().push(format!(
            "probe {}: {}",
            address,
            if answer { "up" } else { "down" }
        ));
        answer
    }
}

/// Sleeper that returns immediately
pub struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _duration: Duration) {}
}

/// Progress sink that journals the wait-loop messages
pub struct JournalProgress(pub Journal);

impl ProgressSink for JournalProgress {
    fn begin(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }

    fn tick(&self) {}

    fn finish(&self) {}
}

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}
