//! Rolling reboot ordering with scripted probes

mod common;

use common::{FakeRunner, JournalProgress, NoSleep, ScriptedProbe, exit, journal};
use fleet_deploy::{
    FleetConfig, HostSelector, Outcome, Privilege, ReadinessPoller, ReadinessPolicy,
    RebootOrchestrator, TargetSet,
};
use std::sync::Arc;

const A: &str = "build01.nix-community.org";
const B: &str = "build02.nix-community.org";

async fn targets(runner: &Arc<FakeRunner>) -> TargetSet {
    HostSelector::new(Arc::new(FleetConfig::default()), Arc::clone(runner))
        .unwrap()
        .resolve("build01,build02")
        .await
        .unwrap()
}

fn orchestrator(
    runner: &Arc<FakeRunner>,
    probe: ScriptedProbe,
    journal: &common::Journal,
    policy: ReadinessPolicy,
) -> RebootOrchestrator<FakeRunner, ScriptedProbe, NoSleep> {
    let poller = ReadinessPoller::new(
        probe,
        NoSleep,
        Arc::new(JournalProgress(Arc::clone(journal))),
        policy,
    );
    RebootOrchestrator::new(Arc::clone(runner), poller)
}

fn position(entries: &[String], wanted: &str) -> usize {
    entries
        .iter()
        .position(|e| e == wanted)
        .unwrap_or_else(|| panic!("{:?} not in journal {:#?}", wanted, entries))
}

#[smol_potat::test]
async fn test_hosts_reboot_strictly_one_after_another() {
    let journal = journal();
    let runner = Arc::new(FakeRunner::succeeding(Arc::clone(&journal)));
    let probe = ScriptedProbe::new(Arc::clone(&journal))
        .script(A, &[true, true, false, false, true])
        .script(B, &[false, true]);
    let hosts = targets(&runner).await;

    let results = orchestrator(&runner, probe, &journal, ReadinessPolicy::default())
        .reboot_all(&hosts)
        .await;

    assert!(results.is_success());
    let entries = journal.lock().unwrap().clone();
    assert_eq!(
        entries,
        vec![
            format!("run {}: sh -c reboot &", A),
            format!("Wait for {} to shutdown", A),
            format!("probe {}: up", A),
            format!("probe {}: up", A),
            format!("probe {}: down", A),
            format!("Wait for {} to start", A),
            format!("probe {}: down", A),
            format!("probe {}: up", A),
            format!("run {}: sh -c reboot &", B),
            format!("Wait for {} to shutdown", B),
            format!("probe {}: down", B),
            format!("Wait for {} to start", B),
            format!("probe {}: up", B),
        ]
    );
}

#[smol_potat::test]
async fn test_reboot_is_issued_through_sudo() {
    let journal = journal();
    let runner = Arc::new(FakeRunner::succeeding(Arc::clone(&journal)));
    let probe = ScriptedProbe::new(Arc::clone(&journal))
        .script(A, &[false, true])
        .script(B, &[false, true]);
    let hosts = targets(&runner).await;

    orchestrator(&runner, probe, &journal, ReadinessPolicy::default())
        .reboot_all(&hosts)
        .await;

    let calls = runner.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls
        .iter()
        .all(|c| c.privilege == Some(Privilege::Escalated) && c.command == "sh -c reboot &"));
}

#[smol_potat::test]
async fn test_dropped_session_still_waits_for_host() {
    let journal = journal();
    // ssh exits 255 when the host closes the connection under it
    let runner = Arc::new(FakeRunner::new(Arc::clone(&journal), |_| Ok(exit(255, ""))));
    let probe = ScriptedProbe::new(Arc::clone(&journal))
        .script(A, &[false, true])
        .script(B, &[false, true]);
    let hosts = targets(&runner).await;

    let results = orchestrator(&runner, probe.clone(), &journal, ReadinessPolicy::default())
        .reboot_all(&hosts)
        .await;

    assert!(results.is_success());
    assert_eq!(probe.remaining(A), 0);
    assert_eq!(probe.remaining(B), 0);
}

#[smol_potat::test]
async fn test_unreachable_ssh_fails_host_and_moves_on() {
    let journal = journal();
    let runner = Arc::new(FakeRunner::new(Arc::clone(&journal), |call| {
        if call.host.as_deref() == Some(A) {
            Err(command_executor::Error::spawn_failed("ssh: connection refused"))
        } else {
            Ok(exit(0, ""))
        }
    }));
    let probe = ScriptedProbe::new(Arc::clone(&journal)).script(B, &[false, true]);
    let hosts = targets(&runner).await;

    let results = orchestrator(&runner, probe, &journal, ReadinessPolicy::default())
        .reboot_all(&hosts)
        .await;

    assert!(matches!(results.outcome_for(A), Some(Outcome::Failure(_))));
    assert_eq!(results.outcome_for(B), Some(&Outcome::Success));

    // No waiting on a host that was never told to reboot
    let entries = journal.lock().unwrap().clone();
    assert!(!entries.iter().any(|e| e.starts_with(&format!("probe {}", A))));
    assert!(position(&entries, &format!("run {}: sh -c reboot &", B)) > 0);
}

#[smol_potat::test]
async fn test_bounded_wait_gives_up_and_continues() {
    let journal = journal();
    let runner = Arc::new(FakeRunner::succeeding(Arc::clone(&journal)));
    let probe = ScriptedProbe::new(Arc::clone(&journal))
        .script(A, &[false, false, false, false])
        .script(B, &[false, true]);
    let hosts = targets(&runner).await;
    let policy = ReadinessPolicy {
        max_up_attempts: Some(3),
        ..ReadinessPolicy::default()
    };

    let results = orchestrator(&runner, probe.clone(), &journal, policy)
        .reboot_all(&hosts)
        .await;

    match results.outcome_for(A) {
        Some(Outcome::Failure(reason)) => {
            assert!(reason.contains("did not come back after 3"))
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(results.outcome_for(B), Some(&Outcome::Success));
    // One probe for the shutdown, three for the startup
    assert_eq!(probe.remaining(A), 0);

    let entries = journal.lock().unwrap().clone();
    let last_a = entries
        .iter()
        .rposition(|e| e.starts_with(&format!("probe {}", A)))
        .unwrap();
    assert!(last_a < position(&entries, &format!("run {}: sh -c reboot &", B)));
}

#[test]
fn test_configured_policy_reaches_poller() {
    let config = FleetConfig::from_yaml("readiness:\n  max_up_attempts: 7\n").unwrap();
    let policy = config.readiness_policy();

    assert_eq!(policy.max_up_attempts, Some(7));
    assert_eq!(policy.connect_timeout, ReadinessPolicy::default().connect_timeout);
}
