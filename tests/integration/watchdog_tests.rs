use std::sync::Arc;
use std::time::Duration;

use procwarden::registry::ProcessRegistry;
use procwarden::watchdog::{Watchdog, WatchdogState, RESET_BACKOFF_TOKEN};

use super::test_helpers::{ChildScript, FailingSpawner, RecordingSignaller, ScriptedSpawner};

fn command() -> Vec<String> {
    vec!["heartbeat".into()]
}

fn watchdog_over(
    spawner: Arc<ScriptedSpawner>,
    signaller: &RecordingSignaller,
    table: Vec<Duration>,
) -> (Arc<Watchdog>, Arc<ProcessRegistry>) {
    let registry = Arc::new(ProcessRegistry::new(Box::new(signaller.clone())));
    let watchdog = Arc::new(
        Watchdog::new(
            command(),
            spawner,
            Arc::clone(&registry),
            Arc::new(signaller.clone()),
        )
        .with_backoff_table(table),
    );
    (watchdog, registry)
}

#[tokio::test]
async fn restarts_exiting_children_until_stopped() {
    let spawner = Arc::new(ScriptedSpawner::new(Vec::new()));
    let signaller = RecordingSignaller::default();
    let (watchdog, registry) = watchdog_over(
        Arc::clone(&spawner),
        &signaller,
        vec![Duration::from_millis(1); 4],
    );

    watchdog.start().expect("watchdog starts");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(
        spawner.spawn_count() >= 3,
        "expected several restart cycles, saw {}",
        spawner.spawn_count()
    );

    watchdog.stop().await;
    assert_eq!(watchdog.state(), WatchdogState::Stopped);
    assert!(registry.is_empty());

    // No further cycles after stop.
    let settled = spawner.spawn_count();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(spawner.spawn_count(), settled);
}

#[tokio::test]
async fn starting_twice_is_an_error() {
    let spawner = Arc::new(ScriptedSpawner::new(vec![ChildScript::StaysOpen("")]));
    let signaller = RecordingSignaller::default();
    let (watchdog, _registry) = watchdog_over(
        Arc::clone(&spawner),
        &signaller,
        vec![Duration::from_millis(1)],
    );

    watchdog.start().expect("first start");
    let err = watchdog.start().unwrap_err();
    assert!(err.to_string().contains("already started"));

    watchdog.stop().await;
}

#[tokio::test]
async fn restarting_after_stop_is_rejected_as_stopped() {
    let spawner = Arc::new(ScriptedSpawner::new(vec![ChildScript::StaysOpen("")]));
    let signaller = RecordingSignaller::default();
    let (watchdog, _registry) = watchdog_over(
        Arc::clone(&spawner),
        &signaller,
        vec![Duration::from_millis(1)],
    );

    watchdog.start().expect("first start");
    watchdog.stop().await;

    let err = watchdog.start().unwrap_err();
    assert!(err.to_string().contains("monitor already stopped"));
}

#[tokio::test]
async fn live_child_is_registered_and_signalled_on_stop() {
    let spawner = Arc::new(ScriptedSpawner::new(vec![ChildScript::StaysOpen("")]));
    let signaller = RecordingSignaller::default();
    let (watchdog, registry) = watchdog_over(
        Arc::clone(&spawner),
        &signaller,
        vec![Duration::from_millis(1)],
    );

    watchdog.start().expect("watchdog starts");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(watchdog.state(), WatchdogState::Running);
    let pid = watchdog.live_pid();
    assert_eq!(pid, 100, "first scripted pid");
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.snapshot_active()[0].command_line, "heartbeat");

    watchdog.stop().await;

    assert!(signaller.terminated().contains(&pid));
    assert!(registry.is_empty());
    assert_eq!(watchdog.live_pid(), 0);
    assert_eq!(watchdog.state(), WatchdogState::Stopped);
}

#[tokio::test]
async fn reset_token_restores_the_fast_restart_delay() {
    // Delay table: fast first entry, prohibitive second entry. The first
    // child exits without the token, advancing the index; the second child
    // emits the token, so the third child must appear after the fast delay
    // rather than the 30 second one.
    let spawner = Arc::new(ScriptedSpawner::new(vec![
        ChildScript::Exits(""),
        ChildScript::Exits("RESET_BACKOFF_INDEX\n"),
        ChildScript::StaysOpen(""),
    ]));
    let signaller = RecordingSignaller::default();
    let (watchdog, _registry) = watchdog_over(
        Arc::clone(&spawner),
        &signaller,
        vec![Duration::from_millis(5), Duration::from_secs(30)],
    );

    watchdog.start().expect("watchdog starts");
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(
        spawner.spawn_count() >= 3,
        "third child should have spawned quickly, saw {} cycles",
        spawner.spawn_count()
    );

    watchdog.stop().await;
}

#[tokio::test]
async fn token_is_recognized_by_prefix_amid_blank_lines() {
    let script = "\n\nRESET_BACKOFF_INDEX trailing text\n";
    let spawner = Arc::new(ScriptedSpawner::new(vec![
        ChildScript::Exits(""),
        ChildScript::Exits(script),
        ChildScript::StaysOpen(""),
    ]));
    let signaller = RecordingSignaller::default();
    let (watchdog, _registry) = watchdog_over(
        Arc::clone(&spawner),
        &signaller,
        vec![Duration::from_millis(5), Duration::from_secs(30)],
    );

    assert!(script.contains(RESET_BACKOFF_TOKEN));
    watchdog.start().expect("watchdog starts");
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(spawner.spawn_count() >= 3);
    watchdog.stop().await;
}

#[tokio::test]
async fn spawn_failures_keep_retrying_until_stopped() {
    let spawner = Arc::new(FailingSpawner::default());
    let signaller = RecordingSignaller::default();
    let registry = Arc::new(ProcessRegistry::new(Box::new(signaller.clone())));
    let watchdog = Arc::new(
        Watchdog::new(
            command(),
            Arc::clone(&spawner) as Arc<dyn procwarden::spawn::Spawn>,
            Arc::clone(&registry),
            Arc::new(signaller),
        )
        .with_backoff_table(vec![Duration::from_millis(1); 4]),
    );

    watchdog.start().expect("watchdog starts");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(
        spawner.attempts() >= 3,
        "expected repeated spawn attempts, saw {}",
        spawner.attempts()
    );
    assert!(registry.is_empty(), "failed spawns never register a child");

    watchdog.stop().await;
    assert_eq!(watchdog.state(), WatchdogState::Stopped);
}
