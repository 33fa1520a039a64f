use std::sync::{Arc, Mutex};

use procwarden::registry::ProcessRegistry;
use procwarden::spawn::ProcessSignaller;
use procwarden::{AppError, Result};

/// Records every `terminate_group` target; clones share the same log so a
/// test can keep a handle after moving the signaller into the registry.
#[derive(Clone, Default)]
struct RecordingSignaller {
    terminated_groups: Arc<Mutex<Vec<i32>>>,
}

impl RecordingSignaller {
    fn terminated(&self) -> Vec<i32> {
        let mut pids = self.terminated_groups.lock().unwrap().clone();
        pids.sort_unstable();
        pids
    }
}

impl ProcessSignaller for RecordingSignaller {
    fn terminate(&self, _pid: i32) -> Result<()> {
        Ok(())
    }

    fn kill(&self, _pid: i32) -> Result<()> {
        Ok(())
    }

    fn terminate_group(&self, pid: i32) -> Result<()> {
        self.terminated_groups.lock().unwrap().push(pid);
        Ok(())
    }

    fn kill_group(&self, _pid: i32) -> Result<()> {
        Ok(())
    }
}

struct FailingSignaller;

impl ProcessSignaller for FailingSignaller {
    fn terminate(&self, pid: i32) -> Result<()> {
        Err(AppError::Signal(format!("no such process {pid}")))
    }

    fn kill(&self, pid: i32) -> Result<()> {
        Err(AppError::Signal(format!("no such process {pid}")))
    }

    fn terminate_group(&self, pid: i32) -> Result<()> {
        Err(AppError::Signal(format!("no such process {pid}")))
    }

    fn kill_group(&self, pid: i32) -> Result<()> {
        Err(AppError::Signal(format!("no such process {pid}")))
    }
}

#[test]
fn register_and_unregister_track_live_children() {
    let registry = ProcessRegistry::new(Box::<RecordingSignaller>::default());
    assert!(registry.is_empty());

    registry.register(10, "worker one");
    registry.register(20, "worker two");
    assert_eq!(registry.len(), 2);

    registry.unregister(10);
    assert_eq!(registry.len(), 1);

    // Absent pid removal is a no-op.
    registry.unregister(10);
    assert_eq!(registry.len(), 1);
}

#[test]
fn registering_same_pid_replaces_the_record() {
    let registry = ProcessRegistry::new(Box::<RecordingSignaller>::default());
    registry.register(42, "first incarnation");
    registry.register(42, "second incarnation");

    let records = registry.snapshot_active();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].command_line, "second incarnation");
}

#[test]
fn snapshot_is_sorted_by_pid() {
    let registry = ProcessRegistry::new(Box::<RecordingSignaller>::default());
    registry.register(30, "c");
    registry.register(10, "a");
    registry.register(20, "b");

    let pids: Vec<i32> = registry.snapshot_active().iter().map(|r| r.pid).collect();
    assert_eq!(pids, vec![10, 20, 30]);
}

#[test]
fn drain_signals_only_registered_pids() {
    let signaller = RecordingSignaller::default();
    let registry = ProcessRegistry::new(Box::new(signaller.clone()));
    registry.register(10, "a");
    registry.register(11, "b");
    registry.register(12, "c");
    registry.unregister(11);

    // 13 appears only in the extras and has no live record: skipped.
    let signalled = registry.drain_and_terminate(&[13]);

    assert_eq!(signalled, 2);
    assert_eq!(signaller.terminated(), vec![10, 12]);
    assert!(registry.is_empty());
}

#[test]
fn drain_is_idempotent() {
    let registry = ProcessRegistry::new(Box::<RecordingSignaller>::default());
    registry.register(5, "one-shot");

    assert_eq!(registry.drain_and_terminate(&[]), 1);
    assert_eq!(registry.drain_and_terminate(&[]), 0);
    assert_eq!(registry.drain_and_terminate(&[]), 0);
}

#[test]
fn drain_on_empty_registry_signals_nothing() {
    let registry = ProcessRegistry::new(Box::<RecordingSignaller>::default());
    assert_eq!(registry.drain_and_terminate(&[]), 0);
    assert_eq!(registry.drain_and_terminate(&[1, 2, 3]), 0);
}

#[test]
fn drain_swallows_signal_failures() {
    let registry = ProcessRegistry::new(Box::new(FailingSignaller));
    registry.register(7, "already gone");

    // The pid is still removed and counted even though delivery failed.
    assert_eq!(registry.drain_and_terminate(&[]), 1);
    assert!(registry.is_empty());
}

#[test]
fn concurrent_registration_never_loses_records() {
    use std::sync::Arc;

    let registry = Arc::new(ProcessRegistry::new(Box::<RecordingSignaller>::default()));
    let mut handles = Vec::new();

    for base in 0..4i32 {
        let registry = Arc::clone(&registry);
        handles.push(std::thread::spawn(move || {
            for offset in 0..50i32 {
                registry.register(base * 1000 + offset, "spawned concurrently");
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(registry.len(), 200);
    assert_eq!(registry.drain_and_terminate(&[]), 200);
    assert!(registry.is_empty());
}
