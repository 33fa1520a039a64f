//! Child-process registry — tracks live child workers by pid.
//!
//! The registry is the single cross-task shared mutable structure in the
//! supervisor: command handlers, the watchdog, and the shutdown sweep all
//! mutate it concurrently. The lock is never held across an await point.
//!
//! A pid occupies at most one live record at a time. OS pids are reused
//! over the life of the host, so identity is only valid for the record's
//! lifetime.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::spawn::ProcessSignaller;

/// Metadata for one live child worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildProcessRecord {
    /// Opaque process identifier.
    pub pid: i32,
    /// Command line the child was invoked with.
    pub command_line: String,
    /// Time the child was registered.
    pub created_at: DateTime<Utc>,
}

/// Concurrent map of live child pids to their records, with a best-effort
/// bulk-termination sweep used at supervisor shutdown.
pub struct ProcessRegistry {
    children: Mutex<HashMap<i32, ChildProcessRecord>>,
    signaller: Box<dyn ProcessSignaller>,
}

impl ProcessRegistry {
    /// Create an empty registry that delivers termination signals through
    /// `signaller`.
    #[must_use]
    pub fn new(signaller: Box<dyn ProcessSignaller>) -> Self {
        Self {
            children: Mutex::new(HashMap::new()),
            signaller,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i32, ChildProcessRecord>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the record for `pid`.
    pub fn register(&self, pid: i32, command_line: impl Into<String>) {
        let record = ChildProcessRecord {
            pid,
            command_line: command_line.into(),
            created_at: Utc::now(),
        };
        debug!(pid, command_line = %record.command_line, "child registered");
        self.lock().insert(pid, record);
    }

    /// Remove the record for `pid` if present. Removing an absent pid is a
    /// no-op.
    pub fn unregister(&self, pid: i32) {
        if self.lock().remove(&pid).is_some() {
            debug!(pid, "child unregistered");
        }
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no children are currently tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// All live records, sorted by pid, for status reporting.
    #[must_use]
    pub fn snapshot_active(&self) -> Vec<ChildProcessRecord> {
        let mut records: Vec<ChildProcessRecord> = self.lock().values().cloned().collect();
        records.sort_by_key(|record| record.pid);
        records
    }

    /// Best-effort termination sweep over the union of currently-registered
    /// pids and `extra_pids`.
    ///
    /// Repeatedly finds a pid present in both the registry and the working
    /// set, removes it from the registry, and sends a graceful process-group
    /// termination signal to it, until no such pid remains. Pids present
    /// only in `extra_pids` are never matched and are skipped. Signal
    /// failures (the process already exited) are swallowed.
    ///
    /// Tolerates concurrent `register`/`unregister` calls: the registry lock
    /// is re-taken for each removal.
    ///
    /// Returns the number of termination signals sent.
    #[must_use]
    pub fn drain_and_terminate(&self, extra_pids: &[i32]) -> usize {
        let mut working: HashSet<i32> = self.lock().keys().copied().collect();
        working.extend(extra_pids.iter().copied());

        let mut signalled = 0usize;
        while !working.is_empty() {
            let next = {
                let mut guard = self.lock();
                let found = guard.keys().find(|pid| working.contains(pid)).copied();
                if let Some(pid) = found {
                    guard.remove(&pid);
                }
                found
            };

            let Some(pid) = next else {
                // No remaining working-set pid is registered; the rest are
                // extra pids with no live record.
                break;
            };

            working.remove(&pid);
            signalled += 1;
            debug!(pid, nth = signalled, "terminating child process group");
            if let Err(err) = self.signaller.terminate_group(pid) {
                warn!(pid, %err, "termination signal not delivered");
            }
        }

        signalled
    }
}
