//! # Registry status model shared with observers.
//!
//! [`StatusSnapshot`] is the full, sorted view of the registry partitions
//! (`ready`, `running`, `stopped`) plus the failure-exemption set. It is
//! computed under the registry lock and handed to every [`Observe`]
//! implementation after the lock is released.

use std::fmt;

/// Registry partition a process currently belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    /// Registered, not launched (or rearmed for a relaunch).
    Ready,
    /// Command is executing.
    Running,
    /// Command returned, was cancelled, or the process was terminated before launch.
    Stopped,
}

impl Status {
    /// Lowercase partition name, as used in snapshots and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ready => "ready",
            Status::Running => "running",
            Status::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of all registry partitions.
///
/// Every list is sorted; every registered name appears in exactly one of
/// `ready`, `running`, `stopped`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Names in the ready partition.
    pub ready: Vec<String>,
    /// Names in the running partition.
    pub running: Vec<String>,
    /// Names in the stopped partition.
    pub stopped: Vec<String>,
    /// Names exempted from failure escalation.
    pub permit_to_kill: Vec<String>,
}

impl StatusSnapshot {
    /// Returns the names of one partition.
    pub fn names(&self, status: Status) -> &[String] {
        match status {
            Status::Ready => &self.ready,
            Status::Running => &self.running,
            Status::Stopped => &self.stopped,
        }
    }

    /// Finds which partition holds `name`, if any.
    pub fn status_of(&self, name: &str) -> Option<Status> {
        [Status::Ready, Status::Running, Status::Stopped]
            .into_iter()
            .find(|s| self.names(*s).iter().any(|n| n == name))
    }

    /// Total number of registered processes.
    pub fn len(&self) -> usize {
        self.ready.len() + self.running.len() + self.stopped.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Synchronous status observer.
///
/// Observers are called by the registry, outside its lock, once per applied
/// transition and in transition order. Implementations must be quick and must
/// not call back into the registry's mutating operations.
pub trait Observe: Send + Sync + 'static {
    /// Receives the snapshot taken right after a transition.
    fn on_status(&self, snapshot: &StatusSnapshot);
}
