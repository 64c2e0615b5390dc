//! # Registry: the single source of truth for process status.
//!
//! Every registered [`Process`] sits in exactly one of three partitions
//! (`ready`, `running`, `stopped`). Transitions are applied under one write
//! lock; observers, logs and bus events follow **after** the lock is released.
//!
//! ## State machine
//! ```text
//!            update_status(Running)         update_status(Stopped) / mark_stopped
//!   ready ─────────────────────────► running ───────────────────────────────► stopped
//!     │                                                                         │  ▲
//!     └──────────────────────────── retire ─────────────────────────────────────┘  │
//!                                                                                  │
//!   ready ◄─────────────────────────── rearm ──────────────────────────────────────┘
//! ```
//! Any other request fails with [`RegistryError::InvalidTransition`] and changes nothing.
//!
//! ## Notification order
//! ```text
//! write lock ─► mutate ─► snapshot ─► take notify lock ─► release write lock
//!                                          └─► observers (sync) ─► log ─► Bus.publish
//! ```
//! The notify lock is taken before the write lock is released, so observers see
//! snapshots in exactly the order transitions were applied.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock as SyncRwLock};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::core::Process;
use crate::error::RegistryError;
use crate::events::{Bus, Event, EventKind, Observe, Status, StatusSnapshot};

#[derive(Default)]
struct Partitions {
    ready: HashMap<String, Arc<Process>>,
    running: HashMap<String, Arc<Process>>,
    stopped: HashMap<String, Arc<Process>>,
    permit_to_kill: HashSet<String>,
}

impl Partitions {
    fn of(&self, status: Status) -> &HashMap<String, Arc<Process>> {
        match status {
            Status::Ready => &self.ready,
            Status::Running => &self.running,
            Status::Stopped => &self.stopped,
        }
    }

    fn of_mut(&mut self, status: Status) -> &mut HashMap<String, Arc<Process>> {
        match status {
            Status::Ready => &mut self.ready,
            Status::Running => &mut self.running,
            Status::Stopped => &mut self.stopped,
        }
    }

    fn locate(&self, name: &str) -> Option<(Arc<Process>, Status)> {
        [Status::Ready, Status::Running, Status::Stopped]
            .into_iter()
            .find_map(|s| self.of(s).get(name).map(|p| (Arc::clone(p), s)))
    }

    fn snapshot(&self) -> StatusSnapshot {
        fn sorted<'a>(names: impl Iterator<Item = &'a String>) -> Vec<String> {
            let mut v: Vec<String> = names.cloned().collect();
            v.sort();
            v
        }
        StatusSnapshot {
            ready: sorted(self.ready.keys()),
            running: sorted(self.running.keys()),
            stopped: sorted(self.stopped.keys()),
            permit_to_kill: sorted(self.permit_to_kill.iter()),
        }
    }

    fn all(&self) -> Vec<Arc<Process>> {
        let mut all: Vec<Arc<Process>> = self
            .ready
            .values()
            .chain(self.running.values())
            .chain(self.stopped.values())
            .cloned()
            .collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }
}

/// Partitioned process registry with ordered status notifications.
pub struct Registry {
    inner: RwLock<Partitions>,
    notify: Mutex<()>,
    observers: SyncRwLock<Vec<Arc<dyn Observe>>>,
    bus: Bus,
}

impl Registry {
    /// Creates an empty registry publishing transitions on `bus`.
    pub fn new(bus: Bus) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(Partitions::default()),
            notify: Mutex::new(()),
            observers: SyncRwLock::new(Vec::new()),
            bus,
        })
    }

    /// Bus the registry publishes transition events on.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Adds a process to the ready partition and subscribes it to status updates.
    ///
    /// Its `kill` hook targets join the permit-to-kill set.
    pub async fn register(&self, process: Arc<Process>) -> Result<(), RegistryError> {
        let name = process.name().to_string();
        {
            let mut inner = self.inner.write().await;
            if inner.locate(&name).is_some() {
                return Err(RegistryError::AlreadyRegistered { name });
            }
            inner
                .permit_to_kill
                .extend(process.spec().hooks.kill.iter().cloned());
            process.set_status(Status::Ready);
            inner.ready.insert(name.clone(), Arc::clone(&process));
        }
        self.observe(process);
        debug!(service = %name, "registered");
        Ok(())
    }

    /// Adds a synchronous status observer.
    pub fn observe(&self, observer: Arc<dyn Observe>) {
        match self.observers.write() {
            Ok(mut list) => list.push(observer),
            Err(poisoned) => poisoned.into_inner().push(observer),
        }
    }

    /// Moves a process `ready → running` or `running → stopped`.
    pub async fn update_status(&self, process: &Process, to: Status) -> Result<(), RegistryError> {
        let from = match to {
            Status::Running => Status::Ready,
            Status::Stopped => Status::Running,
            Status::Ready => {
                return Err(RegistryError::InvalidTransition {
                    name: process.name().to_string(),
                    from: process.status(),
                    to,
                })
            }
        };
        self.transition(process, from, to).await
    }

    /// Moves a never-launched process `ready → stopped`.
    pub async fn retire(&self, process: &Process) -> Result<(), RegistryError> {
        self.transition(process, Status::Ready, Status::Stopped).await
    }

    /// Moves a stopped process back to `ready` ahead of a relaunch.
    pub async fn rearm(&self, process: &Process) -> Result<(), RegistryError> {
        self.transition(process, Status::Stopped, Status::Ready).await
    }

    /// Moves a running process to `stopped`; `Ok(false)` if it already was.
    ///
    /// Used by both the task that ran the command and the terminator, so a
    /// process stopped from two sides is only recorded once.
    pub async fn mark_stopped(&self, process: &Process) -> Result<bool, RegistryError> {
        match self.transition(process, Status::Running, Status::Stopped).await {
            Ok(()) => Ok(true),
            Err(RegistryError::InvalidTransition {
                from: Status::Stopped,
                ..
            }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Full sorted snapshot of all partitions.
    pub async fn status(&self) -> StatusSnapshot {
        self.inner.read().await.snapshot()
    }

    /// True if some process lists `name` in its `kill` hook.
    pub async fn is_permitted_to_be_killed(&self, name: &str) -> bool {
        self.inner.read().await.permit_to_kill.contains(name)
    }

    /// Resolves a name to its process and current partition.
    pub async fn get_process(&self, name: &str) -> Result<(Arc<Process>, Status), RegistryError> {
        self.inner
            .read()
            .await
            .locate(name)
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })
    }

    /// Processes of one partition, sorted by name.
    pub async fn list_by_status(&self, status: Status) -> Vec<Arc<Process>> {
        let inner = self.inner.read().await;
        let mut list: Vec<Arc<Process>> = inner.of(status).values().cloned().collect();
        list.sort_by(|a, b| a.name().cmp(b.name()));
        list
    }

    /// Every registered process, sorted by name.
    pub async fn all_processes(&self) -> Vec<Arc<Process>> {
        self.inner.read().await.all()
    }

    /// Number of registered processes.
    pub async fn len(&self) -> usize {
        let inner = self.inner.read().await;
        inner.ready.len() + inner.running.len() + inner.stopped.len()
    }

    /// True if nothing is registered.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drops `wait` targets nobody registered and rejects dependency cycles.
    ///
    /// Call once after the whole fleet is registered.
    pub async fn check_dependencies(&self) -> Result<(), RegistryError> {
        let all = self.all_processes().await;
        let known: HashSet<&str> = all.iter().map(|p| p.name()).collect();

        let mut graph: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for proc in &all {
            let mut deps = Vec::new();
            for dep in proc.pending() {
                if known.contains(dep.as_str()) {
                    deps.push(dep);
                } else {
                    warn!(service = %proc.name(), target = %dep, "unknown wait target ignored");
                    proc.forget_dependency(&dep);
                }
            }
            graph.insert(proc.name().to_string(), deps);
        }

        match find_cycle(&graph) {
            Some(cycle) => Err(RegistryError::DependencyCycle { cycle }),
            None => Ok(()),
        }
    }

    async fn transition(&self, process: &Process, from: Status, to: Status) -> Result<(), RegistryError> {
        let name = process.name();
        let mut inner = self.inner.write().await;

        let Some((_, actual)) = inner.locate(name) else {
            return Err(RegistryError::NotFound {
                name: name.to_string(),
            });
        };
        if actual != from {
            return Err(RegistryError::InvalidTransition {
                name: name.to_string(),
                from: actual,
                to,
            });
        }
        if let Some(entry) = inner.of_mut(from).remove(name) {
            inner.of_mut(to).insert(name.to_string(), entry);
        }
        process.set_status(to);
        let snapshot = Arc::new(inner.snapshot());

        let _order = self.notify.lock().await;
        drop(inner);
        self.announce(name, from, to, snapshot);
        Ok(())
    }

    fn announce(&self, name: &str, from: Status, to: Status, snapshot: Arc<StatusSnapshot>) {
        let observers = match self.observers.read() {
            Ok(list) => list.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for observer in &observers {
            observer.on_status(&snapshot);
        }

        let kind = match (from, to) {
            (Status::Ready, Status::Running) => {
                info!(service = %name, "running");
                EventKind::ProcessRunning
            }
            (Status::Running, _) => {
                info!(service = %name, "stopped");
                EventKind::ProcessStopped
            }
            (Status::Ready, _) => {
                info!(service = %name, "terminated before launch");
                EventKind::ProcessRetired
            }
            (Status::Stopped, _) => {
                debug!(service = %name, "rearmed");
                EventKind::ProcessRearmed
            }
        };
        debug!(
            ready = ?snapshot.ready,
            running = ?snapshot.running,
            stopped = ?snapshot.stopped,
            "registry status"
        );
        self.bus.publish(
            Event::new(kind)
                .with_service(name)
                .with_snapshot(snapshot),
        );
    }
}

/// Depth-first search for a cycle; returns the path with its first node repeated.
fn find_cycle(graph: &BTreeMap<String, Vec<String>>) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        node: &'a str,
        graph: &'a BTreeMap<String, Vec<String>>,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        match marks.get(node) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| *n == node)?;
                let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(node.to_string());
                return Some(cycle);
            }
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        path.push(node);
        for dep in graph.get(node).into_iter().flatten() {
            if let Some(cycle) = visit(dep, graph, marks, path) {
                return Some(cycle);
            }
        }
        path.pop();
        marks.insert(node, Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    let mut path = Vec::new();
    graph
        .keys()
        .find_map(|node| visit(node, graph, &mut marks, &mut path))
}
