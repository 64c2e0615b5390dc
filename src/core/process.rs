//! # Process instance: runtime wrapper around one [`ServiceSpec`].
//!
//! A [`Process`] is created once per service at registration and lives for the
//! whole run. It owns the only per-run mutable state a service has:
//! - the **live wait set**, cloned from `hooks.wait` and pruned as dependencies stop;
//! - the **cancellation handle** of the command currently executing;
//! - the **sub-service flag**, cleared when a start hook launches it;
//! - a **launch claim**, so at most one task drives the process at a time.
//!
//! Its registry status is owned by the [`Registry`](crate::Registry); the
//! process only carries a mirror of it, written under the registry lock.
//!
//! ## Dependency wait
//! ```text
//! Registry transition ─► observer pass ─► Process::on_status(snapshot)
//!                                            └─ drop every `stopped` name from the wait set
//!                                                  └─ set became empty ─► wake wait_for_dependencies()
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::{self, Interpreter, Invocation, LogSink, Stream};
use crate::core::Supervisor;
use crate::error::CommandError;
use crate::events::{Event, EventKind, Observe, Status, StatusSnapshot};
use crate::services::{HookKind, ServiceSpec};

/// Runtime handle for one service.
pub struct Process {
    spec: ServiceSpec,
    sub_service: AtomicBool,
    claimed: AtomicBool,
    waiting: watch::Sender<BTreeSet<String>>,
    status: watch::Sender<Status>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl Process {
    /// Creates a ready process from its specification.
    pub fn new(spec: ServiceSpec) -> Self {
        let waiting: BTreeSet<String> = spec.hooks.wait.iter().cloned().collect();
        Self {
            sub_service: AtomicBool::new(spec.sub_service),
            claimed: AtomicBool::new(false),
            waiting: watch::Sender::new(waiting),
            status: watch::Sender::new(Status::Ready),
            cancel: Mutex::new(None),
            spec,
        }
    }

    /// Service name (registry key).
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// The immutable specification this process was created from.
    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    /// Current registry status, as last written by the registry.
    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    /// True while the process may only be launched by a start hook.
    pub fn is_sub_service(&self) -> bool {
        self.sub_service.load(Ordering::Acquire)
    }

    /// Makes a sub-service independently launchable.
    pub fn clear_sub_service(&self) {
        self.sub_service.store(false, Ordering::Release);
    }

    /// Dependencies this process is still waiting for, sorted.
    pub fn pending(&self) -> Vec<String> {
        self.waiting.borrow().iter().cloned().collect()
    }

    /// True while a command is executing (a cancellation handle is present).
    pub fn is_armed(&self) -> bool {
        self.token_slot().is_some()
    }

    /// Blocks until the live wait set is empty.
    pub async fn wait_for_dependencies(&self) {
        let mut rx = self.waiting.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(BTreeSet::is_empty).await;
    }

    /// Resolves once the process is no longer in the ready partition.
    pub async fn left_ready(&self) {
        let mut rx = self.status.subscribe();
        let _ = rx.wait_for(|s| *s != Status::Ready).await;
    }

    /// Expands variables, builds the environment and runs the command.
    ///
    /// Uses the handle installed by [`arm`](Self::arm) (or a fresh one) and
    /// drops it once the command returns.
    pub async fn run(&self, interpreter: &dyn Interpreter) -> Result<(), CommandError> {
        let token = self
            .token_slot()
            .get_or_insert_with(CancellationToken::new)
            .clone();
        let res = self.execute(interpreter, token).await;
        self.disarm();
        res
    }

    /// Requests termination of the running command; no-op when idle.
    pub fn cancel(&self) {
        if let Some(token) = self.token_slot().as_ref() {
            token.cancel();
            warn!(service = %self.name(), "stopped by supervisor");
        }
    }

    /// Invokes the start hook: launches every resolvable target.
    ///
    /// Targets lose their sub-service flag; unknown names are logged and skipped.
    pub async fn on_start_hook(&self, core: &Arc<Supervisor>) {
        let targets = self.spec.hooks.get(HookKind::Start);
        if targets.is_empty() {
            return;
        }
        let mut launch = Vec::with_capacity(targets.len());
        for name in targets {
            match core.registry().get_process(name).await {
                Ok((proc, _)) => {
                    proc.clear_sub_service();
                    launch.push(proc);
                }
                Err(e) => self.report_unknown(core, HookKind::Start, name, &e.to_string()),
            }
        }
        core.launch(launch);
    }

    /// Invokes the stop hook: submits every target to the termination path.
    pub async fn on_stop_hook(&self, core: &Supervisor) {
        let targets = self.spec.hooks.get(HookKind::Stop);
        if !targets.is_empty() {
            core.request_termination(targets.to_vec()).await;
        }
    }

    // ---------------------------
    // Crate-internal lifecycle
    // ---------------------------

    /// Installs a fresh cancellation handle ahead of the `running` transition.
    pub(crate) fn arm(&self) {
        *self.token_slot() = Some(CancellationToken::new());
    }

    /// Drops the cancellation handle.
    pub(crate) fn disarm(&self) {
        self.token_slot().take();
    }

    /// Takes the launch claim; false if another task already drives this process.
    pub(crate) fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Gives the launch claim back.
    pub(crate) fn release(&self) {
        self.claimed.store(false, Ordering::Release);
    }

    /// Written by the registry while it holds its lock.
    pub(crate) fn set_status(&self, status: Status) {
        self.status.send_replace(status);
    }

    /// Removes a dependency that can never stop (unknown name).
    pub(crate) fn forget_dependency(&self, name: &str) {
        self.waiting.send_if_modified(|pending| pending.remove(name));
    }

    async fn execute(
        &self,
        interpreter: &dyn Interpreter,
        token: CancellationToken,
    ) -> Result<(), CommandError> {
        if token.is_cancelled() {
            return Err(CommandError::Canceled);
        }
        let overrides = &self.spec.environs;
        let ambient = |key: &str| std::env::var(key).ok();

        let line = command::expand(&self.spec.command, overrides, ambient);
        let script = interpreter.parse(&line)?;

        let cwd = command::expand(&self.spec.cwd, overrides, ambient);
        let invocation = Invocation {
            cwd: (!cwd.trim().is_empty()).then(|| PathBuf::from(cwd)),
            env: command::effective_env(overrides),
            stdout: Arc::new(LogSink::new(self.name(), Stream::Stdout)),
            stderr: Arc::new(LogSink::new(self.name(), Stream::Stderr)),
        };
        debug!(service = %self.name(), command = %line, "executing");
        interpreter.execute(script, invocation, token).await
    }

    fn report_unknown(&self, core: &Supervisor, hook: HookKind, target: &str, reason: &str) {
        warn!(service = %self.name(), %hook, target, reason, "hook target skipped");
        core.bus().publish(
            Event::new(EventKind::HookTargetUnknown)
                .with_service(self.name())
                .with_reason(target),
        );
    }

    fn token_slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.cancel.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Observe for Process {
    fn on_status(&self, snapshot: &StatusSnapshot) {
        self.waiting.send_if_modified(|pending| {
            let before = pending.len();
            pending.retain(|dep| snapshot.stopped.binary_search(dep).is_err());
            pending.len() != before
        });
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("name", &self.name())
            .field("status", &self.status())
            .field("pending", &self.pending())
            .field("sub_service", &self.is_sub_service())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Script, ShellInterpreter};
    use async_trait::async_trait;
    use std::time::Duration;

    fn snapshot_with_stopped(names: &[&str]) -> StatusSnapshot {
        let mut stopped: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        stopped.sort();
        StatusSnapshot {
            stopped,
            ..StatusSnapshot::default()
        }
    }

    #[test]
    fn live_wait_set_shrinks_without_touching_spec() {
        let proc = Process::new(ServiceSpec::new("b", "true").with_hook(HookKind::Wait, ["a", "c"]));
        proc.on_status(&snapshot_with_stopped(&["a", "x"]));
        assert_eq!(proc.pending(), vec!["c"]);
        assert_eq!(proc.spec().hooks.wait, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn waiter_wakes_when_last_dependency_stops() {
        let proc = Arc::new(Process::new(
            ServiceSpec::new("b", "true").with_hook(HookKind::Wait, ["a"]),
        ));
        let waiter = tokio::spawn({
            let proc = proc.clone();
            async move { proc.wait_for_dependencies().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        proc.on_status(&snapshot_with_stopped(&["a"]));
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .unwrap();
    }

    #[test]
    fn cancel_without_handle_is_noop() {
        let proc = Process::new(ServiceSpec::new("a", "true"));
        proc.cancel();
        proc.cancel();
        assert!(!proc.is_armed());
    }

    #[test]
    fn claim_is_exclusive_until_released() {
        let proc = Process::new(ServiceSpec::new("a", "true"));
        assert!(proc.try_claim());
        assert!(!proc.try_claim());
        proc.release();
        assert!(proc.try_claim());
    }

    #[derive(Default)]
    struct Echo {
        lines: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Interpreter for Echo {
        fn parse(&self, line: &str) -> Result<Script, CommandError> {
            Ok(Script::new(line, vec![line.to_string()]))
        }

        async fn execute(
            &self,
            script: Script,
            invocation: Invocation,
            _cancel: CancellationToken,
        ) -> Result<(), CommandError> {
            self.lines.lock().unwrap().push(script.source().to_string());
            match invocation.cwd {
                Some(dir) if dir == PathBuf::from("/srv/api") => Ok(()),
                other => Err(CommandError::Spawn {
                    error: format!("unexpected cwd {other:?}"),
                }),
            }
        }
    }

    #[tokio::test]
    async fn run_expands_command_and_cwd() {
        let proc = Process::new(
            ServiceSpec::new("api", "serve --port ${PORT} ${UNSET_PROCVISOR_VAR}")
                .with_cwd("/srv/${APP}")
                .with_env("PORT", "8080")
                .with_env("APP", "api"),
        );
        let echo = Echo::default();
        proc.run(&echo).await.unwrap();
        assert!(!proc.is_armed());
        assert_eq!(
            *echo.lines.lock().unwrap(),
            vec!["serve --port 8080 ${UNSET_PROCVISOR_VAR}"]
        );
    }

    #[tokio::test]
    async fn pre_cancelled_run_never_spawns() {
        let proc = Process::new(ServiceSpec::new("a", "sleep 5"));
        proc.arm();
        proc.cancel();
        let res = proc.run(&ShellInterpreter::default()).await;
        assert!(matches!(res, Err(CommandError::Canceled)));
    }

    #[tokio::test]
    async fn syntax_error_surfaces_from_run() {
        let proc = Process::new(ServiceSpec::new("a", "echo 'unterminated"));
        let res = proc.run(&ShellInterpreter::default()).await;
        assert!(matches!(res, Err(CommandError::Syntax { .. })));
    }
}
