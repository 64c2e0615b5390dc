//! # Supervisor: drives the fleet, escalates failures, and shuts down gracefully.
//!
//! The [`Supervisor`] owns the registry, the event bus, a [`SubscriberSet`] and
//! the interpreter. It launches one task per process, routes failures to a
//! single error loop, and routes every termination request through a single
//! terminator loop.
//!
//! ## High-level architecture
//! ```text
//! run():
//!   subscriber_listener(): Bus.subscribe() ─► SubscriberSet::emit(Arc<Event>)
//!                          (drained and closed once the run ends)
//!   error loop      : errors_rx     ─► first failure ─► cascade
//!   terminator loop : terminate_rx  ─► terminate_names(names)
//!   launch(ready, non-sub-service processes)
//!
//! Per-process task:
//!   claim ─► (rearm if stopped) ─► wait dependencies ─► ready→running
//!        ─► Process::run ─► running→stopped ─► start hook ─► stop hook
//!        ─► failure routing ─► optional auto-restart after restart_delay
//!
//! Failure routing:
//!   Ok / Canceled                       → nothing
//!   ignore_failures or kill-hook target → FailureExempted
//!   otherwise                           → errors_tx ─► error loop
//!
//! Error loop:
//!   first failure → termination flag, CascadeTriggered, terminate(running + ready)
//!   later failure → FailureDropped
//!
//! Exit:
//!   all tasks done                            → Ok / Escalated
//!   termination requested + grace exceeded    → GraceExceeded
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use procvisor::{ServiceSpec, Supervisor, SupervisorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sup = Supervisor::builder(SupervisorConfig::default())
//!         .with_services([
//!             ServiceSpec::new("migrate", "./migrate.sh"),
//!             ServiceSpec::new("api", "./api").with_hook(procvisor::HookKind::Wait, ["migrate"]),
//!         ])
//!         .build()
//!         .await?;
//!
//!     sup.spawn_signal_observer();
//!     sup.run().await?;
//!     Ok(())
//! }
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::command::Interpreter;
use crate::config::SupervisorConfig;
use crate::core::{shutdown, Process, Registry, SupervisorBuilder};
use crate::error::{CommandError, RuntimeError};
use crate::events::{Bus, Event, EventKind, Status};
use crate::subscribers::{panic_message, SubscriberSet};

/// A failed run routed to the error loop.
///
/// `handled` fires once the loop has recorded the failure, so the reporting
/// task cannot finish before the outcome of `run` is decided.
#[derive(Debug)]
struct Failure {
    service: String,
    error: CommandError,
    handled: oneshot::Sender<()>,
}

type Trigger = Arc<Mutex<Option<(String, CommandError)>>>;

/// Coordinates process tasks, failure escalation, and graceful shutdown.
pub struct Supervisor {
    cfg: SupervisorConfig,
    registry: Arc<Registry>,
    interpreter: Arc<dyn Interpreter>,
    bus: Bus,
    subs: Mutex<Option<SubscriberSet>>,

    errors_tx: mpsc::Sender<Failure>,
    errors_rx: Mutex<Option<mpsc::Receiver<Failure>>>,
    terminate_tx: mpsc::UnboundedSender<Vec<String>>,
    terminate_rx: Mutex<Option<mpsc::UnboundedReceiver<Vec<String>>>>,

    terminating: CancellationToken,
    tracker: TaskTracker,
    trigger: Trigger,
    started: AtomicBool,
}

impl Supervisor {
    /// Starts building a supervisor.
    pub fn builder(cfg: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: SupervisorConfig,
        bus: Bus,
        subs: SubscriberSet,
        registry: Arc<Registry>,
        interpreter: Arc<dyn Interpreter>,
        fleet_size: usize,
    ) -> Self {
        let (errors_tx, errors_rx) = mpsc::channel(fleet_size.max(1));
        let (terminate_tx, terminate_rx) = mpsc::unbounded_channel();
        Self {
            cfg,
            registry,
            interpreter,
            bus,
            subs: Mutex::new(Some(subs)),
            errors_tx,
            errors_rx: Mutex::new(Some(errors_rx)),
            terminate_tx,
            terminate_rx: Mutex::new(Some(terminate_rx)),
            terminating: CancellationToken::new(),
            tracker: TaskTracker::new(),
            trigger: Arc::new(Mutex::new(None)),
            started: AtomicBool::new(false),
        }
    }

    /// Registry holding every process of the fleet.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Event bus shared by the registry and the supervisor.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Runtime configuration.
    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    /// True once a cascade or a shutdown has been requested.
    pub fn is_terminating(&self) -> bool {
        self.terminating.is_cancelled()
    }

    /// Runs the fleet until every task has finished.
    ///
    /// Returns [`RuntimeError::Escalated`] if a failure cascade brought the fleet
    /// down, [`RuntimeError::GraceExceeded`] if tasks outlived the grace period
    /// after termination was requested, and [`RuntimeError::AlreadyRan`] on a
    /// second call.
    pub async fn run(self: &Arc<Self>) -> Result<(), RuntimeError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(RuntimeError::AlreadyRan);
        }
        let (Some(errors_rx), Some(terminate_rx)) = (
            self.errors_rx.lock().await.take(),
            self.terminate_rx.lock().await.take(),
        ) else {
            return Err(RuntimeError::AlreadyRan);
        };

        let listener = CancellationToken::new();
        let forwarder = self.subscriber_listener(listener.clone()).await;
        self.spawn_error_loop(errors_rx);
        self.spawn_terminator_loop(terminate_rx);

        let initial: Vec<Arc<Process>> = self
            .registry
            .list_by_status(Status::Ready)
            .await
            .into_iter()
            .filter(|p| !p.is_sub_service())
            .collect();
        info!(services = initial.len(), "starting fleet");
        self.launch(initial);

        self.tracker.close();
        let outcome = tokio::select! {
            _ = self.tracker.wait() => Ok(()),
            _ = self.terminating.cancelled() => self.wait_with_grace().await,
        };

        listener.cancel();
        if let Some(forwarder) = forwarder {
            if tokio::time::timeout(self.cfg.grace, forwarder).await.is_err() {
                warn!("subscribers still draining, detaching");
            }
        }
        outcome?;

        if let Some((service, error)) = self.trigger.lock().await.take() {
            return Err(RuntimeError::Escalated { service, error });
        }
        info!("all services finished");
        Ok(())
    }

    /// Spawns one task per process; already-driven processes are skipped.
    pub fn launch(self: &Arc<Self>, processes: Vec<Arc<Process>>) {
        for proc in processes {
            if !proc.try_claim() {
                debug!(service = %proc.name(), "already launched, skipping");
                continue;
            }
            let me = Arc::clone(self);
            self.tracker.spawn(async move { me.supervise(proc).await });
        }
    }

    /// Graceful shutdown: sets the termination flag and stops every process.
    pub async fn shutdown(&self) {
        warn!("graceful shutdown");
        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.terminating.cancel();

        let names = self
            .registry
            .all_processes()
            .await
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        self.request_termination(names).await;
    }

    /// Submits names to the terminator loop.
    ///
    /// Before `run` (or after the loop is gone) the names are handled inline.
    pub async fn request_termination(&self, names: Vec<String>) {
        if names.is_empty() {
            return;
        }
        if !self.started.load(Ordering::Acquire) {
            terminate_names(&self.registry, &names).await;
            return;
        }
        if let Err(mpsc::error::SendError(names)) = self.terminate_tx.send(names) {
            terminate_names(&self.registry, &names).await;
        }
    }

    /// Terminates the named processes right away, bypassing the loop.
    pub async fn terminate_names(&self, names: &[String]) {
        terminate_names(&self.registry, names).await;
    }

    /// Spawns a task that calls [`shutdown`](Self::shutdown) on the first
    /// termination signal.
    ///
    /// Only a weak handle is kept, so the observer never extends the
    /// supervisor's lifetime.
    pub fn spawn_signal_observer(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            if let Err(e) = shutdown::wait_for_shutdown_signal().await {
                warn!(error = %e, "signal handlers unavailable");
                return;
            }
            if let Some(sup) = weak.upgrade() {
                sup.shutdown().await;
            }
        });
    }

    /// Subscribes to the bus and forwards events to the subscriber set.
    ///
    /// Once `stop` fires, the events already on the bus are forwarded and the
    /// set is closed, so subscribers see the end of the run before `run` returns.
    async fn subscriber_listener(&self, stop: CancellationToken) -> Option<JoinHandle<()>> {
        let set = self.subs.lock().await.take()?;
        if set.is_empty() {
            return None;
        }
        let mut rx = self.bus.subscribe();
        Some(tokio::spawn(async move {
            use tokio::sync::broadcast::error::{RecvError, TryRecvError};
            loop {
                tokio::select! {
                    biased;
                    res = rx.recv() => match res {
                        Ok(ev) => set.emit(ev),
                        Err(RecvError::Lagged(skipped)) => warn!(skipped, "subscriber listener lagged"),
                        Err(RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => break,
                }
            }
            loop {
                match rx.try_recv() {
                    Ok(ev) => set.emit(ev),
                    Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "subscriber listener lagged"),
                    Err(_) => break,
                }
            }
            set.close().await;
        }))
    }

    fn spawn_error_loop(&self, mut rx: mpsc::Receiver<Failure>) {
        let registry = Arc::clone(&self.registry);
        let terminate_tx = self.terminate_tx.clone();
        let terminating = self.terminating.clone();
        let trigger = Arc::clone(&self.trigger);
        let bus = self.bus.clone();

        tokio::spawn(async move {
            while let Some(failure) = rx.recv().await {
                let Failure {
                    service,
                    error,
                    handled,
                } = failure;
                if terminating.is_cancelled() {
                    warn!(%service, %error, "failure during shutdown, not escalated");
                    bus.publish(
                        Event::new(EventKind::FailureDropped)
                            .with_service(service.as_str())
                            .with_reason(error.to_string()),
                    );
                    let _ = handled.send(());
                    continue;
                }

                terminating.cancel();
                error!(%service, %error, label = error.as_label(), "service failed");
                warn!("shutting down all services");
                bus.publish(
                    Event::new(EventKind::CascadeTriggered)
                        .with_service(service.as_str())
                        .with_reason(error.to_string()),
                );

                let snapshot = registry.status().await;
                let names: Vec<String> = snapshot
                    .running
                    .iter()
                    .chain(snapshot.ready.iter())
                    .cloned()
                    .collect();
                *trigger.lock().await = Some((service, error));
                if let Err(mpsc::error::SendError(names)) = terminate_tx.send(names) {
                    terminate_names(&registry, &names).await;
                }
                let _ = handled.send(());
            }
        });
    }

    fn spawn_terminator_loop(&self, mut rx: mpsc::UnboundedReceiver<Vec<String>>) {
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            while let Some(names) = rx.recv().await {
                terminate_names(&registry, &names).await;
            }
        });
    }

    async fn wait_with_grace(&self) -> Result<(), RuntimeError> {
        let grace = self.cfg.grace;
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            return Ok(());
        }
        let stuck: Vec<String> = self.registry.status().await.running;
        error!(?grace, ?stuck, "grace exceeded");
        Err(RuntimeError::GraceExceeded { grace, stuck })
    }

    async fn supervise(self: Arc<Self>, proc: Arc<Process>) {
        let restart = match AssertUnwindSafe(self.drive(&proc)).catch_unwind().await {
            Ok(restart) => restart,
            Err(payload) => {
                self.recover(&proc, panic_message(payload.as_ref())).await;
                None
            }
        };
        proc.release();

        let Some(reason) = restart else { return };
        if self.is_terminating() {
            return;
        }
        let delay = self.cfg.restart_delay;
        info!(service = %proc.name(), ?delay, "restart scheduled");
        self.bus.publish(
            Event::new(EventKind::RestartScheduled)
                .with_service(proc.name())
                .with_reason(reason)
                .with_delay(delay),
        );

        let me = Arc::clone(&self);
        self.tracker.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => me.launch(vec![proc]),
                _ = me.terminating.cancelled() => {}
            }
        });
    }

    /// One pass of the per-process task body.
    ///
    /// Returns the failure text when the process asks for an auto-restart.
    async fn drive(self: &Arc<Self>, proc: &Arc<Process>) -> Option<String> {
        if proc.is_sub_service() {
            return None;
        }
        match proc.status() {
            Status::Ready => {}
            Status::Running => return None,
            Status::Stopped => {
                if self.is_terminating() {
                    return None;
                }
                if let Err(e) = self.registry.rearm(proc).await {
                    debug!(service = %proc.name(), error = %e, "relaunch skipped");
                    return None;
                }
            }
        }

        tokio::select! {
            biased;
            _ = self.terminating.cancelled() => {
                let _ = self.registry.retire(proc).await;
                return None;
            }
            _ = proc.left_ready() => return None,
            _ = proc.wait_for_dependencies() => {}
        }

        proc.arm();
        if self.is_terminating() {
            proc.disarm();
            let _ = self.registry.retire(proc).await;
            return None;
        }
        if let Err(e) = self.registry.update_status(proc, Status::Running).await {
            proc.disarm();
            debug!(service = %proc.name(), error = %e, "launch abandoned");
            return None;
        }

        let result = proc.run(self.interpreter.as_ref()).await;
        if let Err(e) = self.registry.mark_stopped(proc).await {
            error!(service = %proc.name(), error = %e, "stop transition rejected");
        }

        proc.on_start_hook(self).await;
        proc.on_stop_hook(self).await;

        let error = match result {
            Ok(()) => {
                debug!(service = %proc.name(), "exited cleanly");
                return None;
            }
            Err(e) if e.is_canceled() => return None,
            Err(e) => e,
        };

        let restart = proc.spec().auto_restart.then(|| error.to_string());
        self.report_failure(proc, error).await;
        restart
    }

    /// Puts a process whose task panicked back into a terminal state and
    /// reports the panic like any other failure. No restart follows.
    async fn recover(&self, proc: &Process, info: String) {
        error!(service = %proc.name(), %info, "service task panicked");
        proc.cancel();
        proc.disarm();
        match proc.status() {
            Status::Ready => {
                let _ = self.registry.retire(proc).await;
            }
            Status::Running => {
                let _ = self.registry.mark_stopped(proc).await;
            }
            Status::Stopped => {}
        }
        self.report_failure(proc, CommandError::Panicked { info }).await;
    }

    /// Routes a non-cancel failure: exempt ones are logged, the rest go to the
    /// error loop and are awaited until recorded.
    async fn report_failure(&self, proc: &Process, error: CommandError) {
        if proc.spec().ignore_failures || self.registry.is_permitted_to_be_killed(proc.name()).await {
            warn!(service = %proc.name(), %error, "failure ignored");
            self.bus.publish(
                Event::new(EventKind::FailureExempted)
                    .with_service(proc.name())
                    .with_reason(error.to_string()),
            );
        } else {
            let (handled, ack) = oneshot::channel();
            let failure = Failure {
                service: proc.name().to_string(),
                error,
                handled,
            };
            if self.errors_tx.send(failure).await.is_ok() {
                let _ = ack.await;
            } else {
                warn!(service = %proc.name(), "error loop gone, failure dropped");
            }
        }
    }
}

/// Stops each named process according to its current partition.
///
/// - ready: retired without launching
/// - running: command cancelled, then marked stopped
/// - stopped: nothing to do
/// - unknown: logged and skipped
pub(crate) async fn terminate_names(registry: &Registry, names: &[String]) {
    for name in names {
        let (proc, status) = match registry.get_process(name).await {
            Ok(found) => found,
            Err(e) => {
                warn!(service = %name, error = %e, "cannot terminate");
                continue;
            }
        };
        match status {
            Status::Stopped => {}
            Status::Ready => match registry.retire(&proc).await {
                Ok(()) => {}
                // Launched between lookup and retire.
                Err(_) if proc.status() == Status::Running => stop_running(registry, &proc).await,
                Err(e) => debug!(service = %name, error = %e, "retire skipped"),
            },
            Status::Running => stop_running(registry, &proc).await,
        }
    }
}

async fn stop_running(registry: &Registry, proc: &Process) {
    proc.cancel();
    if let Err(e) = registry.mark_stopped(proc).await {
        debug!(service = %proc.name(), error = %e, "stop skipped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Invocation, Script, ShellInterpreter};
    use crate::events::{Observe, StatusSnapshot};
    use crate::services::{HookKind, ServiceSpec};
    use crate::subscribers::Subscribe;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    fn cfg() -> SupervisorConfig {
        SupervisorConfig {
            restart_delay: Duration::from_millis(20),
            kill_grace: Duration::from_secs(1),
            grace: Duration::from_secs(10),
            ..SupervisorConfig::default()
        }
    }

    async fn fleet(specs: Vec<ServiceSpec>) -> Arc<Supervisor> {
        Supervisor::builder(cfg())
            .with_services(specs)
            .build()
            .await
            .unwrap()
    }

    async fn run_bounded(sup: &Arc<Supervisor>) -> Result<(), RuntimeError> {
        tokio::time::timeout(Duration::from_secs(20), sup.run())
            .await
            .expect("run finished")
    }

    fn file_lines(path: &std::path::Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failure_after_dependency_cancels_the_fleet() {
        let sup = fleet(vec![
            ServiceSpec::new("A", "true"),
            ServiceSpec::new("B", "false").with_hook(HookKind::Wait, ["A"]),
            ServiceSpec::new("C", "sleep 5"),
        ])
        .await;

        let started = Instant::now();
        let err = run_bounded(&sup).await.unwrap_err();

        match err {
            RuntimeError::Escalated { service, error } => {
                assert_eq!(service, "B");
                assert!(matches!(error, CommandError::Exit { code: 1 }));
            }
            other => panic!("unexpected: {other}"),
        }
        assert!(started.elapsed() < Duration::from_secs(4));
        let snap = sup.registry().status().await;
        assert_eq!(snap.stopped, vec!["A", "B", "C"]);
        assert!(snap.ready.is_empty() && snap.running.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cascade_retires_waiting_processes() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("c-ran");
        let sup = fleet(vec![
            ServiceSpec::new("a", "sleep 10"),
            ServiceSpec::new("b", "sleep 0.2; exit 1"),
            ServiceSpec::new("c", format!("touch {}", marker.display()))
                .with_hook(HookKind::Wait, ["a"]),
        ])
        .await;

        let err = run_bounded(&sup).await.unwrap_err();
        assert_eq!(err.as_label(), "runtime_escalated");
        assert!(!marker.exists());
        assert_eq!(sup.registry().status().await.stopped, vec!["a", "b", "c"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn waiter_starts_after_dependency_stops() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("order");
        let sup = fleet(vec![
            ServiceSpec::new("a", format!("sleep 0.2; echo a >> {}", log.display())),
            ServiceSpec::new("b", format!("echo b >> {}", log.display()))
                .with_hook(HookKind::Wait, ["a"]),
        ])
        .await;

        run_bounded(&sup).await.unwrap();
        assert_eq!(file_lines(&log), vec!["a", "b"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn kill_hook_target_failure_is_exempt() {
        let sup = fleet(vec![
            ServiceSpec::new("a", "sleep 0.3").with_hook(HookKind::Kill, ["b"]),
            ServiceSpec::new("b", "exit 1"),
        ])
        .await;
        let mut rx = sup.bus().subscribe();

        run_bounded(&sup).await.unwrap();

        let mut exempted = false;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::FailureExempted {
                exempted = ev.service.as_deref() == Some("b");
            }
            assert_ne!(ev.kind, EventKind::CascadeTriggered);
        }
        assert!(exempted);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ignore_failures_never_escalates() {
        let sup = fleet(vec![
            ServiceSpec::new("flaky", "exit 7").with_ignore_failures(true),
            ServiceSpec::new("steady", "sleep 0.2"),
        ])
        .await;
        run_bounded(&sup).await.unwrap();
        assert_eq!(sup.registry().status().await.stopped, vec!["flaky", "steady"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_failures_trigger_one_cascade() {
        let sup = fleet(vec![
            ServiceSpec::new("x", "sleep 0.1; exit 1"),
            ServiceSpec::new("y", "sleep 0.1; exit 2"),
            ServiceSpec::new("z", "sleep 0.1; exit 3"),
            ServiceSpec::new("long", "sleep 10"),
        ])
        .await;
        let mut rx = sup.bus().subscribe();

        let err = run_bounded(&sup).await.unwrap_err();
        assert_eq!(err.as_label(), "runtime_escalated");

        let mut cascades = 0;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::CascadeTriggered {
                cascades += 1;
            }
        }
        assert_eq!(cascades, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_hook_terminates_and_is_idempotent() {
        let sup = fleet(vec![
            ServiceSpec::new("server", "sleep 10"),
            ServiceSpec::new("client", "sleep 0.2").with_hook(HookKind::Stop, ["server", "ghost"]),
        ])
        .await;

        let started = Instant::now();
        run_bounded(&sup).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));

        sup.terminate_names(&["server".to_string(), "server".to_string()]).await;
        assert_eq!(sup.registry().status().await.stopped, vec!["client", "server"]);
    }

    #[derive(Default)]
    struct Transitions(AtomicUsize);

    impl Observe for Transitions {
        fn on_status(&self, _snapshot: &StatusSnapshot) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn terminating_a_stopped_process_changes_nothing() {
        let seen = Arc::new(Transitions::default());
        let sup = Supervisor::builder(cfg())
            .with_services([ServiceSpec::new("x", "true")])
            .with_observer(seen.clone())
            .build()
            .await
            .unwrap();
        run_bounded(&sup).await.unwrap();

        let before = seen.0.load(Ordering::SeqCst);
        let mut rx = sup.bus().subscribe();
        for _ in 0..3 {
            sup.terminate_names(&["x".to_string()]).await;
        }

        assert_eq!(seen.0.load(Ordering::SeqCst), before);
        assert!(rx.try_recv().is_err());
        assert_eq!(sup.registry().status().await.stopped, vec!["x"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn terminating_a_ready_process_never_launches_it() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let sup = fleet(vec![ServiceSpec::new("a", format!("touch {}", marker.display()))]).await;
        let mut rx = sup.bus().subscribe();

        sup.terminate_names(&["a".to_string()]).await;
        assert_eq!(sup.registry().status().await.stopped, vec!["a"]);

        run_bounded(&sup).await.unwrap();
        assert!(!marker.exists());
        while let Ok(ev) = rx.try_recv() {
            assert_ne!(ev.kind, EventKind::ProcessRunning);
        }
    }

    #[tokio::test]
    async fn termination_wins_over_satisfied_dependencies() {
        for _ in 0..32 {
            let sup = fleet(vec![ServiceSpec::new("a", "true")]).await;
            let mut rx = sup.bus().subscribe();
            let (proc, _) = sup.registry().get_process("a").await.unwrap();
            sup.terminating.cancel();

            assert_eq!(sup.drive(&proc).await, None);
            assert_eq!(proc.status(), Status::Stopped);
            while let Ok(ev) = rx.try_recv() {
                assert_ne!(ev.kind, EventKind::ProcessRunning);
            }
        }
    }

    struct Exploding;

    #[async_trait]
    impl Interpreter for Exploding {
        fn parse(&self, line: &str) -> Result<Script, CommandError> {
            Ok(Script::new(line, vec![line.to_string()]))
        }

        async fn execute(
            &self,
            script: Script,
            _invocation: Invocation,
            _cancel: CancellationToken,
        ) -> Result<(), CommandError> {
            if script.source() == "explode" {
                panic!("interpreter blew up");
            }
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panicking_task_stops_its_process_and_escalates() {
        let sup = Supervisor::builder(cfg())
            .with_services([
                ServiceSpec::new("bad", "explode"),
                ServiceSpec::new("good", "fine"),
            ])
            .with_interpreter(Arc::new(Exploding))
            .build()
            .await
            .unwrap();

        match run_bounded(&sup).await.unwrap_err() {
            RuntimeError::Escalated { service, error } => {
                assert_eq!(service, "bad");
                assert_eq!(error.as_label(), "command_panicked");
            }
            other => panic!("unexpected: {other}"),
        }
        let snap = sup.registry().status().await;
        assert_eq!(snap.stopped, vec!["bad", "good"]);
        let (bad, _) = sup.registry().get_process("bad").await.unwrap();
        assert!(!bad.is_armed());
        assert!(bad.try_claim());
    }

    #[derive(Default)]
    struct Recorder {
        kinds: Mutex<Vec<EventKind>>,
    }

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, event: &Event) {
            self.kinds.lock().await.push(event.kind);
        }
        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subscribers_see_the_whole_run_before_it_returns() {
        let rec = Arc::new(Recorder::default());
        let sup = Supervisor::builder(cfg())
            .with_services([ServiceSpec::new("a", "true")])
            .with_subscribers(vec![rec.clone()])
            .with_interpreter(Arc::new(ShellInterpreter::default()))
            .build()
            .await
            .unwrap();

        run_bounded(&sup).await.unwrap();

        let kinds = rec.kinds.lock().await;
        assert!(kinds.contains(&EventKind::ProcessRunning));
        assert_eq!(kinds.last(), Some(&EventKind::ProcessStopped));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sub_service_runs_only_through_start_hook() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("order");
        let sup = fleet(vec![
            ServiceSpec::new("main", format!("echo main >> {}", log.display()))
                .with_hook(HookKind::Start, ["helper", "ghost"]),
            ServiceSpec::new("helper", format!("echo helper >> {}", log.display()))
                .with_sub_service(true),
            ServiceSpec::new("dormant", format!("echo dormant >> {}", log.display()))
                .with_sub_service(true),
        ])
        .await;
        let mut rx = sup.bus().subscribe();

        run_bounded(&sup).await.unwrap();

        assert_eq!(file_lines(&log), vec!["main", "helper"]);
        let snap = sup.registry().status().await;
        assert_eq!(snap.ready, vec!["dormant"]);
        let (helper, _) = sup.registry().get_process("helper").await.unwrap();
        let (dormant, _) = sup.registry().get_process("dormant").await.unwrap();
        assert!(!helper.is_sub_service());
        assert!(dormant.is_sub_service());

        let mut unknown = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::HookTargetUnknown {
                unknown.push(ev.reason.as_deref().map(str::to_string));
            }
        }
        assert_eq!(unknown, vec![Some("ghost".to_string())]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn auto_restart_relaunches_until_success() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("count");
        let cmd = format!(
            "echo x >> {0}; [ $(wc -l < {0}) -ge 3 ]",
            counter.display()
        );
        let sup = fleet(vec![ServiceSpec::new("retry", cmd)
            .with_auto_restart(true)
            .with_ignore_failures(true)])
        .await;

        run_bounded(&sup).await.unwrap();
        assert_eq!(file_lines(&counter).len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_stops_everything() {
        let sup = fleet(vec![
            ServiceSpec::new("a", "sleep 10"),
            ServiceSpec::new("b", "sleep 10").with_hook(HookKind::Wait, ["a"]),
        ])
        .await;

        let stopper = Arc::clone(&sup);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            stopper.shutdown().await;
        });

        let started = Instant::now();
        run_bounded(&sup).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(sup.registry().status().await.stopped, vec!["a", "b"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_run_is_rejected() {
        let sup = fleet(vec![ServiceSpec::new("a", "true")]).await;
        run_bounded(&sup).await.unwrap();
        assert!(matches!(sup.run().await, Err(RuntimeError::AlreadyRan)));
    }

    #[tokio::test]
    async fn wait_cycle_fails_the_build() {
        let res = Supervisor::builder(cfg())
            .with_services([
                ServiceSpec::new("a", "true").with_hook(HookKind::Wait, ["b"]),
                ServiceSpec::new("b", "true").with_hook(HookKind::Wait, ["a"]),
            ])
            .build()
            .await;
        assert!(matches!(res, Err(RuntimeError::Registry(_))));
    }
}
