//! # Runtime events emitted by the registry and the supervisor.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Transition events**: a process moved between registry partitions
//! - **Supervision events**: failures, cascades, restarts, hook resolution
//! - **Subscriber events**: problems delivering events to user subscribers
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the
//! service name, reasons, and the registry snapshot taken with the transition.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Transition events are published after the registry lock is released, in the
//! order the transitions were applied for any single process.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use procvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RestartScheduled)
//!     .with_service("worker")
//!     .with_reason("exit status 1")
//!     .with_delay(Duration::from_millis(100));
//!
//! assert_eq!(ev.kind, EventKind::RestartScheduled);
//! assert_eq!(ev.service.as_deref(), Some("worker"));
//! assert_eq!(ev.delay_ms, Some(100));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use super::snapshot::StatusSnapshot;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Transition events ===
    /// Process moved `ready → running`.
    ///
    /// Sets `service`, `snapshot`.
    ProcessRunning,

    /// Process moved `running → stopped`.
    ///
    /// Sets `service`, `snapshot`.
    ProcessStopped,

    /// Process moved `ready → stopped` without ever being launched.
    ///
    /// Sets `service`, `snapshot`.
    ProcessRetired,

    /// Process moved `stopped → ready` ahead of a relaunch.
    ///
    /// Sets `service`, `snapshot`.
    ProcessRearmed,

    // === Supervision events ===
    /// A service failed but is exempted (`ignore_failures` or kill-hook target).
    ///
    /// Sets `service`, `reason`.
    FailureExempted,

    /// First escalating failure of the run: the fleet is being stopped.
    ///
    /// Sets `service`, `reason`.
    CascadeTriggered,

    /// An escalating failure arrived after termination was already underway.
    ///
    /// Sets `service`, `reason`.
    FailureDropped,

    /// External graceful shutdown requested (OS signal or explicit call).
    ShutdownRequested,

    /// An auto-restart relaunch was scheduled.
    ///
    /// Sets `service`, `delay_ms`, `reason` (last failure).
    RestartScheduled,

    /// A hook referenced a name the registry does not know.
    ///
    /// Sets `service` (hook owner), `reason` (missing name).
    HookTargetUnknown,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets `service` (subscriber name), `reason` (panic info).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets `service` (subscriber name), `reason`.
    SubscriberOverflow,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Service (or subscriber) the event is about, if applicable.
    pub service: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, missing names).
    pub reason: Option<Arc<str>>,
    /// Delay before a scheduled relaunch in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Registry snapshot taken together with a transition.
    pub snapshot: Option<Arc<StatusSnapshot>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            service: None,
            reason: None,
            delay_ms: None,
            snapshot: None,
        }
    }

    /// Attaches a service name.
    #[inline]
    pub fn with_service(mut self, service: impl Into<Arc<str>>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a relaunch delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a registry snapshot.
    #[inline]
    pub fn with_snapshot(mut self, snapshot: Arc<StatusSnapshot>) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_service(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_service(subscriber)
            .with_reason(info)
    }

    /// True for the four registry transition kinds.
    #[inline]
    pub fn is_transition(&self) -> bool {
        matches!(
            self.kind,
            EventKind::ProcessRunning
                | EventKind::ProcessStopped
                | EventKind::ProcessRetired
                | EventKind::ProcessRearmed
        )
    }
}
