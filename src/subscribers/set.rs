//! # SubscriberSet: one queue and one worker per subscriber.
//!
//! ```text
//! emit(Arc<Event>) ──try_send──► [queue 1] ──► worker 1 ──► sub1.on_event
//!                  ──try_send──► [queue 2] ──► worker 2 ──► sub2.on_event
//!                  ...
//! full / closed queue  ─► Bus.publish(SubscriberOverflow)
//! panic in on_event    ─► warn! + Bus.publish(SubscriberPanicked), worker keeps going
//! ```
//!
//! `emit` never waits. Each subscriber sees events in the order they were
//! emitted; there is no ordering between different subscribers.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

struct Worker {
    name: &'static str,
    queue: mpsc::Sender<Arc<Event>>,
    handle: JoinHandle<()>,
}

/// Fan-out of events to user subscribers.
pub struct SubscriberSet {
    workers: Vec<Worker>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns a worker per subscriber; must run inside a tokio runtime.
    ///
    /// `bus` receives the overflow and panic reports.
    #[must_use]
    pub fn new(subscribers: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let workers = subscribers
            .into_iter()
            .map(|sub| Self::spawn_worker(sub, bus.clone()))
            .collect();
        Self { workers, bus }
    }

    fn spawn_worker(sub: Arc<dyn Subscribe>, bus: Bus) -> Worker {
        let name = sub.name();
        let (queue, mut inbox) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
        let handle = tokio::spawn(async move {
            while let Some(event) = inbox.recv().await {
                let outcome = AssertUnwindSafe(sub.on_event(&event)).catch_unwind().await;
                if let Err(payload) = outcome {
                    let info = panic_message(payload.as_ref());
                    warn!(subscriber = name, %info, "subscriber panicked");
                    bus.publish(Event::subscriber_panicked(name, info));
                }
            }
        });
        Worker {
            name,
            queue,
            handle,
        }
    }

    /// Queues `event` for every subscriber without waiting.
    ///
    /// A subscriber whose queue is full or closed misses the event; that loss is
    /// published as `SubscriberOverflow` (never for an overflow event itself).
    pub fn emit(&self, event: Arc<Event>) {
        let reportable = event.kind != EventKind::SubscriberOverflow;
        for worker in &self.workers {
            let reason = match worker.queue.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(TrySendError::Full(_)) => "full",
                Err(TrySendError::Closed(_)) => "closed",
            };
            if reportable {
                self.bus.publish(Event::subscriber_overflow(worker.name, reason));
            }
        }
    }

    /// Closes every queue and waits until the workers have drained them.
    pub async fn close(self) {
        let mut handles = Vec::with_capacity(self.workers.len());
        for Worker { queue, handle, .. } in self.workers {
            drop(queue);
            handles.push(handle);
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// True if there are no subscribers.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
