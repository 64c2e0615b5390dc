//! # Event bus.
//!
//! [`Bus`] carries [`Event`]s from their producers (registry transitions,
//! supervisor decisions, subscriber workers) to any number of listeners.
//! Events travel as `Arc<Event>`, so a fan-out never copies the payload or
//! its snapshot.
//!
//! ```text
//! Registry ────┐
//! Supervisor ──┼──► Bus ──► forwarder ──► SubscriberSet ──► Subscribe impls
//! set workers ─┘       └──► direct receivers (tests, embedding code)
//! ```
//!
//! Delivery is best-effort: publishing never waits, a receiver that falls more
//! than `capacity` events behind loses the oldest ones, and events published
//! while nobody listens are gone. Wait-hook pruning never depends on the bus;
//! it runs through the registry's synchronous [`Observe`](super::Observe) pass.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable handle to the shared event channel.
#[derive(Clone, Debug)]
pub struct Bus {
    sender: broadcast::Sender<Arc<Event>>,
}

impl Bus {
    /// Creates a bus retaining at most `capacity` undelivered events (min 1).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Sends `event` to every current listener; silently dropped if there is none.
    pub fn publish(&self, event: Event) {
        if self.sender.receiver_count() > 0 {
            let _ = self.sender.send(Arc::new(event));
        }
    }

    /// Starts listening; only events published afterwards are received.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Event>> {
        self.sender.subscribe()
    }

    /// Number of live listeners.
    pub fn listeners(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn late_listeners_miss_earlier_events() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::ShutdownRequested));

        let mut rx = bus.subscribe();
        assert_eq!(bus.listeners(), 1);
        bus.publish(Event::new(EventKind::CascadeTriggered).with_service("b"));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::CascadeTriggered);
        assert_eq!(ev.service.as_deref(), Some("b"));
        assert!(rx.try_recv().is_err());
    }
}
