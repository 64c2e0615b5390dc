//! # `Subscribe`: asynchronous event listeners.
//!
//! Implement [`Subscribe`] to follow what the supervisor does (dashboards,
//! audit trails, test probes). Each implementation gets its own worker and a
//! bounded queue inside the [`SubscriberSet`](crate::SubscriberSet), so a slow
//! listener only ever delays itself; when its queue is full, new events for it
//! are discarded and a `SubscriberOverflow` event reports the loss.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use procvisor::{Event, EventKind, Subscribe};
//!
//! struct CascadeAlarm;
//!
//! #[async_trait]
//! impl Subscribe for CascadeAlarm {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::CascadeTriggered {
//!             eprintln!("fleet going down because of {:?}", ev.service);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "cascade-alarm"
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Queue size used when a subscriber does not pick one.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Listener for supervisor events.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes one event. Events arrive in publication order.
    async fn on_event(&self, event: &Event);

    /// Label used in logs and overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Bound of this subscriber's queue (values below 1 are raised to 1).
    fn queue_capacity(&self) -> usize {
        DEFAULT_QUEUE_CAPACITY
    }
}
