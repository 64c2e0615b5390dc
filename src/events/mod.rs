//! Runtime events: status model, event types and broadcast bus.
//!
//! This module groups the **status data model** shared by the registry and its
//! observers, the **event** payloads, and the **bus** used to publish them.
//!
//! ## Contents
//! - [`Status`], [`StatusSnapshot`] registry partitions as seen by observers
//! - [`Observe`] synchronous status observer (registered with the registry)
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Registry` (transitions), `Supervisor` (cascade, shutdown,
//!   restarts, unknown hook targets), `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `Supervisor::subscriber_listener()` fans events out to the
//!   user's `SubscriberSet`.

mod bus;
mod event;
mod snapshot;

pub use bus::Bus;
pub use event::{Event, EventKind};
pub use snapshot::{Observe, Status, StatusSnapshot};
