//! # Event subscribers for the procvisor runtime.
//!
//! This module provides the [`Subscribe`] trait and the [`SubscriberSet`]
//! fan-out that feeds every subscriber from the [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Registry / Supervisor ── publish(Event) ──► Bus ──► subscriber_listener
//!                                                          │
//!                                                   SubscriberSet::emit
//!                                                ┌─────────┼─────────┐
//!                                                ▼         ▼         ▼
//!                                             worker1   worker2   workerN
//!                                                ▼         ▼         ▼
//!                                           sub1.on   sub2.on   subN.on
//!                                            _event()  _event()  _event()
//! ```
//!
//! Subscribers are for observability and integrations (dashboards, audit,
//! tests). The supervision engine itself never depends on them.

mod set;
mod subscribe;

pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
