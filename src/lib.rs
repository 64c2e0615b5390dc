//! # procvisor
//!
//! **procvisor** is a single-host supervisor for plain processes, in the
//! spirit of compose tools: a YAML file declares a fleet of shell services and
//! how they relate, and the supervisor launches, sequences, monitors and tears
//! them down.
//!
//! ## Architecture
//! ```text
//!   procvisor.yaml ──► services::load ──► BTreeMap<name, ServiceSpec>
//!                                                │
//!                                                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                       │
//! │  - Registry (ready / running / stopped + permit-to-kill set)      │
//! │  - error loop (first failure cascades, later ones are dropped)    │
//! │  - terminator loop (all stop requests funnel through it)          │
//! │  - Bus + SubscriberSet (events to user subscribers)               │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   ┌──────────┐       ┌──────────┐       ┌──────────┐
//!   │ Process  │       │ Process  │       │ Process  │   one task each
//!   │  wait ─► run ─► hooks      │  ...  │          │
//!   └────┬─────┘       └──────────┘       └──────────┘
//!        ▼
//!   Interpreter (sh -c, own process group, output → tracing)
//! ```
//!
//! ### Hooks
//! | Hook    | Effect when declared on service `S`                               |
//! |---------|-------------------------------------------------------------------|
//! | `wait`  | `S` starts only after every listed service has stopped            |
//! | `start` | listed services are launched when `S` stops                       |
//! | `stop`  | listed services are terminated when `S` stops                     |
//! | `kill`  | failures of listed services never bring the fleet down            |
//!
//! ### Failure handling
//! A failure of a service that neither sets `ignore_failures` nor appears in
//! some `kill` hook stops the whole fleet. Only the first such failure
//! escalates; the run then ends with [`RuntimeError::Escalated`].
//!
//! ## Example
//! ```rust
//! use procvisor::{HookKind, ServiceSpec, Supervisor, SupervisorConfig};
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sup = Supervisor::builder(SupervisorConfig::default())
//!         .with_services([
//!             ServiceSpec::new("prepare", "true"),
//!             ServiceSpec::new("serve", "echo serving").with_hook(HookKind::Wait, ["prepare"]),
//!         ])
//!         .build()
//!         .await?;
//!
//!     sup.run().await?;
//!     assert_eq!(sup.registry().status().await.stopped, vec!["prepare", "serve"]);
//!     Ok(())
//! }
//! ```

pub mod command;
mod config;
mod core;
mod error;
mod events;
pub mod logging;
pub mod services;
mod subscribers;

// ---- Public re-exports ----

pub use command::{Interpreter, ShellInterpreter};
pub use config::SupervisorConfig;
pub use core::{wait_for_shutdown_signal, Process, Registry, Supervisor, SupervisorBuilder};
pub use error::{CommandError, ConfigError, RegistryError, RuntimeError};
pub use events::{Bus, Event, EventKind, Observe, Status, StatusSnapshot};
pub use services::{HookKind, Hooks, ServiceSpec};
pub use subscribers::{Subscribe, SubscriberSet};
