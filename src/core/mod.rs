//! Runtime core: registry, process instances, and the supervisor.
//!
//! Internal modules:
//! - [`registry`]: status partitions, permit-to-kill set, ordered observer pass;
//! - [`process`]: per-service runtime state, command execution, hooks;
//! - [`supervisor`]: launching, failure escalation, termination, grace;
//! - [`builder`]: wires a fleet into a ready-to-run supervisor;
//! - [`shutdown`]: OS termination signals.

mod builder;
mod process;
mod registry;
mod shutdown;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use process::Process;
pub use registry::Registry;
pub use shutdown::wait_for_shutdown_signal;
pub use supervisor::Supervisor;
