//! # Command interpreter collaborator.
//!
//! Everything needed to turn a service's command line into a running OS
//! process and back into a terminal result:
//! - [`Interpreter`] - parse/execute seam used by [`Process::run`](crate::Process::run)
//! - [`ShellInterpreter`] - default implementation over `sh -c`
//! - [`OutputSink`], [`LogSink`] - where command output lines go
//! - [`expand`], [`effective_env`] - `${NAME}` expansion and environment merging
//!
//! ## Flow
//! ```text
//! ServiceSpec.command ──► expand() ──► Interpreter::parse() ──► Script
//!                                                                  │
//! Invocation { cwd, env, stdout, stderr } ──► Interpreter::execute(script, inv, cancel)
//!                                                                  │
//!                                        Ok(()) | Err(CommandError::{Exit, Signaled, Canceled, ...})
//! ```

mod expand;
mod interpreter;
mod shell;
mod sink;

pub use expand::{effective_env, expand};
pub use interpreter::{Interpreter, Invocation, Script};
pub use shell::ShellInterpreter;
pub use sink::{LogSink, OutputSink, Stream};
