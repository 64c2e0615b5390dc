//! Error types used by the procvisor runtime and its collaborators.
//!
//! This module defines four error enums:
//!
//! - [`ConfigError`] - loading or validating the services file failed.
//! - [`CommandError`] - a single service command failed to parse, spawn or finish cleanly.
//! - [`RegistryError`] - a registry lookup or status transition was rejected.
//! - [`RuntimeError`] - the outcome of a whole supervised run.
//!
//! All of them provide `as_label` for logs.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::events::Status;

/// # Errors produced while loading the services file.
///
/// Always fatal: the supervisor never starts with a configuration it could not load.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config {path:?}: {source}")]
    Io {
        /// Path that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML or does not match the services schema.
    #[error("cannot parse config {path:?}: {source}")]
    Parse {
        /// Path that was requested.
        path: PathBuf,
        /// Underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },

    /// The file parsed but describes an unusable fleet.
    #[error("invalid config: {reason}")]
    Invalid {
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "config_io",
            ConfigError::Parse { .. } => "config_parse",
            ConfigError::Invalid { .. } => "config_invalid",
        }
    }
}

/// # Errors produced by one execution of a service command.
///
/// [`CommandError::Canceled`] is the outcome of a requested stop and is never
/// treated as a reportable failure.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CommandError {
    /// The command line could not be parsed.
    #[error("syntax error: {error}")]
    Syntax {
        /// Parser message.
        error: String,
    },

    /// The command could not be started.
    #[error("spawn failed: {error}")]
    Spawn {
        /// Underlying message (usually an I/O error).
        error: String,
    },

    /// The command exited with a non-zero status.
    #[error("exit status {code}")]
    Exit {
        /// Exit code reported by the OS.
        code: i32,
    },

    /// The command was killed by a signal it did not ask for.
    #[error("terminated by signal {signal}")]
    Signaled {
        /// Signal number.
        signal: i32,
    },

    /// The command was cancelled by the supervisor.
    #[error("cancelled")]
    Canceled,

    /// The task driving the command panicked.
    #[error("task panicked: {info}")]
    Panicked {
        /// Panic payload, when it was a string.
        info: String,
    },
}

impl CommandError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use procvisor::CommandError;
    ///
    /// let err = CommandError::Exit { code: 1 };
    /// assert_eq!(err.as_label(), "command_exit");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            CommandError::Syntax { .. } => "command_syntax",
            CommandError::Spawn { .. } => "command_spawn",
            CommandError::Exit { .. } => "command_exit",
            CommandError::Signaled { .. } => "command_signaled",
            CommandError::Canceled => "command_canceled",
            CommandError::Panicked { .. } => "command_panicked",
        }
    }

    /// True when the error is the direct result of a requested stop.
    pub fn is_canceled(&self) -> bool {
        matches!(self, CommandError::Canceled)
    }
}

/// # Errors produced by the process registry.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No partition holds a process with this name.
    #[error("unknown process {name:?}")]
    NotFound {
        /// Requested name.
        name: String,
    },

    /// A process with this name is already registered.
    #[error("process {name:?} is already registered")]
    AlreadyRegistered {
        /// Duplicate name.
        name: String,
    },

    /// A status transition outside the permitted state machine was requested.
    ///
    /// This always indicates a supervisor bug; the registry is left untouched.
    #[error("invalid transition for {name:?}: {from} -> {to}")]
    InvalidTransition {
        /// Process name.
        name: String,
        /// Status the process actually had.
        from: Status,
        /// Status that was requested.
        to: Status,
    },

    /// The `wait` hooks form a cycle, so none of its members could ever start.
    #[error("wait hooks form a cycle: {}", cycle.join(" -> "))]
    DependencyCycle {
        /// Names along the cycle, first name repeated at the end.
        cycle: Vec<String>,
    },
}

impl RegistryError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::NotFound { .. } => "registry_not_found",
            RegistryError::AlreadyRegistered { .. } => "registry_already_registered",
            RegistryError::InvalidTransition { .. } => "registry_invalid_transition",
            RegistryError::DependencyCycle { .. } => "registry_dependency_cycle",
        }
    }
}

/// # Outcome errors of a supervised run.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A service failed without being exempted and brought the fleet down.
    #[error("service {service:?} failed ({error}); fleet was shut down")]
    Escalated {
        /// Service whose failure triggered the cascade.
        service: String,
        /// Its error.
        #[source]
        error: CommandError,
    },

    /// Tasks were still alive `grace` after termination was requested.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Processes still in the running partition.
        stuck: Vec<String>,
    },

    /// `run` was called more than once on the same supervisor.
    #[error("supervisor already ran")]
    AlreadyRan,

    /// The registry rejected the fleet while building the supervisor.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use procvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Escalated { .. } => "runtime_escalated",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::AlreadyRan => "runtime_already_ran",
            RuntimeError::Registry(e) => e.as_label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_path() {
        let err = RegistryError::DependencyCycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "wait hooks form a cycle: a -> b -> a");
    }

    #[test]
    fn transition_message_names_statuses() {
        let err = RegistryError::InvalidTransition {
            name: "web".into(),
            from: Status::Stopped,
            to: Status::Running,
        };
        assert_eq!(
            err.to_string(),
            "invalid transition for \"web\": stopped -> running"
        );
    }

    #[test]
    fn only_cancellation_is_canceled() {
        assert!(CommandError::Canceled.is_canceled());
        assert!(!CommandError::Exit { code: 2 }.is_canceled());
        assert!(!CommandError::Signaled { signal: 9 }.is_canceled());
    }
}
