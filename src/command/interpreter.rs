//! # Interpreter seam.
//!
//! The supervision engine treats command execution as an opaque collaborator:
//! it hands over a parsed [`Script`], an [`Invocation`] (directory, environment,
//! output sinks) and a [`CancellationToken`], and gets back a terminal result.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::command::OutputSink;
use crate::error::CommandError;

/// Executable form of a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    source: String,
    words: Vec<String>,
}

impl Script {
    /// Wraps an already validated command line and its words.
    pub fn new(source: impl Into<String>, words: Vec<String>) -> Self {
        Self {
            source: source.into(),
            words,
        }
    }

    /// The (expanded) command line as given to the shell.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Shell words of the command line, quotes removed.
    pub fn words(&self) -> &[String] {
        &self.words
    }
}

/// Everything an execution needs besides the script.
#[derive(Clone)]
pub struct Invocation {
    /// Working directory (`None` = inherit the supervisor's).
    pub cwd: Option<PathBuf>,
    /// Complete environment for the child (not merged again).
    pub env: BTreeMap<OsString, OsString>,
    /// Receives standard output lines.
    pub stdout: Arc<dyn OutputSink>,
    /// Receives standard error lines.
    pub stderr: Arc<dyn OutputSink>,
}

/// Parses and executes command lines.
///
/// # Contract
/// - `execute` returns when the command exits on its own or, after `cancel`
///   fires, once it has been terminated.
/// - A run ended by `cancel` returns `Err(CommandError::Canceled)`; callers
///   rely on that to tell requested stops from failures.
#[async_trait]
pub trait Interpreter: Send + Sync + 'static {
    /// Validates a command line and turns it into a [`Script`].
    fn parse(&self, line: &str) -> Result<Script, CommandError>;

    /// Runs `script` until it finishes or `cancel` fires.
    async fn execute(
        &self,
        script: Script,
        invocation: Invocation,
        cancel: CancellationToken,
    ) -> Result<(), CommandError>;
}
