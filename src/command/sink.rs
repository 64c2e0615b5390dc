//! Destinations for command output lines.

use std::sync::Arc;

use tracing::{info, warn};

/// Which standard stream a sink receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Receives a command's output one line at a time (trailing newline stripped).
pub trait OutputSink: Send + Sync + 'static {
    /// Consumes one line.
    fn line(&self, line: &str);
}

/// Name-tagged sink writing to the log: stdout at INFO, stderr at WARN.
#[derive(Debug, Clone)]
pub struct LogSink {
    service: Arc<str>,
    stream: Stream,
}

impl LogSink {
    /// Creates a sink for `service`'s `stream`.
    pub fn new(service: impl Into<Arc<str>>, stream: Stream) -> Self {
        Self {
            service: service.into(),
            stream,
        }
    }

    /// The service this sink is tagged with.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The stream this sink receives.
    pub fn stream(&self) -> Stream {
        self.stream
    }
}

impl OutputSink for LogSink {
    fn line(&self, line: &str) {
        match self.stream {
            Stream::Stdout => info!(service = %self.service, "{line}"),
            Stream::Stderr => warn!(service = %self.service, "{line}"),
        }
    }
}
