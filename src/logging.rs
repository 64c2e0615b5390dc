//! # Log output for the CLI.
//!
//! Installs a `tracing-subscriber` formatter once per process. Library code
//! only emits `tracing` events; embedding applications bring their own
//! subscriber instead of calling [`init`].

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when neither a level nor `RUST_LOG` is given.
pub const DEFAULT_FILTER: &str = "info";

/// Builds the filter: explicit `level` first, then `RUST_LOG`, then [`DEFAULT_FILTER`].
pub fn filter(level: Option<&str>) -> Result<EnvFilter> {
    match level {
        Some(level) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log filter {level:?}")),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

/// Initialises the global subscriber with timestamps and levels.
///
/// Fails on an invalid filter or if a global subscriber is already set.
pub fn init(level: Option<&str>) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .compact();

    tracing_subscriber::registry()
        .with(filter(level)?)
        .with(fmt_layer)
        .try_init()
        .context("logger already initialised")?;
    Ok(())
}
