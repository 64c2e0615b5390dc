//! # OS termination signals.
//!
//! [`wait_for_shutdown_signal`] resolves on the first interrupt or terminate
//! signal. The supervisor turns that into exactly one call to
//! [`Supervisor::shutdown`](crate::Supervisor::shutdown).
//!
//! | Platform | Signals                         |
//! |----------|---------------------------------|
//! | Unix     | `SIGINT`, `SIGTERM`, `SIGQUIT`  |
//! | other    | Ctrl-C                          |

use tracing::info;

/// Waits for `SIGINT`, `SIGTERM` or `SIGQUIT`.
///
/// Fails only if the signal handlers cannot be installed.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = quit.recv() => "SIGQUIT",
    };
    info!(signal = name, "termination signal received");
    Ok(())
}

/// Waits for Ctrl-C.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!(signal = "ctrl-c", "termination signal received");
    Ok(())
}
