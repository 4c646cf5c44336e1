//! # Termination signals as a checkable condition.
//!
//! [`install`] turns asynchronous SIGINT/SIGTERM delivery into a
//! [`CancellationToken`] the receive loop can `select!` on, so signal
//! arrival interrupts the blocking receive instead of killing the process
//! mid-operation.

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Spawns the signal listener and returns the token it cancels.
///
/// Must be called from within a tokio runtime.
pub(crate) fn install() -> CancellationToken {
    let token = CancellationToken::new();
    let signalled = token.clone();
    tokio::spawn(async move {
        if let Err(err) = wait_for_termination().await {
            error!(error = %err, "unable to register signal handlers");
            return;
        }
        info!("termination signal received");
        signalled.cancel();
    });
    token
}

/// Completes when the process receives a termination signal.
///
/// Each call creates independent signal listeners.
#[cfg(unix)]
async fn wait_for_termination() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_termination() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
