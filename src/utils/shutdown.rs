use eyre::{Result, WrapErr};
use tokio::{signal, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// Which OS signal ended the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
pub async fn wait_for_signal() -> Result<ShutdownSignal> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal as unix_signal};
        let mut sigterm =
            unix_signal(SignalKind::terminate()).wrap_err("failed to register SIGTERM handler")?;

        tokio::select! {
            res = signal::ctrl_c() => {
                res.wrap_err("failed to listen for SIGINT")?;
                Ok(ShutdownSignal::Interrupt)
            }
            _ = sigterm.recv() => Ok(ShutdownSignal::Terminate),
        }
    }

    #[cfg(not(unix))]
    {
        // On non-Unix systems, we only have Ctrl+C
        signal::ctrl_c()
            .await
            .wrap_err("failed to listen for Ctrl+C")?;
        Ok(ShutdownSignal::Interrupt)
    }
}

/// Cancel `token` on the first shutdown signal.
///
/// The task also ends when the token is cancelled by someone else.
pub fn spawn_signal_handler(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!("Signal handler started. Listening for SIGTERM and SIGINT");
        tokio::select! {
            received = wait_for_signal() => match received {
                Ok(signal) => {
                    tracing::info!(?signal, "shutdown signal received");
                    token.cancel();
                }
                Err(e) => tracing::error!(error = %e, "signal handler failed"),
            },
            () = token.cancelled() => {}
        }
    })
}
