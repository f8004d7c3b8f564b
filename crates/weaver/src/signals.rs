//! Signal handling for graceful shutdown.

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Waits for SIGINT or SIGTERM (Ctrl+C on Windows)
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("📡 Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("📡 Received SIGTERM");
            }
        }
    }

    #[cfg(windows)]
    {
        signal::ctrl_c().await?;
        info!("📡 Received Ctrl+C");
    }

    Ok(())
}

/// A flag that flips to `true` once a shutdown signal arrives
pub fn shutdown_flag() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!("Failed to install signal handlers: {}", e);
            return;
        }
        info!("🛑 Shutdown signal received, finishing in-flight work...");
        let _ = tx.send(true);
    });
    rx
}
