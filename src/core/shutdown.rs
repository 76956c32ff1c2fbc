use tokio::signal;
use tokio::sync::watch;

pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

/// Watch channel flipped to `true` once a shutdown signal arrives.
///
/// Long-lived tasks (live channels, sweep loops) hold a receiver and exit
/// their loops when it changes; the server future awaits the returned signal.
pub(crate) fn shutdown_channel() -> (watch::Receiver<bool>, impl std::future::Future<Output = ()>) {
    let (tx, rx) = watch::channel(false);
    let signal = async move {
        shutdown_signal().await;
        if tx.send(true).is_err() {
            tracing::debug!("No shutdown listeners left");
        }
    };
    (rx, signal)
}
