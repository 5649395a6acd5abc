use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancels `cancellation` on Ctrl-C. The browser usually stops the host by closing stdin
/// instead, which the event loop notices on its own.
pub async fn detect_shutdown(cancellation: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received Ctrl-C, shutting down"),
                Err(e) => error!("Failed to listen for Ctrl-C {e:?}"),
            }
            cancellation.cancel();
        },
        _ = cancellation.cancelled() => {},
    };
}
