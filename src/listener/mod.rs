//! Out-of-band callback listeners
//!
//! Both listeners share the same contract: accept anything, answer every
//! well-formed interaction identically whether or not the token is known,
//! and persist only callbacks whose token matches a recorded injection.

pub mod dns_server;
pub mod http_server;

use tokio::sync::watch;

/// Receiver half of the shared shutdown signal. Long-running loops select
/// on it between accepts; in-flight handlers finish, no new work starts.
pub type ShutdownRx = watch::Receiver<bool>;

/// Creates a shutdown channel pair. Send `true` to stop all listeners.
pub fn shutdown_channel() -> (watch::Sender<bool>, ShutdownRx) {
    watch::channel(false)
}

/// Installs a Ctrl-C handler that flips the shutdown signal.
pub fn shutdown_on_ctrl_c(tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = tx.send(true);
        }
    });
}
