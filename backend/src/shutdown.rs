// Process signal and panic handling for the shutdown sequence.

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Chains a panic hook that logs the panic and wakes the returned notifier.
/// Panics in handlers and detached tasks reach the same shutdown path as signals.
pub fn panic_notifier() -> Arc<Notify> {
    let notify = Arc::new(Notify::new());
    let hook_notify = notify.clone();
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        error!(%info, "panic");
        previous(info);
        hook_notify.notify_one();
    }));
    notify
}

/// Resolves on the first of SIGINT, SIGTERM, SIGUSR1 or SIGUSR2.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::SignalKind;

    let mut terminate = install("SIGTERM", SignalKind::terminate());
    let mut user1 = install("SIGUSR1", SignalKind::user_defined1());
    let mut user2 = install("SIGUSR2", SignalKind::user_defined2());

    let name = tokio::select! {
        _ = ctrl_c() => "SIGINT",
        _ = recv(&mut terminate) => "SIGTERM",
        _ = recv(&mut user1) => "SIGUSR1",
        _ = recv(&mut user2) => "SIGUSR2",
    };
    info!(signal = name, "signal received");
}

#[cfg(not(unix))]
pub async fn shutdown_signal() {
    ctrl_c().await;
    info!(signal = "ctrl-c", "signal received");
}

#[cfg(unix)]
fn install(
    name: &'static str,
    kind: tokio::signal::unix::SignalKind,
) -> Option<tokio::signal::unix::Signal> {
    match tokio::signal::unix::signal(kind) {
        Ok(stream) => Some(stream),
        Err(err) => {
            warn!(?err, signal = name, "failed to install signal handler");
            None
        }
    }
}

#[cfg(unix)]
async fn recv(signal: &mut Option<tokio::signal::unix::Signal>) {
    match signal {
        Some(stream) => {
            stream.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
