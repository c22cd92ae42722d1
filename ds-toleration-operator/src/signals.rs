use std::{io, time::Duration};

use log::{info, warn};
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

pub const FORCED_EXIT_CODE: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// a second termination request arrived while draining
    Forced,
    /// the graceful shutdown outlived its deadline
    TimedOut,
    /// the signal source closed before any request arrived
    Unavailable,
}

impl ShutdownOutcome {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ShutdownOutcome::Forced | ShutdownOutcome::TimedOut => Some(FORCED_EXIT_CODE),
            ShutdownOutcome::Unavailable => None,
        }
    }
}

/// Registers the SIGTERM and SIGINT handlers. Has to happen before any
/// long-running work, otherwise an early signal kills the process outright.
#[cfg(unix)]
pub fn termination_signals() -> io::Result<impl Stream<Item = ()> + Unpin + Send> {
    use tokio::signal::unix::{signal, SignalKind};
    use tokio_stream::wrappers::SignalStream;

    let sigterm = SignalStream::new(signal(SignalKind::terminate())?)
        .map(|_| info!("Received SIGTERM"));
    let sigint = SignalStream::new(signal(SignalKind::interrupt())?)
        .map(|_| info!("Received SIGINT"));

    Ok(sigterm.merge(sigint))
}

#[cfg(not(unix))]
pub fn termination_signals() -> io::Result<impl Stream<Item = ()> + Unpin + Send> {
    use tokio_stream::wrappers::CtrlCStream;

    Ok(CtrlCStream::new(tokio::signal::windows::ctrl_c()?).map(|_| info!("Received Ctrl+C")))
}

/// Cancels `stop` on the first termination request, then waits for either a
/// second request or `timeout` to pass. Leaves exiting to the caller.
pub async fn handle_shutdown_signals<S>(
    mut signals: S,
    stop: CancellationToken,
    timeout: Duration,
) -> ShutdownOutcome
where
    S: Stream<Item = ()> + Unpin,
{
    if signals.next().await.is_none() {
        warn!("Termination signal source closed, only a forced kill will stop the operator");
        return ShutdownOutcome::Unavailable;
    }

    info!("Termination requested, shutting down gracefully (repeat to force)");
    stop.cancel();

    tokio::select! {
        Some(()) = signals.next() => {
            warn!("Second termination request received, exiting immediately!");
            ShutdownOutcome::Forced
        }
        _ = tokio::time::sleep(timeout) => {
            warn!("Graceful shutdown didn't finish within {timeout:?}, exiting!");
            ShutdownOutcome::TimedOut
        }
    }
}
