//! Graceful shutdown and signal handling.
//!
//! A dedicated watcher task waits for a shutdown trigger (SIGINT/SIGTERM in
//! production, any future in tests), then asks the server to stop accepting
//! connections and drain the ones in flight. The watcher reports back over a
//! oneshot channel, and the serving path waits for that report before it
//! returns.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use axum_server::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use super::server::LifecycleState;

/// What started the shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Requested by the embedding program
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Interrupt => write!(f, "SIGINT"),
            ShutdownReason::Terminate => write!(f, "SIGTERM"),
            ShutdownReason::Requested => write!(f, "shutdown request"),
        }
    }
}

/// Sent by the watcher once it has initiated the graceful shutdown.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownNotice {
    pub reason: ShutdownReason,
    pub initiated_at: Instant,
}

/// Failures while draining. These are logged, never escalated.
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("shutdown watcher exited without reporting completion")]
    WatcherExited,

    #[error("connections still open after {0:?}, remaining connections were closed")]
    DeadlineExceeded(Duration),
}

/// Wait for SIGINT or SIGTERM.
///
/// The handlers are registered when this is called, not when the returned
/// future is first polled, so a signal arriving in between is not lost. If a
/// handler cannot be installed the error is logged and that signal is ignored;
/// the other one still works. Must be called from within a Tokio runtime.
#[cfg(unix)]
pub fn termination_signal() -> impl Future<Output = ShutdownReason> + Send + 'static {
    use tokio::signal::unix::{signal, SignalKind};

    let interrupt = signal(SignalKind::interrupt());
    let terminate = signal(SignalKind::terminate());

    async move {
        tokio::select! {
            _ = recv_or_pending(interrupt, "SIGINT") => ShutdownReason::Interrupt,
            _ = recv_or_pending(terminate, "SIGTERM") => ShutdownReason::Terminate,
        }
    }
}

#[cfg(unix)]
async fn recv_or_pending(
    signal: std::io::Result<tokio::signal::unix::Signal>,
    name: &'static str,
) {
    match signal {
        Ok(mut signal) => {
            signal.recv().await;
        }
        Err(e) => {
            tracing::error!(error = %e, signal = name, "Failed to install signal handler");
            std::future::pending::<()>().await;
        }
    }
}

/// Wait for Ctrl+C.
#[cfg(not(unix))]
pub fn termination_signal() -> impl Future<Output = ShutdownReason> + Send + 'static {
    async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        ShutdownReason::Interrupt
    }
}

/// Spawn the task that turns `trigger` into a graceful shutdown of `handle`.
///
/// When `trigger` resolves the server stops accepting new connections and
/// waits for open ones, for at most `timeout` if one is given. The returned
/// receiver yields once the shutdown has been initiated.
pub fn spawn_shutdown_watcher<F>(
    handle: Handle,
    trigger: F,
    timeout: Option<Duration>,
    state: watch::Sender<LifecycleState>,
) -> (JoinHandle<()>, oneshot::Receiver<ShutdownNotice>)
where
    F: Future<Output = ShutdownReason> + Send + 'static,
{
    let (done_tx, done_rx) = oneshot::channel();

    let task = tokio::spawn(async move {
        let reason = trigger.await;
        tracing::info!(%reason, "Received shutdown signal");

        state.send_replace(LifecycleState::ShuttingDown);
        handle.graceful_shutdown(timeout);

        match timeout {
            Some(timeout) => tracing::info!(
                timeout_secs = timeout.as_secs_f64(),
                connections = handle.connection_count(),
                "Graceful shutdown initiated, waiting for connections to close"
            ),
            None => tracing::info!(
                connections = handle.connection_count(),
                "Graceful shutdown initiated, waiting for all connections to close"
            ),
        }

        let _ = done_tx.send(ShutdownNotice {
            reason,
            initiated_at: Instant::now(),
        });
    });

    (task, done_rx)
}

/// Check how a finished drain went, given the watcher's report.
pub fn drain_outcome(
    notice: Result<ShutdownNotice, oneshot::error::RecvError>,
    timeout: Option<Duration>,
) -> Result<ShutdownNotice, ShutdownError> {
    let notice = notice.map_err(|_| ShutdownError::WatcherExited)?;
    match timeout {
        Some(timeout) if notice.initiated_at.elapsed() >= timeout => {
            Err(ShutdownError::DeadlineExceeded(timeout))
        }
        _ => Ok(notice),
    }
}
