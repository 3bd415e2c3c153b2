//! HTTPS server startup and lifecycle.
//!
//! ```text
//! Starting ──bind ok──▶ Serving ──signal──▶ ShuttingDown ──drained──▶ Stopped
//!     │                    │
//!     └──bind error──▶ Stopped ◀──serve error──┘
//! ```

use std::fmt;
use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use axum::Router;
use axum_server::Handle;
use tokio::sync::watch;

use crate::config::AppConfig;
use crate::routes::create_router;

use super::shutdown::{self, ShutdownError, ShutdownReason};
use super::tls::{TlsConfig, TlsError};

/// Where the server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Serving,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Serving => "serving",
            LifecycleState::ShuttingDown => "shutting_down",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Server startup error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to listen on {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("Graceful shutdown failed: {0}")]
    Shutdown(#[from] ShutdownError),

    #[error("Failed to load TLS configuration: {0}")]
    Tls(#[from] TlsError),
}

/// An HTTPS server with a bound listening socket.
///
/// The listener and TLS configuration are owned here and never change after
/// `bind`.
pub struct HttpsServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    tls: TlsConfig,
    router: Router,
    shutdown_timeout: Option<Duration>,
    state: watch::Sender<LifecycleState>,
}

impl HttpsServer {
    /// Bind `addr` (`host:port`; an empty host means all interfaces).
    pub fn bind(addr: &str, tls: TlsConfig, router: Router) -> Result<Self, ServerError> {
        let (state, _) = watch::channel(LifecycleState::Starting);

        let listener = bind_listener(addr).map_err(|source| {
            tracing::error!(%addr, error = %source, "Failed to bind listener");
            ServerError::Listen {
                addr: addr.to_string(),
                source,
            }
        })?;

        let local_addr = listener.local_addr().map_err(|source| ServerError::Listen {
            addr: addr.to_string(),
            source,
        })?;

        Ok(Self {
            listener,
            local_addr,
            tls,
            router,
            shutdown_timeout: None,
            state,
        })
    }

    /// Bound the time spent draining connections on shutdown. `None` waits
    /// for every in-flight request.
    pub fn with_shutdown_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// The address actually bound, useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Subscribe to lifecycle state changes.
    pub fn state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Serve until SIGINT or SIGTERM, then drain and return.
    pub async fn run(self) -> Result<(), ServerError> {
        let signal = shutdown::termination_signal();
        self.run_until(signal).await
    }

    /// Serve until `trigger` resolves, then drain and return.
    ///
    /// Returns early only on a serve error. Otherwise it waits for the
    /// shutdown watcher to finish, even when the serve loop has already
    /// returned.
    pub async fn run_until<F>(self, trigger: F) -> Result<(), ServerError>
    where
        F: Future<Output = ShutdownReason> + Send + 'static,
    {
        let Self {
            listener,
            local_addr,
            tls,
            router,
            shutdown_timeout,
            state,
        } = self;

        let handle = Handle::new();

        state.send_replace(LifecycleState::Serving);
        let (watcher, shutdown_done) =
            shutdown::spawn_shutdown_watcher(handle.clone(), trigger, shutdown_timeout, state.clone());

        tracing::info!(
            addr = %local_addr,
            certificates = tls.certificates().len(),
            "Starting server for https://{}/",
            local_addr
        );

        let served = axum_server::from_tcp_rustls(listener, tls.rustls_config())
            .handle(handle)
            .serve(router.into_make_service())
            .await;

        if let Err(source) = served {
            watcher.abort();
            state.send_replace(LifecycleState::Stopped);
            return Err(ServerError::Serve(source));
        }

        match shutdown::drain_outcome(shutdown_done.await, shutdown_timeout) {
            Ok(notice) => {
                tracing::info!(
                    reason = %notice.reason,
                    drain_ms = notice.initiated_at.elapsed().as_millis() as u64,
                    "All connections drained"
                );
            }
            Err(e) => {
                tracing::error!(error = %ServerError::Shutdown(e), "Shutdown did not complete cleanly");
            }
        }

        state.send_replace(LifecycleState::Stopped);
        Ok(())
    }
}

fn bind_listener(addr: &str) -> std::io::Result<TcpListener> {
    let listener = if addr.starts_with(':') {
        TcpListener::bind(format!("0.0.0.0{addr}"))?
    } else {
        TcpListener::bind(addr)?
    };
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Load TLS material, assemble the handler chain and serve until a
/// termination signal has been handled.
pub async fn start_server(config: &AppConfig) -> Result<(), ServerError> {
    let pairs = config.tls_pairs()?;
    let tls = TlsConfig::load(&pairs)?;
    let app = create_router(config);

    // Registered before binding so a signal sent once the port accepts
    // connections always takes the graceful path.
    let signal = shutdown::termination_signal();

    tracing::info!(
        dir = %config.dir.display(),
        request_log = config.request_log_enabled(),
        shutdown_timeout_secs = config.shutdown_timeout_seconds,
        "Serving static files"
    );

    HttpsServer::bind(&config.addr, tls, app)?
        .with_shutdown_timeout(config.shutdown_timeout())
        .run_until(signal)
        .await
}
