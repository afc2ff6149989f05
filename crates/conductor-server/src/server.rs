//! HTTP server implementation.
//!
//! [`ConductorServer`] binds the configured port, serves the router, and
//! keeps the engine's epoch advancing so instrument deadlines fire.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::info;

use conductor_common::{ConfigFile, DispatchError};

use crate::router::build_router;
use crate::state::AppState;

/// Conductor HTTP server.
pub struct ConductorServer {
    state: AppState,
    bind_addr: SocketAddr,
    request_timeout: Duration,
    graceful_shutdown: bool,
}

impl ConductorServer {
    /// Create a server from a loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is invalid or the runtime cannot be
    /// initialized.
    pub fn new(config: &ConfigFile) -> Result<Self, DispatchError> {
        let bind_addr: SocketAddr = format!("0.0.0.0:{}", config.server.port)
            .parse()
            .map_err(|e| {
                DispatchError::invalid_config(format!(
                    "Invalid port '{}': {e}",
                    config.server.port
                ))
            })?;

        Ok(Self {
            state: AppState::from_config(config)?,
            bind_addr,
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
            graceful_shutdown: config.server.graceful_shutdown,
        })
    }

    /// Get a reference to the application state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server until shutdown.
    ///
    /// Blocks until SIGTERM/SIGINT when graceful shutdown is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot bind to the address.
    pub async fn run(self) -> Result<(), DispatchError> {
        let ticker = spawn_epoch_ticker(&self.state);
        let app = build_router(self.state, self.request_timeout);

        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .map_err(|e| DispatchError::invalid_config(format!("Failed to bind: {e}")))?;

        info!(addr = %self.bind_addr, "Starting HTTP server");

        let result = if self.graceful_shutdown {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
        } else {
            axum::serve(listener, app).await
        };

        ticker.abort();
        result.map_err(|e| DispatchError::internal(format!("Server error: {e}")))?;

        info!("Server shutdown complete");
        Ok(())
    }

    /// Start the server on an ephemeral port and return a handle for tests.
    pub async fn start_test(config: &ConfigFile) -> Result<TestHandle, DispatchError> {
        let state = AppState::from_config(config)?;
        let ticker = spawn_epoch_ticker(&state);
        let app = build_router(state.clone(), Duration::from_secs(30));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| DispatchError::invalid_config(format!("Failed to bind: {e}")))?;

        let addr = listener
            .local_addr()
            .map_err(|e| DispatchError::invalid_config(format!("Failed to get addr: {e}")))?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            ticker.abort();
            result
        });

        Ok(TestHandle {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }
}

/// Advance the engine epoch once per millisecond.
///
/// Instrument deadlines are measured in epoch ticks; without this task
/// a spinning instrument could never be interrupted.
fn spawn_epoch_ticker(state: &AppState) -> tokio::task::JoinHandle<()> {
    let engine = state.engine().clone();
    tokio::spawn(async move {
        if !engine.config().epoch_interruption {
            return;
        }
        let mut interval = tokio::time::interval(Duration::from_millis(1));
        loop {
            interval.tick().await;
            engine.increment_epoch();
        }
    })
}

/// Handle for a test server instance.
pub struct TestHandle {
    addr: SocketAddr,
    state: AppState,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<Result<(), std::io::Error>>,
}

impl TestHandle {
    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the server URL.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the application state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Shutdown the server gracefully.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
