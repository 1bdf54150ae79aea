//! Daemon Server Implementation
//!
//! This module provides the core server loop for the UAPI daemon:
//! - Creates the control socket listener for an instance name
//! - Spawns a handler task per accepted connection
//! - Tracks active connections so shutdown can abort them
//! - Stops on a shutdown signal or when the socket file is deleted

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, error, info, warn, Instrument};

use uapi_core::{
    create_listener, ConnectionListener, ListenerConfig, ListenerError, UnifiedListener,
};

/// Identifier for an accepted connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state tracking
struct ConnectionState {
    /// When the connection was established
    connected_at: Instant,
    /// Handle to abort the connection task
    abort_handle: tokio::task::AbortHandle,
}

/// Configuration for the daemon server
pub struct ServerConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Read buffer size per connection
    pub read_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            read_buffer_size: 8192,
        }
    }
}

/// Why the server loop ended
#[derive(Debug)]
pub enum StopReason {
    /// Shutdown was requested
    Shutdown,
    /// The control socket file was removed externally
    SocketDeleted,
    /// The listener failed
    ListenerFailed(ListenerError),
}

/// The main daemon server
pub struct DaemonServer {
    /// Instance name the socket is derived from
    name: String,
    /// Listener configuration
    listener_config: ListenerConfig,
    /// Server configuration
    server_config: ServerConfig,
    /// Active connections
    connection_states: Arc<DashMap<ConnectionId, ConnectionState>>,
}

impl DaemonServer {
    /// Create a new daemon server
    pub fn new(name: impl Into<String>, listener_config: ListenerConfig) -> Self {
        Self {
            name: name.into(),
            listener_config,
            server_config: ServerConfig::default(),
            connection_states: Arc::new(DashMap::new()),
        }
    }

    /// Override the server configuration
    #[must_use]
    pub fn with_server_config(mut self, server_config: ServerConfig) -> Self {
        self.server_config = server_config;
        self
    }

    /// Run until shutdown is requested or the listener dies
    pub async fn run(&self, shutdown: Arc<Notify>) -> Result<StopReason> {
        let listener = create_listener(&self.name, &self.listener_config)
            .await
            .with_context(|| format!("Failed to create control socket for {:?}", self.name))?;

        info!(name = %self.name, path = ?listener.path(), "Listening for connections");

        let reason = loop {
            tokio::select! {
                () = shutdown.notified() => {
                    info!("Shutdown requested, stopping accept loop");
                    break StopReason::Shutdown;
                }
                result = listener.accept() => match result {
                    Ok(stream) => self.spawn_connection(stream),
                    Err(ListenerError::SocketDeleted { path }) => {
                        warn!(path = ?path, "Control socket deleted, shutting down");
                        break StopReason::SocketDeleted;
                    }
                    Err(e) => {
                        error!(error = %e, "Listener failed");
                        break StopReason::ListenerFailed(e);
                    }
                },
            }
        };

        self.shutdown(&listener).await;
        Ok(reason)
    }

    /// Track and spawn a handler for an accepted connection
    fn spawn_connection(&self, stream: UnixStream) {
        if self.connection_states.len() >= self.server_config.max_connections {
            warn!("Connection limit reached, rejecting new connection");
            drop(stream);
            return;
        }

        let conn_id = ConnectionId::next();
        info!(
            conn_id = %conn_id,
            active_connections = self.connection_states.len() + 1,
            "New connection accepted"
        );

        // The handler waits until its entry is registered, so its own
        // removal can never run before the insert
        let (registered_tx, registered_rx) = oneshot::channel();
        let buffer_size = self.server_config.read_buffer_size;
        let connection_states = Arc::clone(&self.connection_states);
        let task = tokio::spawn(
            async move {
                if registered_rx.await.is_ok() {
                    Self::handle_connection(conn_id, stream, buffer_size, connection_states)
                        .await;
                }
            }
            .instrument(tracing::info_span!("connection", %conn_id)),
        );

        self.connection_states.insert(
            conn_id,
            ConnectionState {
                connected_at: Instant::now(),
                abort_handle: task.abort_handle(),
            },
        );
        let _ = registered_tx.send(());
    }

    /// Serve a single client connection
    ///
    /// The request protocol is handled elsewhere; here the stream is drained
    /// until the peer hangs up.
    async fn handle_connection(
        conn_id: ConnectionId,
        mut stream: UnixStream,
        buffer_size: usize,
        connection_states: Arc<DashMap<ConnectionId, ConnectionState>>,
    ) {
        let mut buf = vec![0u8; buffer_size];
        let mut total = 0usize;

        loop {
            match stream.read(&mut buf).await {
                Ok(0) => {
                    debug!("Client disconnected (EOF)");
                    break;
                }
                Ok(n) => total += n,
                Err(e) => {
                    warn!(error = %e, "Read error");
                    break;
                }
            }
        }

        let uptime = connection_states
            .remove(&conn_id)
            .map(|(_, state)| state.connected_at.elapsed());
        info!(
            bytes = total,
            uptime = ?uptime,
            active_connections = connection_states.len(),
            "Connection handler finished"
        );
    }

    /// Abort connection handlers and close the listener
    async fn shutdown(&self, listener: &UnifiedListener) {
        info!(
            active_connections = self.connection_count(),
            "Initiating graceful shutdown"
        );

        let conn_ids: Vec<ConnectionId> = self.connection_states.iter().map(|r| *r.key()).collect();
        for conn_id in conn_ids {
            if let Some((_, state)) = self.connection_states.remove(&conn_id) {
                debug!(conn_id = %conn_id, "Aborting connection");
                state.abort_handle.abort();
            }
        }

        if let Err(e) = listener.close().await {
            warn!(error = %e, "Listener close failed");
        }

        info!("Shutdown complete");
    }

    /// Get number of active connections
    pub fn connection_count(&self) -> usize {
        self.connection_states.len()
    }
}
