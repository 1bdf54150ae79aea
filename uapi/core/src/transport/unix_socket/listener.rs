//! Unified Listener
//!
//! Merges two independently blocking sources into one `accept()` call:
//! new peers arriving on the endpoint, and the socket file vanishing from
//! the filesystem. Each source is a background watcher that feeds a
//! single-slot channel; `accept()` returns whichever is ready first.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::acquire::{unlink_if_same, Endpoint, FileIdentity};
use crate::transport::traits::{ConnectionListener, ListenerError};

/// Stop signal and task handle for the accept watcher
struct AcceptWatcher {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Listener over a Unix socket that also reports deletion of its file
///
/// Created with [`UnifiedListener::start`] (or the `create_listener`
/// factory). Callers must [`close`](ConnectionListener::close) it; dropping
/// it stops the accept watcher but leaves the socket file in place.
pub struct UnifiedListener {
    /// Path of the socket file being watched
    path: PathBuf,
    /// Identity of the file we bound, used to avoid unlinking a successor
    identity: Option<FileIdentity>,
    /// Connection-ready channel (capacity 1)
    conn_rx: tokio::sync::Mutex<mpsc::Receiver<UnixStream>>,
    /// Error-ready channel (capacity 1), shared by both watchers
    err_rx: tokio::sync::Mutex<mpsc::Receiver<ListenerError>>,
    /// Accept watcher, `None` once closed
    accept_watcher: Mutex<Option<AcceptWatcher>>,
}

impl UnifiedListener {
    /// Wrap `endpoint` and launch both watchers
    ///
    /// Must be called within a Tokio runtime. The listener is accept-ready
    /// on return.
    pub fn start(endpoint: Endpoint, poll_interval: Duration) -> Self {
        let (listener, path, identity) = endpoint.into_parts();

        let (conn_tx, conn_rx) = mpsc::channel(1);
        let (err_tx, err_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = oneshot::channel();

        tokio::spawn(watch_deletion(path.clone(), poll_interval, err_tx.clone()));
        let task = tokio::spawn(watch_accept(listener, conn_tx, err_tx, stop_rx));

        debug!(path = ?path, ?poll_interval, "Listener watchers started");

        Self {
            path,
            identity,
            conn_rx: tokio::sync::Mutex::new(conn_rx),
            err_rx: tokio::sync::Mutex::new(err_rx),
            accept_watcher: Mutex::new(Some(AcceptWatcher { stop_tx, task })),
        }
    }

    /// Path of the socket file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the socket file if it is still the one we bound
    fn unlink_socket(&self) {
        unlink_if_same(&self.path, self.identity);
    }
}

#[async_trait]
impl ConnectionListener for UnifiedListener {
    type Conn = UnixStream;
    type Addr = std::os::unix::net::SocketAddr;

    /// Wait for a new connection or a terminal watcher error
    ///
    /// If both are ready, either may be returned. Once both watchers have
    /// exited and their results are drained, returns `ListenerError::Closed`.
    async fn accept(&self) -> Result<UnixStream, ListenerError> {
        let mut conn_rx = self.conn_rx.lock().await;
        let mut err_rx = self.err_rx.lock().await;

        tokio::select! {
            Some(stream) = conn_rx.recv() => Ok(stream),
            Some(err) = err_rx.recv() => Err(err),
            else => Err(ListenerError::Closed),
        }
    }

    /// Close the endpoint
    ///
    /// Stops the accept watcher, which releases the socket, then unlinks the
    /// socket file. The deletion watcher is not stopped here; it exits on its
    /// next poll once the file is gone. A second call returns
    /// `ListenerError::Closed`.
    async fn close(&self) -> Result<(), ListenerError> {
        let watcher = self.accept_watcher.lock().take();
        let Some(AcceptWatcher { stop_tx, task }) = watcher else {
            return Err(ListenerError::Closed);
        };

        // The watcher may already have exited on an accept error
        let _ = stop_tx.send(());
        if let Err(e) = task.await {
            warn!(error = %e, "Accept watcher task failed");
        }

        self.unlink_socket();
        info!(path = ?self.path, "Listener closed");
        Ok(())
    }

    /// Always `None`: instances are addressed by name, not address
    fn local_addr(&self) -> Option<Self::Addr> {
        None
    }
}

/// Hand a terminal error to `accept()`, dropping it if the slot is taken
fn deliver(err_tx: &mpsc::Sender<ListenerError>, err: ListenerError) {
    match err_tx.try_send(err) {
        Ok(()) => {}
        Err(TrySendError::Full(err)) => {
            debug!(error = %err, "Error slot occupied, dropping result");
        }
        Err(TrySendError::Closed(_)) => {}
    }
}

/// Accept loop: forwards each connection, exits after the first error
async fn watch_accept(
    listener: UnixListener,
    conn_tx: mpsc::Sender<UnixStream>,
    err_tx: mpsc::Sender<ListenerError>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    loop {
        let stream = tokio::select! {
            _ = &mut stop_rx => {
                deliver(&err_tx, ListenerError::Closed);
                break;
            }
            result = listener.accept() => match result {
                Ok((stream, _addr)) => stream,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    deliver(&err_tx, ListenerError::Accept(e));
                    break;
                }
            },
        };

        debug!("Connection accepted");

        tokio::select! {
            _ = &mut stop_rx => {
                deliver(&err_tx, ListenerError::Closed);
                break;
            }
            result = conn_tx.send(stream) => {
                if result.is_err() {
                    // Listener dropped
                    break;
                }
            }
        }
    }

    debug!("Accept watcher exited");
}

/// Poll `path` until it no longer exists
///
/// Only a clean "not found" is terminal; stat failures for any other reason
/// are ignored and polled again.
async fn watch_deletion(path: PathBuf, poll_interval: Duration, err_tx: mpsc::Sender<ListenerError>) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if err_tx.is_closed() {
            debug!(path = ?path, "Listener dropped, deletion watcher exiting");
            return;
        }

        match tokio::fs::metadata(&path).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = ?path, "Socket file deleted");
                deliver(&err_tx, ListenerError::SocketDeleted { path });
                return;
            }
            Err(e) => {
                debug!(path = ?path, error = %e, "Socket stat failed, retrying");
            }
        }
    }
}
