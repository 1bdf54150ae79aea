//! Listener Traits
//!
//! The connection-listener surface shared by every listener implementation,
//! plus the error taxonomy it reports.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// A source of incoming connections
///
/// Shaped like an ordinary network listener so it can be used wherever one
/// is expected. All methods take `&self`: one task may call [`close`] while
/// another is suspended in [`accept`].
///
/// [`accept`]: ConnectionListener::accept
/// [`close`]: ConnectionListener::close
#[async_trait]
pub trait ConnectionListener: Send + Sync {
    /// The accepted byte stream
    type Conn: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// The address type reported by [`ConnectionListener::local_addr`]
    type Addr: Send;

    /// Wait for the next connection or terminal error
    async fn accept(&self) -> Result<Self::Conn, ListenerError>;

    /// Close the underlying endpoint
    async fn close(&self) -> Result<(), ListenerError>;

    /// Address of the endpoint, if the listener exposes one
    fn local_addr(&self) -> Option<Self::Addr>;
}

/// Listener errors
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The instance name cannot be turned into a socket path
    #[error("invalid instance name: {0:?}")]
    InvalidName(String),

    /// Another live process is listening on the path
    #[error("socket {path:?} is in use by another process")]
    EndpointInUse {
        /// Path of the occupied socket
        path: PathBuf,
    },

    /// The endpoint could not be bound or a stale file could not be removed
    #[error("failed to bind {path:?}: {source}")]
    Bind {
        /// Path being bound
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: io::Error,
    },

    /// The underlying accept call failed
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// The socket file disappeared from the filesystem
    #[error("socket {path:?} was deleted")]
    SocketDeleted {
        /// Path that no longer exists
        path: PathBuf,
    },

    /// The listener has been closed or has no sources left
    #[error("listener closed")]
    Closed,
}

impl ListenerError {
    /// Whether the error means the listener is dead
    ///
    /// Every error surfaced by `accept()` is terminal for the watcher that
    /// produced it; acquisition errors are terminal for the factory call.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InvalidName(_))
    }

    /// Whether the socket file was removed out from under the listener
    #[must_use]
    pub fn is_socket_deleted(&self) -> bool {
        matches!(self, Self::SocketDeleted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ListenerError::EndpointInUse {
            path: PathBuf::from("/var/run/uapi/wg0.sock"),
        };
        assert!(err.to_string().contains("in use"));

        let err = ListenerError::SocketDeleted {
            path: PathBuf::from("/var/run/uapi/wg0.sock"),
        };
        assert!(err.to_string().contains("deleted"));
        assert!(err.is_socket_deleted());
    }

    #[test]
    fn test_bind_error_keeps_source() {
        use std::error::Error;

        let err = ListenerError::Bind {
            path: PathBuf::from("/nonexistent/wg0.sock"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let source = err.source().expect("bind error should carry a source");
        assert_eq!(source.to_string(), "denied");
    }

    #[test]
    fn test_terminal_classification() {
        assert!(ListenerError::Closed.is_terminal());
        assert!(ListenerError::Accept(io::Error::other("boom")).is_terminal());
        assert!(!ListenerError::InvalidName(String::new()).is_terminal());
        assert!(!ListenerError::Closed.is_socket_deleted());
    }
}
