//! Endpoint Acquisition
//!
//! Binds a Unix socket at a path, reclaiming the path when it is occupied by
//! a stale socket file that nobody is listening on.

use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use crate::transport::traits::ListenerError;

/// Device and inode of a bound socket file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    pub(crate) fn of(meta: &std::fs::Metadata) -> Self {
        Self {
            dev: meta.dev(),
            ino: meta.ino(),
        }
    }
}

/// An exclusively owned, listening Unix socket
#[derive(Debug)]
pub struct Endpoint {
    listener: UnixListener,
    path: PathBuf,
    identity: Option<FileIdentity>,
}

impl Endpoint {
    fn new(listener: UnixListener, path: &Path) -> Self {
        let identity = std::fs::metadata(path).ok().map(|m| FileIdentity::of(&m));
        info!(path = ?path, "Bound control socket");

        Self {
            listener,
            path: path.to_path_buf(),
            identity,
        }
    }

    /// Path the endpoint is bound to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `mode` to the socket file
    pub fn set_mode(&self, mode: u32) -> Result<(), ListenerError> {
        std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(mode)).map_err(
            |source| ListenerError::Bind {
                path: self.path.clone(),
                source,
            },
        )
    }

    /// Close the endpoint and remove its socket file
    pub fn discard(self) {
        drop(self.listener);
        unlink_if_same(&self.path, self.identity);
    }

    pub(crate) fn into_parts(self) -> (UnixListener, PathBuf, Option<FileIdentity>) {
        (self.listener, self.path, self.identity)
    }
}

/// Remove the socket file at `path` if it is still the one identified by
/// `identity` (or unconditionally when the identity is unknown)
pub(crate) fn unlink_if_same(path: &Path, identity: Option<FileIdentity>) {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if identity.is_none_or(|id| id == FileIdentity::of(&meta)) => {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = ?path, error = %e, "Failed to remove socket file");
                }
            }
        }
        Ok(_) => {
            debug!(path = ?path, "Socket path was rebound elsewhere, leaving it");
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = ?path, error = %e, "Failed to stat socket file");
        }
    }
}

/// Bind a listening Unix socket at `path`
///
/// 1. Bind directly. Success returns immediately.
/// 2. If bind fails, connect to `path`. A successful connect, or one refused
///    with `WouldBlock` because the live listener's backlog is full, means
///    another instance owns it: `EndpointInUse`, and the path is left alone.
/// 3. Otherwise the file is a leftover: remove it (already gone is fine).
/// 4. Bind once more.
///
/// Another process can bind the path between the failed probe and the
/// unlink in step 3. That window is not guarded against.
///
/// # Errors
///
/// - `ListenerError::EndpointInUse` if another process is listening
/// - `ListenerError::Bind` if the stale file cannot be removed or the
///   second bind fails
pub async fn acquire_endpoint(path: &Path) -> Result<Endpoint, ListenerError> {
    let bind_err = match UnixListener::bind(path) {
        Ok(listener) => return Ok(Endpoint::new(listener, path)),
        Err(e) => e,
    };

    debug!(path = ?path, error = %bind_err, "Bind failed, probing for a live listener");

    match UnixStream::connect(path).await {
        Ok(_) => {
            return Err(ListenerError::EndpointInUse {
                path: path.to_path_buf(),
            })
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            debug!(path = ?path, "Live listener backlog is full");
            return Err(ListenerError::EndpointInUse {
                path: path.to_path_buf(),
            });
        }
        Err(e) => debug!(path = ?path, error = %e, "Nothing listening, reclaiming path"),
    }

    match std::fs::remove_file(path) {
        Ok(()) => info!(path = ?path, "Removed stale socket file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(ListenerError::Bind {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    let listener = UnixListener::bind(path).map_err(|source| ListenerError::Bind {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(Endpoint::new(listener, path))
}
