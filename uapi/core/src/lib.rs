//! UAPI Core - Local Control Socket Listener
//!
//! This crate provides the control-plane entry point for a background
//! service: a single connection source backed by a Unix domain socket that
//! also reports out-of-band deletion of the socket file.
//!
//! # Architecture
//!
//! ```text
//!   name ──► SocketPath ──► acquire_endpoint() ──► UnifiedListener
//!                              │                        │
//!                              │ bind / probe /         ├── accept watcher ──┐
//!                              │ reclaim stale          │   (new peers)      │  mpsc(1) x2
//!                              ▼                        └── deletion watcher ┤
//!                          UnixListener                     (1s stat poll)   ▼
//!                                                                      accept()
//! ```
//!
//! # Key Types
//!
//! - [`UnifiedListener`]: merges "new peer connected" and "socket file
//!   vanished" into one `accept()` call
//! - [`ConnectionListener`]: the listener surface, usable as a trait object
//! - [`ListenerConfig`]: runtime directory, suffix and poll cadence
//! - [`SocketPath`]: the deterministic path for an instance name
//! - [`ListenerError`]: every failure the listener can surface
//!
//! # Quick Start
//!
//! ```ignore
//! use uapi_core::{create_listener, ConnectionListener, ListenerConfig};
//!
//! let config = ListenerConfig::from_env();
//! let listener = create_listener("wg0", &config).await?;
//!
//! loop {
//!     match listener.accept().await {
//!         Ok(stream) => { /* hand the stream to the protocol handler */ }
//!         Err(e) => {
//!             listener.close().await.ok();
//!             break;
//!         }
//!     }
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod protocol;
pub mod transport;

// Re-exports for convenience
pub use protocol::ProtocolError;
pub use transport::{ConfigError, ConnectionListener, ListenerConfig, ListenerError, SocketPath};

#[cfg(unix)]
pub use transport::{acquire_endpoint, create_listener, Endpoint, UnifiedListener};
