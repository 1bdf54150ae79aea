//! Transport Layer for the Control Socket
//!
//! Provides the listener side of the local control plane:
//! - `config`: runtime directory, socket suffix and poll cadence
//! - `traits`: the [`ConnectionListener`] surface and [`ListenerError`]
//! - `unix_socket`: endpoint acquisition and the unified listener
//! - `factory`: name -> path -> endpoint -> running listener
//!
//! # Security
//!
//! - Socket files are created with 0600 permissions by default
//! - A live peer at the socket path is never clobbered
//! - No network exposure (Unix domain sockets only)

pub mod config;
#[cfg(unix)]
pub mod factory;
pub mod traits;
#[cfg(unix)]
pub mod unix_socket;

// Re-exports for convenience
pub use config::{ConfigError, ListenerConfig, SocketPath};
pub use traits::{ConnectionListener, ListenerError};

#[cfg(unix)]
pub use factory::create_listener;
#[cfg(unix)]
pub use unix_socket::{acquire_endpoint, Endpoint, UnifiedListener};
