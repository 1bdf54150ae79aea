//! Unix Socket Listener
//!
//! Local control socket with stale-socket recovery and deletion detection.
//!
//! # Socket Location
//!
//! `<runtime_dir>/<name><suffix>`, by default `/var/run/uapi/<name>.sock`.
//! The presence of this file is the liveness signal the deletion watcher
//! polls for.
//!
//! # Architecture
//!
//! ```text
//!                       UnifiedListener
//!   ┌──────────────────────────────────────────────────────┐
//!   │  accept watcher ──── UnixStream ────► conn  mpsc(1) ─┼──┐
//!   │   (owns UnixListener)                                │  │
//!   │        └────────── ListenerError ──┐                 │  ├─► accept()
//!   │                                    ▼                 │  │
//!   │  deletion watcher ─ SocketDeleted ► error mpsc(1) ───┼──┘
//!   │   (stat every poll interval)                         │
//!   └──────────────────────────────────────────────────────┘
//! ```

mod acquire;
mod listener;

pub use acquire::{acquire_endpoint, Endpoint};
pub use listener::UnifiedListener;
