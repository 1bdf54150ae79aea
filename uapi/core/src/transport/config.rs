//! Listener Configuration
//!
//! Where control sockets live, what they are called, and how often the
//! deletion watcher looks for them.
//!
//! # Sources
//!
//! 1. `ListenerConfig::default()`
//! 2. A TOML file (`ListenerConfig::load_from_path`)
//! 3. Environment variables (`ListenerConfig::from_env`)

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::traits::ListenerError;

/// Default directory holding control sockets
pub const DEFAULT_RUNTIME_DIR: &str = "/var/run/uapi";

/// Default socket file suffix
pub const DEFAULT_SOCKET_SUFFIX: &str = ".sock";

/// Default deletion-watcher poll interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default socket file permissions (owner-only)
pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

/// Errors loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config {path:?}: {source}")]
    Io {
        /// Path of the config file
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`ListenerConfig`]
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Listener configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Directory holding the socket files
    pub runtime_dir: PathBuf,

    /// Suffix appended to the instance name
    pub socket_suffix: String,

    /// How often the deletion watcher checks the socket path
    ///
    /// Bounds the latency between an external unlink and the
    /// `SocketDeleted` error surfacing from `accept()`.
    pub poll_interval_ms: u64,

    /// Permissions applied to the socket file after bind
    pub socket_mode: u32,

    /// Create `runtime_dir` if it does not exist
    pub create_runtime_dir: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            runtime_dir: PathBuf::from(DEFAULT_RUNTIME_DIR),
            socket_suffix: DEFAULT_SOCKET_SUFFIX.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            socket_mode: DEFAULT_SOCKET_MODE,
            create_runtime_dir: true,
        }
    }
}

impl ListenerConfig {
    /// Configuration rooted at `runtime_dir`, everything else default
    pub fn with_runtime_dir(runtime_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime_dir: runtime_dir.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `UAPI_RUNTIME_DIR`: Directory holding socket files
    /// - `UAPI_SOCKET_SUFFIX`: Socket file suffix
    /// - `UAPI_POLL_INTERVAL_MS`: Deletion poll interval in ms
    /// - `UAPI_SOCKET_MODE`: Socket permissions, octal (e.g. "660")
    ///
    /// Unset or unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply environment variable overrides on top of `self`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("UAPI_RUNTIME_DIR") {
            if !dir.is_empty() {
                self.runtime_dir = PathBuf::from(dir);
            }
        }
        if let Ok(suffix) = std::env::var("UAPI_SOCKET_SUFFIX") {
            self.socket_suffix = suffix;
        }
        if let Some(ms) = std::env::var("UAPI_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.poll_interval_ms = ms;
        }
        if let Some(mode) = std::env::var("UAPI_SOCKET_MODE")
            .ok()
            .and_then(|v| parse_octal_mode(&v))
        {
            self.socket_mode = mode;
        }
        self
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from a TOML file
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Deletion-watcher poll interval (never zero)
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

fn parse_octal_mode(value: &str) -> Option<u32> {
    let digits = value.trim().trim_start_matches("0o");
    u32::from_str_radix(digits, 8).ok().filter(|m| *m <= 0o7777)
}

/// Filesystem path of an instance's control socket
///
/// Computed once from the runtime directory, the instance name and the
/// suffix, then never changed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SocketPath {
    name: String,
    path: PathBuf,
}

impl SocketPath {
    /// Build `runtime_dir/<name><suffix>`
    ///
    /// # Errors
    ///
    /// Returns `ListenerError::InvalidName` if `name` is empty, `.` or `..`,
    /// or contains `/` or NUL.
    pub fn new(runtime_dir: &Path, name: &str, suffix: &str) -> Result<Self, ListenerError> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
            return Err(ListenerError::InvalidName(name.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            path: runtime_dir.join(format!("{name}{suffix}")),
        })
    }

    /// Build the socket path for `name` using `config`
    pub fn for_instance(name: &str, config: &ListenerConfig) -> Result<Self, ListenerError> {
        Self::new(&config.runtime_dir, name, &config.socket_suffix)
    }

    /// Instance name the path was derived from
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The socket file path
    pub fn as_path(&self) -> &Path {
        &self.path
    }
}

impl AsRef<Path> for SocketPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for SocketPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_listener_config_default() {
        let config = ListenerConfig::default();
        assert_eq!(config.runtime_dir, PathBuf::from("/var/run/uapi"));
        assert_eq!(config.socket_suffix, ".sock");
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.socket_mode, 0o600);
        assert!(config.create_runtime_dir);
    }

    #[test]
    fn test_config_from_toml_partial() {
        let config = ListenerConfig::from_toml_str(
            r#"
            runtime_dir = "/run/wireguard"
            poll_interval_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(
            config,
            ListenerConfig {
                runtime_dir: PathBuf::from("/run/wireguard"),
                poll_interval_ms: 250,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_config_from_toml_octal_mode() {
        let config = ListenerConfig::from_toml_str("socket_mode = 0o660").unwrap();
        assert_eq!(config.socket_mode, 0o660);
    }

    #[test]
    fn test_config_from_toml_invalid() {
        let result = ListenerConfig::from_toml_str("poll_interval_ms = \"soon\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_load_missing_file() {
        let result = ListenerConfig::load_from_path(Path::new("/nonexistent/uapi.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_config_load_from_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("uapi.toml");
        std::fs::write(&path, "socket_suffix = \".ctl\"\n").unwrap();

        let config = ListenerConfig::load_from_path(&path).unwrap();
        assert_eq!(config.socket_suffix, ".ctl");
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_poll_interval_never_zero() {
        let config = ListenerConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_parse_octal_mode() {
        assert_eq!(parse_octal_mode("600"), Some(0o600));
        assert_eq!(parse_octal_mode("0o660"), Some(0o660));
        assert_eq!(parse_octal_mode("999"), None);
        assert_eq!(parse_octal_mode("77777"), None);
    }

    #[test]
    fn test_socket_path_layout() {
        let path = SocketPath::new(Path::new("/var/run/wireguard"), "wg0", ".sock").unwrap();
        assert_eq!(path.as_path(), Path::new("/var/run/wireguard/wg0.sock"));
        assert_eq!(path.name(), "wg0");
        assert_eq!(path.to_string(), "/var/run/wireguard/wg0.sock");
    }

    #[test]
    fn test_socket_path_for_instance() {
        let config = ListenerConfig::with_runtime_dir("/tmp/uapi-test");
        let path = SocketPath::for_instance("tun1", &config).unwrap();
        assert_eq!(path.as_path(), Path::new("/tmp/uapi-test/tun1.sock"));
    }

    #[test]
    fn test_socket_path_rejects_bad_names() {
        for name in ["", ".", "..", "a/b", "../escape", "nul\0byte"] {
            let result = SocketPath::new(Path::new("/var/run/uapi"), name, ".sock");
            assert!(
                matches!(result, Err(ListenerError::InvalidName(_))),
                "name {name:?} should be rejected"
            );
        }
    }
}
