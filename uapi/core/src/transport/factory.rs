//! Listener Factory
//!
//! Turns an instance name into a running [`UnifiedListener`].

use std::os::unix::fs::DirBuilderExt;

use tracing::info;

use super::{
    config::{ListenerConfig, SocketPath},
    traits::ListenerError,
    unix_socket::{acquire_endpoint, UnifiedListener},
};

/// Create a listener for the instance `name`
///
/// Computes the socket path from `config`, acquires the endpoint (reclaiming
/// a stale socket file if needed), applies the configured permissions and
/// starts both watchers. The listener is accept-ready on return.
///
/// # Errors
///
/// - `ListenerError::InvalidName` if `name` cannot be used as a file name
/// - `ListenerError::EndpointInUse` if another instance is live at the path
/// - `ListenerError::Bind` for directory, removal, bind or chmod failures
///
/// # Example
///
/// ```ignore
/// use uapi_core::{create_listener, ListenerConfig};
///
/// let listener = create_listener("wg0", &ListenerConfig::from_env()).await?;
/// ```
pub async fn create_listener(
    name: &str,
    config: &ListenerConfig,
) -> Result<UnifiedListener, ListenerError> {
    let socket_path = SocketPath::for_instance(name, config)?;

    if config.create_runtime_dir && !config.runtime_dir.exists() {
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(&config.runtime_dir)
            .map_err(|source| ListenerError::Bind {
                path: config.runtime_dir.clone(),
                source,
            })?;
        info!(path = ?config.runtime_dir, "Created runtime directory");
    }

    let endpoint = acquire_endpoint(socket_path.as_path()).await?;
    if let Err(e) = endpoint.set_mode(config.socket_mode) {
        endpoint.discard();
        return Err(e);
    }

    info!(name = socket_path.name(), path = %socket_path, "Control socket ready");
    Ok(UnifiedListener::start(endpoint, config.poll_interval()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::traits::ConnectionListener;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_listener_creates_runtime_dir() {
        let temp_dir = TempDir::new().unwrap();
        let config = ListenerConfig::with_runtime_dir(temp_dir.path().join("run").join("uapi"));

        let listener = create_listener("wg0", &config).await.unwrap();
        assert_eq!(listener.path(), config.runtime_dir.join("wg0.sock"));
        assert!(listener.path().exists());

        let mode = std::fs::metadata(listener.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        listener.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_listener_without_runtime_dir() {
        let temp_dir = TempDir::new().unwrap();
        let config = ListenerConfig {
            runtime_dir: temp_dir.path().join("absent"),
            create_runtime_dir: false,
            ..Default::default()
        };

        let result = create_listener("wg0", &config).await;
        assert!(matches!(result, Err(ListenerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_create_listener_invalid_name() {
        let temp_dir = TempDir::new().unwrap();
        let config = ListenerConfig::with_runtime_dir(temp_dir.path());

        let result = create_listener("../wg0", &config).await;
        assert!(matches!(result, Err(ListenerError::InvalidName(_))));
    }

    #[tokio::test]
    async fn test_create_listener_custom_mode_and_suffix() {
        let temp_dir = TempDir::new().unwrap();
        let config = ListenerConfig {
            runtime_dir: temp_dir.path().to_path_buf(),
            socket_suffix: ".ctl".to_string(),
            socket_mode: 0o660,
            ..Default::default()
        };

        let listener = create_listener("tun3", &config).await.unwrap();
        assert_eq!(listener.path(), temp_dir.path().join("tun3.ctl"));

        let mode = std::fs::metadata(listener.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o660);

        listener.close().await.unwrap();
    }
}
