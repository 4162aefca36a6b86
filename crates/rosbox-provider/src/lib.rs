//! Container backends for rosbox
//!
//! This crate provides an abstraction over the two supported backends with a
//! consistent API for box lifecycle operations:
//! - Docker, through the Engine API (full operation set)
//! - distrobox, by shelling out to its CLI (no start/stop/update/freshness)

mod distrobox;
mod docker;
mod error;
mod types;

pub use distrobox::DistroboxProvider;
pub use docker::DockerProvider;
pub use error::*;
pub use types::*;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Trait for container backends (Docker, distrobox)
#[async_trait]
pub trait ContainerProvider: Send + Sync {
    /// Whether the backend implements an optional operation.
    /// Calls to an unsupported operation return `ProviderError::Unsupported`.
    fn supports(&self, op: Operation) -> bool;

    /// Check if the backend is available/connected
    async fn ping(&self) -> Result<()>;

    /// Create a container from an image
    async fn create(&self, config: &CreateContainerConfig) -> Result<ContainerId>;

    /// Start a container
    async fn start(&self, id: &ContainerId) -> Result<()>;

    /// Stop a container
    async fn stop(&self, id: &ContainerId, timeout: Option<u32>) -> Result<()>;

    /// Remove a container
    async fn remove(&self, id: &ContainerId, force: bool) -> Result<()>;

    /// Rename a container
    async fn rename(&self, id: &ContainerId, new_name: &str) -> Result<()>;

    /// Get detailed information about a container.
    /// Missing containers yield `ProviderError::ContainerNotFound`.
    async fn inspect(&self, id: &ContainerId) -> Result<ContainerDetails>;

    /// List containers (running or not) matching `filter`
    async fn list(&self, filter: &ListFilter) -> Result<Vec<ContainerInfo>>;

    /// Attach an interactive shell with inherited stdio and wait for it to
    /// exit. Returns the session's exit code.
    async fn enter(&self, id: &ContainerId, shell: &[String]) -> Result<i32>;

    /// Whether `reference` is present in the local image store
    async fn image_exists(&self, reference: &str) -> Result<bool>;

    /// Pull an image, streaming human-readable progress lines
    async fn pull_with_progress(
        &self,
        reference: &str,
        progress: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<ImageId>;

    /// Registry digests recorded for a local image (`repo@sha256:...`)
    async fn local_digests(&self, reference: &str) -> Result<Vec<String>>;

    /// Current manifest digest for `reference` in its registry (`sha256:...`)
    async fn remote_digest(&self, reference: &str) -> Result<String>;

    /// Build an image with progress streaming
    async fn build_with_progress(
        &self,
        config: &BuildConfig,
        progress: mpsc::UnboundedSender<String>,
    ) -> Result<ImageId>;

    /// Get provider information
    fn info(&self) -> ProviderInfo;
}

/// Factory function to create a provider based on type.
/// The returned provider has already answered a ping.
pub async fn create_provider(
    provider_type: ProviderType,
    config: &rosbox_config::GlobalConfig,
) -> Result<Box<dyn ContainerProvider>> {
    match provider_type {
        ProviderType::Docker => {
            let docker = &config.providers.docker;
            match DockerProvider::new(&docker.socket, &docker.cli).await {
                Ok(provider) => Ok(Box::new(provider)),
                Err(e) => {
                    let socket_exists = std::path::Path::new(&docker.socket).exists();
                    Err(ProviderError::ConnectionError(format_connection_error(
                        provider_type,
                        &docker.socket,
                        socket_exists,
                        &e,
                    )))
                }
            }
        }
        ProviderType::Distrobox => {
            let provider = DistroboxProvider::new(&config.providers.distrobox).await?;
            Ok(Box::new(provider))
        }
    }
}

/// Backend named by `defaults.backend`
pub fn default_backend(config: &rosbox_config::GlobalConfig) -> Result<ProviderType> {
    config.defaults.backend.parse().map_err(|e: String| {
        rosbox_config::ConfigError::Invalid(format!("defaults.backend: {}", e)).into()
    })
}

/// Format a helpful connection error message with actionable instructions
fn format_connection_error(
    provider: ProviderType,
    socket_path: &str,
    socket_exists: bool,
    underlying: &ProviderError,
) -> String {
    let mut msg = format!("Cannot connect to {}\n\n", provider);

    if !socket_exists {
        msg.push_str(&format!(
            "The Docker API socket was not found at:\n  {}\n\n",
            socket_path
        ));
        msg.push_str("Install Docker first, then start it with:\n");
        msg.push_str("  sudo systemctl enable --now docker\n");
    } else {
        msg.push_str(&format!(
            "The socket exists at {} but the daemon is not responding.\n\n",
            socket_path
        ));
        msg.push_str(&format!("Underlying error: {}\n", underlying));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_missing_socket() {
        let msg = format_connection_error(
            ProviderType::Docker,
            "/nope/docker.sock",
            false,
            &ProviderError::ConnectionError("refused".into()),
        );
        assert!(msg.contains("/nope/docker.sock"));
        assert!(msg.contains("systemctl enable --now docker"));
        assert!(!msg.contains("refused"));
    }

    #[test]
    fn test_default_backend_from_config() {
        let mut config = rosbox_config::GlobalConfig::default();
        assert_eq!(default_backend(&config).unwrap(), ProviderType::Docker);

        config.defaults.backend = "Distrobox".to_string();
        assert_eq!(default_backend(&config).unwrap(), ProviderType::Distrobox);
    }

    #[test]
    fn test_unknown_default_backend_is_config_error() {
        let mut config = rosbox_config::GlobalConfig::default();
        config.defaults.backend = "podman".to_string();
        let err = default_backend(&config).unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Config(rosbox_config::ConfigError::Invalid(_))
        ));
        assert!(err.to_string().contains("podman"));
    }

    #[test]
    fn test_connection_error_daemon_down() {
        let msg = format_connection_error(
            ProviderType::Docker,
            "/var/run/docker.sock",
            true,
            &ProviderError::ConnectionError("refused".into()),
        );
        assert!(msg.contains("not responding"));
        assert!(msg.contains("refused"));
    }
}
