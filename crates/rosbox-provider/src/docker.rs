//! Docker provider implementation using bollard

use crate::{
    BuildConfig, ContainerDetails, ContainerId, ContainerInfo, ContainerProvider, ContainerStatus,
    CreateContainerConfig, ImageId, ListFilter, MountConfig, MountInfo, MountPropagation,
    Operation, ProviderError, ProviderInfo, ProviderType, Result,
};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, RenameContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::image::{BuildImageOptions, CreateImageOptions};
use bollard::service::{
    CreateImageInfo, HostConfig, Mount, MountBindOptions, MountBindOptionsPropagationEnum,
    MountTypeEnum,
};
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tokio::sync::mpsc;

/// Docker provider using bollard crate
pub struct DockerProvider {
    client: Docker,
    /// CLI binary used for interactive sessions
    cli: String,
}

impl DockerProvider {
    /// Create a new Docker provider and check the daemon answers
    pub async fn new(socket_path: &str, cli: &str) -> Result<Self> {
        let client = if socket_path.starts_with("http://") || socket_path.starts_with("https://")
        {
            Docker::connect_with_http(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| ProviderError::ConnectionError(e.to_string()))?
        } else {
            let path = socket_path.trim_start_matches("unix://");
            Docker::connect_with_socket(path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| ProviderError::ConnectionError(e.to_string()))?
        };

        let provider = Self {
            client,
            cli: cli.to_string(),
        };
        provider.ping().await?;
        Ok(provider)
    }
}

fn is_not_found(e: &bollard::errors::Error) -> bool {
    matches!(
        e,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

#[async_trait]
impl ContainerProvider for DockerProvider {
    fn supports(&self, _op: Operation) -> bool {
        true
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .ping()
            .await
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;
        Ok(())
    }

    async fn create(&self, config: &CreateContainerConfig) -> Result<ContainerId> {
        let options = Some(CreateContainerOptions {
            name: config.name.as_str(),
            platform: None,
        });

        let mounts: Vec<Mount> = config.mounts.iter().map(to_bollard_mount).collect();

        if config.home.is_some() {
            tracing::debug!("Ignoring home override: not supported by the docker backend");
        }

        let host_config = HostConfig {
            mounts: if mounts.is_empty() {
                None
            } else {
                Some(mounts)
            },
            network_mode: config.network_mode.clone(),
            privileged: Some(config.privileged),
            ..Default::default()
        };

        let mut env: Vec<String> = config
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        env.sort();

        let container_config = Config {
            image: Some(config.image.clone()),
            hostname: config.hostname.clone(),
            env: if env.is_empty() { None } else { Some(env) },
            tty: Some(config.tty),
            open_stdin: Some(config.stdin_open),
            labels: if config.labels.is_empty() {
                None
            } else {
                Some(config.labels.clone())
            },
            host_config: Some(host_config),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(options, container_config)
            .await?;

        for warning in &response.warnings {
            tracing::warn!("{}", warning);
        }

        Ok(ContainerId::new(response.id))
    }

    async fn start(&self, id: &ContainerId) -> Result<()> {
        self.client
            .start_container(&id.0, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop(&self, id: &ContainerId, timeout: Option<u32>) -> Result<()> {
        let options = StopContainerOptions {
            t: timeout.unwrap_or(10) as i64,
        };
        self.client.stop_container(&id.0, Some(options)).await?;
        Ok(())
    }

    async fn remove(&self, id: &ContainerId, force: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.client.remove_container(&id.0, Some(options)).await?;
        Ok(())
    }

    async fn rename(&self, id: &ContainerId, new_name: &str) -> Result<()> {
        self.client
            .rename_container(&id.0, RenameContainerOptions { name: new_name })
            .await?;
        Ok(())
    }

    async fn inspect(&self, id: &ContainerId) -> Result<ContainerDetails> {
        let info = match self
            .client
            .inspect_container(&id.0, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => info,
            Err(e) if is_not_found(&e) => {
                return Err(ProviderError::ContainerNotFound(id.0.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let status = info
            .state
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .map(|s| ContainerStatus::from(s.to_string().as_str()))
            .unwrap_or(ContainerStatus::Unknown);

        let config = info.config.as_ref();
        let host_config = info.host_config.as_ref();

        let mounts = info
            .mounts
            .unwrap_or_default()
            .into_iter()
            .map(|m| MountInfo {
                mount_type: m
                    .typ
                    .map(|t| format!("{:?}", t).to_lowercase())
                    .unwrap_or_else(|| "unknown".to_string()),
                source: m.source.unwrap_or_default(),
                destination: m.destination.unwrap_or_default(),
                read_only: m.rw.map(|rw| !rw).unwrap_or(false),
            })
            .collect();

        Ok(ContainerDetails {
            id: ContainerId::new(info.id.unwrap_or_else(|| id.0.clone())),
            name: info
                .name
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            image: config.and_then(|c| c.image.clone()).unwrap_or_default(),
            image_id: info.image.unwrap_or_default(),
            status,
            labels: config.and_then(|c| c.labels.clone()).unwrap_or_default(),
            env: config.and_then(|c| c.env.clone()).unwrap_or_default(),
            mounts,
            network_mode: host_config.and_then(|h| h.network_mode.clone()),
            privileged: host_config.and_then(|h| h.privileged).unwrap_or(false),
        })
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<ContainerInfo>> {
        let mut filters = HashMap::new();
        if let Some((key, value)) = &filter.label {
            filters.insert("label".to_string(), vec![format!("{}={}", key, value)]);
        }

        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self.client.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerInfo {
                id: ContainerId::new(c.id.unwrap_or_default()),
                name: c
                    .names
                    .and_then(|n| n.first().cloned())
                    .unwrap_or_default()
                    .trim_start_matches('/')
                    .to_string(),
                image: c.image.unwrap_or_default(),
                status: c
                    .state
                    .as_deref()
                    .map(ContainerStatus::from)
                    .unwrap_or(ContainerStatus::Unknown),
                labels: c.labels.unwrap_or_default(),
            })
            .filter(|c| filter.matches_name(&c.name))
            .collect())
    }

    async fn enter(&self, id: &ContainerId, shell: &[String]) -> Result<i32> {
        let mut cmd = tokio::process::Command::new(&self.cli);
        cmd.args(["exec", "-it", &id.0]);
        cmd.args(shell);

        tracing::debug!("Running {} exec -it {} {}", self.cli, id, shell.join(" "));
        let status = cmd
            .status()
            .await
            .map_err(|e| ProviderError::RuntimeError(format!("Failed to run {}: {}", self.cli, e)))?;

        Ok(status.code().unwrap_or(-1))
    }

    async fn image_exists(&self, reference: &str) -> Result<bool> {
        match self.client.inspect_image(reference).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn pull_with_progress(
        &self,
        reference: &str,
        progress: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<ImageId> {
        let options = CreateImageOptions {
            from_image: reference,
            ..Default::default()
        };

        let mut stream = self.client.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(error) = info.error {
                        return Err(ProviderError::PullError(error));
                    }
                    if let Some(line) = format_pull_progress(&info) {
                        tracing::trace!("{}", line);
                        if let Some(ref tx) = progress {
                            let _ = tx.send(line);
                        }
                    }
                }
                Err(e) if is_not_found(&e) => {
                    return Err(ProviderError::ImageNotFound(reference.to_string()))
                }
                Err(e) => return Err(ProviderError::PullError(e.to_string())),
            }
        }

        let inspect = self
            .client
            .inspect_image(reference)
            .await
            .map_err(|e| ProviderError::ImageNotFound(e.to_string()))?;

        Ok(ImageId::new(
            inspect.id.unwrap_or_else(|| reference.to_string()),
        ))
    }

    async fn local_digests(&self, reference: &str) -> Result<Vec<String>> {
        match self.client.inspect_image(reference).await {
            Ok(image) => Ok(image.repo_digests.unwrap_or_default()),
            Err(e) if is_not_found(&e) => Err(ProviderError::ImageNotFound(reference.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn remote_digest(&self, reference: &str) -> Result<String> {
        let inspect = self.client.inspect_registry_image(reference, None).await?;
        inspect.descriptor.digest.ok_or_else(|| {
            ProviderError::RuntimeError(format!("Registry returned no digest for {}", reference))
        })
    }

    async fn build_with_progress(
        &self,
        config: &BuildConfig,
        progress: mpsc::UnboundedSender<String>,
    ) -> Result<ImageId> {
        let tar_data = create_build_context(&config.context)?;

        let options = BuildImageOptions {
            dockerfile: config.dockerfile.clone(),
            t: config.tag.clone(),
            nocache: config.no_cache,
            labels: config.labels.clone(),
            rm: true,
            ..Default::default()
        };

        let mut stream = self
            .client
            .build_image(options, None, Some(tar_data.into()));

        let mut image_id = None;
        while let Some(result) = stream.next().await {
            match result {
                Ok(output) => {
                    if let Some(error) = output.error {
                        let _ = progress.send("Build failed".to_string());
                        return Err(ProviderError::BuildError(error));
                    }
                    if let Some(aux) = output.aux {
                        if let Some(id) = aux.id {
                            image_id = Some(id);
                        }
                    }
                    if let Some(stream) = output.stream {
                        let line = stream.trim_end();
                        if !line.is_empty() {
                            let _ = progress.send(line.to_string());
                        }
                    }
                }
                Err(e) => return Err(ProviderError::BuildError(e.to_string())),
            }
        }

        Ok(image_id
            .map(ImageId::new)
            .unwrap_or_else(|| ImageId::new(config.tag.clone())))
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            provider_type: ProviderType::Docker,
            version: "unknown".to_string(),
            api_version: bollard::API_DEFAULT_VERSION.to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// Convert a bind mount into the Engine API representation
fn to_bollard_mount(m: &MountConfig) -> Mount {
    Mount {
        target: Some(m.target.clone()),
        source: Some(m.source.clone()),
        typ: Some(MountTypeEnum::BIND),
        read_only: Some(m.read_only),
        bind_options: m.propagation.map(|p| MountBindOptions {
            propagation: Some(match p {
                MountPropagation::Private => MountBindOptionsPropagationEnum::PRIVATE,
                MountPropagation::RPrivate => MountBindOptionsPropagationEnum::RPRIVATE,
                MountPropagation::Shared => MountBindOptionsPropagationEnum::SHARED,
                MountPropagation::RShared => MountBindOptionsPropagationEnum::RSHARED,
                MountPropagation::Slave => MountBindOptionsPropagationEnum::SLAVE,
                MountPropagation::RSlave => MountBindOptionsPropagationEnum::RSLAVE,
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Render one pull status message, with byte counts when the daemon sends them
fn format_pull_progress(info: &CreateImageInfo) -> Option<String> {
    let status = info.status.as_deref()?;
    let mut line = match &info.id {
        Some(id) => format!("{}: {}", id, status),
        None => status.to_string(),
    };

    if let Some(detail) = &info.progress_detail {
        if let (Some(current), Some(total)) = (detail.current, detail.total) {
            if total > 0 {
                line.push_str(&format!(
                    " {}/{}",
                    format_bytes(current.max(0) as u64),
                    format_bytes(total as u64)
                ));
            }
        }
    }

    Some(line)
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "kB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{}{}", bytes, UNITS[0])
    } else {
        format!("{:.1}{}", value, UNITS[unit])
    }
}

/// Create a tar archive from the build context
fn create_build_context(context: &Path) -> Result<Vec<u8>> {
    use std::io::Cursor;
    use tar::Builder;

    let mut tar_data = Vec::new();
    {
        let cursor = Cursor::new(&mut tar_data);
        let mut builder = Builder::new(cursor);
        add_dir_to_tar(&mut builder, context, Path::new(""))?;
        builder.finish()?;
    }

    Ok(tar_data)
}

/// Recursively add directory contents to tar
fn add_dir_to_tar<W: Write>(
    builder: &mut tar::Builder<W>,
    base: &Path,
    prefix: &Path,
) -> Result<()> {
    for entry in std::fs::read_dir(base)? {
        let entry = entry?;
        let path = entry.path();
        let name = prefix.join(entry.file_name());

        if entry.file_name() == ".git" {
            continue;
        }

        if path.is_dir() {
            add_dir_to_tar(builder, &path, &name)?;
        } else if path.is_file() {
            builder.append_path_with_name(&path, &name)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::service::ProgressDetail;

    #[test]
    fn test_bind_mount_with_propagation() {
        let mount = to_bollard_mount(
            &MountConfig::bind("/home/me/ws", "/home/ubuntu/ros_ws", false)
                .with_propagation(MountPropagation::RSlave),
        );
        assert_eq!(mount.typ, Some(MountTypeEnum::BIND));
        assert_eq!(mount.read_only, Some(false));
        assert_eq!(
            mount.bind_options.and_then(|b| b.propagation),
            Some(MountBindOptionsPropagationEnum::RSLAVE)
        );
    }

    #[test]
    fn test_bind_mount_without_propagation() {
        let mount = to_bollard_mount(&MountConfig::bind("/home/me/.ssh", "/home/ubuntu/.ssh", true));
        assert_eq!(mount.read_only, Some(true));
        assert!(mount.bind_options.is_none());
    }

    #[test]
    fn test_pull_progress_with_bytes() {
        let info = CreateImageInfo {
            id: Some("a1b2c3".to_string()),
            status: Some("Downloading".to_string()),
            progress_detail: Some(ProgressDetail {
                current: Some(1_500_000),
                total: Some(42_000_000),
            }),
            ..Default::default()
        };
        assert_eq!(
            format_pull_progress(&info).as_deref(),
            Some("a1b2c3: Downloading 1.5MB/42.0MB")
        );
    }

    #[test]
    fn test_pull_progress_status_only() {
        let info = CreateImageInfo {
            status: Some("Pulling from rosbox/rosbox-sim".to_string()),
            ..Default::default()
        };
        assert_eq!(
            format_pull_progress(&info).as_deref(),
            Some("Pulling from rosbox/rosbox-sim")
        );
        assert!(format_pull_progress(&CreateImageInfo::default()).is_none());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2_500), "2.5kB");
        assert_eq!(format_bytes(3_200_000_000), "3.2GB");
    }

    #[test]
    fn test_build_context_contains_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("Dockerfile"), "FROM ubuntu:22.04\n").unwrap();
        std::fs::create_dir_all(tmp.path().join("scripts")).unwrap();
        std::fs::write(tmp.path().join("scripts/entrypoint.sh"), "#!/bin/sh\n").unwrap();

        let data = create_build_context(tmp.path()).unwrap();
        let mut archive = tar::Archive::new(std::io::Cursor::new(data));
        let mut names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["Dockerfile", "scripts/entrypoint.sh"]);
    }
}
