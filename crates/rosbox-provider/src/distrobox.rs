//! distrobox provider
//!
//! Shells out to the `distrobox` CLI. distrobox owns container state itself,
//! so only create/list/enter/remove are available here.

use crate::{
    BuildConfig, ContainerDetails, ContainerId, ContainerInfo, ContainerProvider, ContainerStatus,
    CreateContainerConfig, ImageId, ListFilter, Operation, ProviderError, ProviderInfo,
    ProviderType, Result,
};
use async_trait::async_trait;
use rosbox_config::DistroboxConfig;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::mpsc;

/// distrobox provider using the host CLI
pub struct DistroboxProvider {
    command: String,
    /// Home directory used when a create request carries none
    default_home: Option<String>,
}

impl DistroboxProvider {
    /// Create a new distrobox provider and check the CLI is runnable
    pub async fn new(config: &DistroboxConfig) -> Result<Self> {
        let provider = Self {
            command: config.command.clone(),
            default_home: config.home.clone(),
        };

        provider.ping().await?;

        Ok(provider)
    }

    /// Run a distrobox command and get output
    async fn run_cmd(&self, args: &[&str]) -> Result<String> {
        tracing::debug!("Running {} {}", self.command, args.join(" "));

        let output = Command::new(&self.command)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                ProviderError::RuntimeError(format!("Failed to run {}: {}", self.command, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::RuntimeError(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn unsupported(op: Operation) -> ProviderError {
        ProviderError::Unsupported(format!("{} is not available with the distrobox backend", op))
    }
}

/// Build the argument list for `distrobox create`. The home directory is
/// made absolute against the current directory.
fn create_args(config: &CreateContainerConfig, default_home: Option<&str>) -> Result<Vec<String>> {
    let mut args = vec![
        "create".to_string(),
        "--yes".to_string(),
        "--name".to_string(),
        config.name.clone(),
        "--image".to_string(),
        config.image.clone(),
    ];

    if let Some(home) = config.home.as_deref().or(default_home) {
        args.push("--home".to_string());
        args.push(std::path::absolute(home)?.to_string_lossy().into_owned());
    }

    Ok(args)
}

/// Parse `distrobox list --no-color` output.
///
/// Lines look like `ID | NAME | STATUS | IMAGE`; the header row and names not
/// accepted by `filter` are dropped.
pub(crate) fn parse_list_output(output: &str, filter: &ListFilter) -> Vec<ContainerInfo> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('|').map(str::trim).collect();
            if fields.len() < 4 || fields[0].eq_ignore_ascii_case("id") {
                return None;
            }
            let name = fields[1];
            if name.is_empty() || !filter.matches_name(name) {
                return None;
            }
            Some(ContainerInfo {
                id: ContainerId::new(fields[0]),
                name: name.to_string(),
                status: ContainerStatus::from_ps_status(fields[2]),
                image: fields[3].to_string(),
                labels: HashMap::new(),
            })
        })
        .collect()
}

#[async_trait]
impl ContainerProvider for DistroboxProvider {
    fn supports(&self, _op: Operation) -> bool {
        false
    }

    async fn ping(&self) -> Result<()> {
        self.run_cmd(&["version"])
            .await
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;
        Ok(())
    }

    async fn create(&self, config: &CreateContainerConfig) -> Result<ContainerId> {
        if !config.mounts.is_empty() {
            tracing::debug!(
                "Ignoring {} bind mount(s): distrobox shares the host home directory",
                config.mounts.len()
            );
        }

        let args = create_args(config, self.default_home.as_deref())?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_cmd(&args).await?;

        Ok(ContainerId::new(config.name.clone()))
    }

    async fn start(&self, _id: &ContainerId) -> Result<()> {
        Err(Self::unsupported(Operation::Start))
    }

    async fn stop(&self, _id: &ContainerId, _timeout: Option<u32>) -> Result<()> {
        Err(Self::unsupported(Operation::Stop))
    }

    async fn remove(&self, id: &ContainerId, _force: bool) -> Result<()> {
        self.run_cmd(&["rm", "--force", &id.0]).await?;
        Ok(())
    }

    async fn rename(&self, _id: &ContainerId, _new_name: &str) -> Result<()> {
        Err(Self::unsupported(Operation::Rename))
    }

    async fn inspect(&self, id: &ContainerId) -> Result<ContainerDetails> {
        let output = self.run_cmd(&["list", "--no-color"]).await?;
        let info = parse_list_output(&output, &ListFilter::default())
            .into_iter()
            .find(|c| c.name == id.0 || c.id.0 == id.0)
            .ok_or_else(|| ProviderError::ContainerNotFound(id.0.clone()))?;

        Ok(ContainerDetails {
            id: info.id,
            name: info.name,
            image: info.image,
            image_id: String::new(),
            status: info.status,
            labels: info.labels,
            env: Vec::new(),
            mounts: Vec::new(),
            network_mode: Some("host".to_string()),
            privileged: false,
        })
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<ContainerInfo>> {
        if filter.label.is_some() {
            tracing::debug!("distrobox has no labels, filtering by name suffix only");
        }
        let output = self.run_cmd(&["list", "--no-color"]).await?;
        Ok(parse_list_output(&output, filter))
    }

    async fn enter(&self, id: &ContainerId, shell: &[String]) -> Result<i32> {
        let mut cmd = Command::new(&self.command);
        cmd.args(["enter", &id.0]);
        if !shell.is_empty() {
            cmd.arg("--");
            cmd.args(shell);
        }

        let status = cmd.status().await.map_err(|e| {
            ProviderError::RuntimeError(format!("Failed to run {}: {}", self.command, e))
        })?;

        Ok(status.code().unwrap_or(-1))
    }

    async fn image_exists(&self, _reference: &str) -> Result<bool> {
        Err(Self::unsupported(Operation::ImageStore))
    }

    async fn pull_with_progress(
        &self,
        _reference: &str,
        _progress: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<ImageId> {
        Err(Self::unsupported(Operation::ImageStore))
    }

    async fn local_digests(&self, _reference: &str) -> Result<Vec<String>> {
        Err(Self::unsupported(Operation::Freshness))
    }

    async fn remote_digest(&self, _reference: &str) -> Result<String> {
        Err(Self::unsupported(Operation::Freshness))
    }

    async fn build_with_progress(
        &self,
        _config: &BuildConfig,
        _progress: mpsc::UnboundedSender<String>,
    ) -> Result<ImageId> {
        Err(Self::unsupported(Operation::Build))
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            provider_type: ProviderType::Distrobox,
            version: "unknown".to_string(),
            api_version: "cli".to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_OUTPUT: &str = "\
ID           | NAME                 | STATUS                    | IMAGE
3f1c2a9d0b7e | rig1_rosbox          | Up 2 hours                | docker.io/sterren642/rosbox:desktop-latest
9a8b7c6d5e4f | fedora-toolbox       | Exited (0) 3 days ago     | registry.fedoraproject.org/fedora-toolbox:39
0011aabbccdd | sim_rosbox           | Created                   | rosbox-sim
";

    #[test]
    fn test_parse_list_skips_header_and_foreign_names() {
        let filter = ListFilter::managed("rosbox", "rosbox");
        let boxes = parse_list_output(LIST_OUTPUT, &filter);

        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].name, "rig1_rosbox");
        assert_eq!(boxes[0].id.0, "3f1c2a9d0b7e");
        assert_eq!(boxes[0].status, ContainerStatus::Running);
        assert_eq!(boxes[0].image, "docker.io/sterren642/rosbox:desktop-latest");
        assert_eq!(boxes[1].name, "sim_rosbox");
        assert_eq!(boxes[1].status, ContainerStatus::Created);
    }

    #[test]
    fn test_parse_list_unfiltered_keeps_everything() {
        let boxes = parse_list_output(LIST_OUTPUT, &ListFilter::default());
        assert_eq!(boxes.len(), 3);
        assert_eq!(boxes[1].status, ContainerStatus::Exited);
    }

    #[test]
    fn test_parse_list_ignores_malformed_lines() {
        let output = "no containers found\n\n| |\n";
        assert!(parse_list_output(output, &ListFilter::default()).is_empty());
    }

    #[test]
    fn test_create_args_with_home_override() {
        let config = CreateContainerConfig {
            name: "rig1_rosbox".to_string(),
            image: "rosbox-desktop".to_string(),
            home: Some("/srv/boxes/rig1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            create_args(&config, Some("/srv/default")).unwrap(),
            vec![
                "create",
                "--yes",
                "--name",
                "rig1_rosbox",
                "--image",
                "rosbox-desktop",
                "--home",
                "/srv/boxes/rig1"
            ]
        );
    }

    #[test]
    fn test_create_args_default_home() {
        let config = CreateContainerConfig {
            name: "a_rosbox".to_string(),
            image: "img".to_string(),
            ..Default::default()
        };
        assert!(create_args(&config, None)
            .unwrap()
            .iter()
            .all(|a| a != "--home"));
        assert_eq!(
            create_args(&config, Some("/srv/default"))
                .unwrap()
                .last()
                .map(String::as_str),
            Some("/srv/default")
        );
    }

    #[test]
    fn test_create_args_relative_home_is_absolute() {
        let config = CreateContainerConfig {
            name: "rig1_rosbox".to_string(),
            image: "rosbox-desktop".to_string(),
            home: Some("boxes/rig1".to_string()),
            ..Default::default()
        };
        let args = create_args(&config, None).unwrap();
        let expected = std::env::current_dir().unwrap().join("boxes/rig1");
        assert_eq!(args.last().map(String::as_str), Some(&*expected.to_string_lossy()));
    }

    #[test]
    fn test_no_optional_operations() {
        let provider = DistroboxProvider {
            command: "distrobox".to_string(),
            default_home: None,
        };
        for op in [
            Operation::Start,
            Operation::Stop,
            Operation::Update,
            Operation::Freshness,
            Operation::ImageStore,
            Operation::Build,
            Operation::Rename,
        ] {
            assert!(!provider.supports(op));
        }
    }

    #[tokio::test]
    async fn test_unsupported_calls_fail_without_running_cli() {
        let provider = DistroboxProvider {
            command: "/nonexistent/distrobox".to_string(),
            default_home: None,
        };
        let id = ContainerId::new("rig1_rosbox");
        assert!(matches!(
            provider.start(&id).await,
            Err(ProviderError::Unsupported(_))
        ));
        assert!(matches!(
            provider.stop(&id, None).await,
            Err(ProviderError::Unsupported(_))
        ));
        assert!(matches!(
            provider.remote_digest("img").await,
            Err(ProviderError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_cli_is_connection_error() {
        let result = DistroboxProvider::new(&DistroboxConfig {
            command: "/nonexistent/distrobox".to_string(),
            home: None,
        })
        .await;
        assert!(matches!(result, Err(ProviderError::ConnectionError(_))));
    }
}
