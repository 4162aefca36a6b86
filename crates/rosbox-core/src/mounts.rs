//! Mount policy for new boxes
//!
//! Turns the host OS and the caller's options into bind mounts, environment,
//! network mode and privilege flag. All host lookups go through
//! [`MountDefaults`] so the policy itself never reads the process environment.

use crate::{CoreError, Result};
use rosbox_config::{ConfigError, GlobalConfig};
use rosbox_provider::{ContainerDetails, MountConfig, MountPropagation};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// X11 socket directory inside the container
pub const X11_SOCKET_TARGET: &str = "/tmp/.X11-unix";
/// XAUTHORITY file inside the container
pub const XAUTHORITY_TARGET: &str = "/tmp/.Xauthority";

/// Host profile the mount policy is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    /// Native Linux host with an X server
    Linux,
    /// Windows host running the engine under WSL (WSLg display)
    Windows,
}

impl HostOs {
    /// Profile of the machine we are running on
    pub fn detect() -> std::result::Result<Self, ConfigError> {
        Self::from_os_name(std::env::consts::OS)
    }

    pub fn from_os_name(os: &str) -> std::result::Result<Self, ConfigError> {
        match os {
            "linux" => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            other => Err(ConfigError::UnsupportedHost(other.to_string())),
        }
    }
}

/// Container network mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    Host,
    Bridge,
}

impl NetworkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Bridge => "bridge",
        }
    }
}

/// Host and container paths the policy works with
#[derive(Debug, Clone)]
pub struct MountDefaults {
    pub container_home: String,
    pub workspace_dir: String,
    pub ssh_dir: PathBuf,
    pub x11_socket: String,
    pub wsl_x11_socket: String,
    pub xauthority: PathBuf,
    pub display: String,
    /// Bind `/dev` and run privileged
    pub devices: bool,
}

impl MountDefaults {
    /// Resolve defaults from configuration and the host environment
    pub fn from_config(config: &GlobalConfig) -> Self {
        let paths = &config.paths;
        Self {
            container_home: paths.container_home.clone(),
            workspace_dir: paths.workspace_dir.clone(),
            ssh_dir: paths.ssh_dir(),
            x11_socket: paths.x11_socket.clone(),
            wsl_x11_socket: paths.wsl_x11_socket.clone(),
            xauthority: paths.xauthority(),
            display: std::env::var("DISPLAY")
                .ok()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| ":0".to_string()),
            devices: config.defaults.devices.unwrap_or(true),
        }
    }

    /// Where the workspace is bound inside the container
    pub fn workspace_target(&self) -> String {
        format!(
            "{}/{}",
            self.container_home.trim_end_matches('/'),
            self.workspace_dir
        )
    }

    /// Where the SSH directory is bound inside the container
    pub fn ssh_target(&self) -> String {
        format!("{}/.ssh", self.container_home.trim_end_matches('/'))
    }
}

/// What the caller asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRequest {
    pub workspace: Option<PathBuf>,
    pub ssh: bool,
    pub display: bool,
    pub host_network: bool,
}

impl Default for MountRequest {
    fn default() -> Self {
        Self {
            workspace: None,
            ssh: false,
            display: true,
            host_network: true,
        }
    }
}

impl MountRequest {
    /// Recover the request that produced an existing container
    pub fn from_details(details: &ContainerDetails, defaults: &MountDefaults) -> Self {
        let workspace_target = defaults.workspace_target();
        let ssh_target = defaults.ssh_target();

        Self {
            workspace: details
                .mounts
                .iter()
                .find(|m| m.destination == workspace_target)
                .map(|m| PathBuf::from(&m.source)),
            ssh: details.mounts.iter().any(|m| m.destination == ssh_target),
            display: details
                .mounts
                .iter()
                .any(|m| m.destination == X11_SOCKET_TARGET),
            host_network: details.network_mode.as_deref() == Some("host"),
        }
    }
}

/// Mounts, environment and runtime flags for one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPolicy {
    pub mounts: Vec<MountConfig>,
    pub env: HashMap<String, String>,
    pub network_mode: NetworkMode,
    pub privileged: bool,
}

/// Builds a [`MountPolicy`] for a host profile
#[derive(Debug, Clone)]
pub struct MountPolicyBuilder {
    host_os: HostOs,
    defaults: MountDefaults,
}

impl MountPolicyBuilder {
    pub fn new(host_os: HostOs, defaults: MountDefaults) -> Self {
        Self { host_os, defaults }
    }

    pub fn defaults(&self) -> &MountDefaults {
        &self.defaults
    }

    /// Build the policy. Mount order is workspace, SSH, X11 socket,
    /// XAUTHORITY, `/dev`.
    pub fn build(&self, request: &MountRequest) -> Result<MountPolicy> {
        let mut mounts = Vec::new();
        let mut env = HashMap::new();

        if let Some(workspace) = &request.workspace {
            let source = absolute_workspace(workspace)?;
            let mut mount = MountConfig::bind(
                source.to_string_lossy(),
                self.defaults.workspace_target(),
                false,
            );
            if self.host_os == HostOs::Linux {
                mount = mount.with_propagation(MountPropagation::RSlave);
            }
            mounts.push(mount);
        }

        if request.ssh {
            if self.defaults.ssh_dir.is_dir() {
                mounts.push(MountConfig::bind(
                    self.defaults.ssh_dir.to_string_lossy(),
                    self.defaults.ssh_target(),
                    true,
                ));
            } else {
                tracing::debug!(
                    "SSH directory {:?} not found, skipping mount",
                    self.defaults.ssh_dir
                );
            }
        }

        if request.display {
            match self.host_os {
                HostOs::Linux => {
                    mounts.push(MountConfig::bind(
                        &self.defaults.x11_socket,
                        X11_SOCKET_TARGET,
                        false,
                    ));
                    if self.defaults.xauthority.is_file() {
                        mounts.push(MountConfig::bind(
                            self.defaults.xauthority.to_string_lossy(),
                            XAUTHORITY_TARGET,
                            true,
                        ));
                        env.insert("XAUTHORITY".to_string(), XAUTHORITY_TARGET.to_string());
                    } else {
                        tracing::debug!(
                            "XAUTHORITY file {:?} not found, skipping mount",
                            self.defaults.xauthority
                        );
                    }
                }
                HostOs::Windows => {
                    mounts.push(MountConfig::bind(
                        &self.defaults.wsl_x11_socket,
                        X11_SOCKET_TARGET,
                        false,
                    ));
                }
            }
            env.insert("DISPLAY".to_string(), self.defaults.display.clone());
        }

        if self.defaults.devices {
            mounts.push(MountConfig::bind("/dev", "/dev", false));
        }

        Ok(MountPolicy {
            mounts,
            env,
            network_mode: if request.host_network {
                NetworkMode::Host
            } else {
                NetworkMode::Bridge
            },
            privileged: self.defaults.devices,
        })
    }
}

fn absolute_workspace(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    if !absolute.exists() {
        return Err(CoreError::PreconditionFailed(format!(
            "Workspace path does not exist: {}",
            absolute.display()
        )));
    }
    Ok(absolute)
}
