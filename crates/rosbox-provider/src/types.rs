//! Common types for container providers

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Container ID wrapper. Backends accept either the runtime ID or the
/// container name here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(pub String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        if self.0.len() > 12 {
            &self.0[..12]
        } else {
            &self.0
        }
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ContainerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Image ID wrapper
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageId(pub String);

impl ImageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// Docker Engine API (full lifecycle support)
    Docker,
    /// distrobox CLI (reduced operation set)
    Distrobox,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Docker => write!(f, "docker"),
            Self::Distrobox => write!(f, "distrobox"),
        }
    }
}

impl std::str::FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "docker" | "primary" => Ok(Self::Docker),
            "distrobox" | "secondary" => Ok(Self::Distrobox),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// Optional capabilities a backend may lack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Start,
    Stop,
    Update,
    /// Local/registry digest comparison
    Freshness,
    /// Local image store queries and pulls
    ImageStore,
    Build,
    Rename,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
            Self::Update => write!(f, "update"),
            Self::Freshness => write!(f, "freshness check"),
            Self::ImageStore => write!(f, "image store"),
            Self::Build => write!(f, "build"),
            Self::Rename => write!(f, "rename"),
        }
    }
}

/// Container status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Unknown,
}

impl ContainerStatus {
    /// Parse the human-readable STATUS column of `ps`-style listings
    /// ("Up 3 hours", "Exited (0) 2 days ago", "Created").
    pub fn from_ps_status(s: &str) -> Self {
        let s = s.trim().to_lowercase();
        if s.starts_with("up") {
            if s.contains("paused") {
                Self::Paused
            } else {
                Self::Running
            }
        } else if s.starts_with("exited") {
            Self::Exited
        } else {
            Self::from(s.split_whitespace().next().unwrap_or(""))
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running | Self::Restarting)
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Restarting => write!(f, "restarting"),
            Self::Removing => write!(f, "removing"),
            Self::Exited => write!(f, "exited"),
            Self::Dead => write!(f, "dead"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl From<&str> for ContainerStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" | "stopped" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }
}

/// Build configuration for creating images
#[derive(Debug, Clone, Default)]
pub struct BuildConfig {
    /// Path to the build context
    pub context: PathBuf,
    /// Dockerfile path (relative to context)
    pub dockerfile: String,
    /// Image tag
    pub tag: String,
    /// Labels to apply
    pub labels: HashMap<String, String>,
    /// No cache
    pub no_cache: bool,
}

/// Configuration for creating a container
#[derive(Debug, Clone, Default)]
pub struct CreateContainerConfig {
    /// Image to use
    pub image: String,
    /// Container name
    pub name: String,
    /// Hostname
    pub hostname: Option<String>,
    /// Environment variables
    pub env: HashMap<String, String>,
    /// Bind mounts, in order
    pub mounts: Vec<MountConfig>,
    /// Labels
    pub labels: HashMap<String, String>,
    /// Network mode ("host" or "bridge")
    pub network_mode: Option<String>,
    /// Privileged mode
    pub privileged: bool,
    /// Home directory override (distrobox only)
    pub home: Option<String>,
    /// Allocate TTY
    pub tty: bool,
    /// Keep STDIN open
    pub stdin_open: bool,
}

/// Bind mount configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountConfig {
    /// Host path
    pub source: String,
    /// Target path in container
    pub target: String,
    /// Read-only
    pub read_only: bool,
    /// Bind propagation
    pub propagation: Option<MountPropagation>,
}

impl MountConfig {
    pub fn bind(source: impl Into<String>, target: impl Into<String>, read_only: bool) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only,
            propagation: None,
        }
    }

    pub fn with_propagation(mut self, propagation: MountPropagation) -> Self {
        self.propagation = Some(propagation);
        self
    }
}

/// Bind mount propagation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountPropagation {
    Private,
    RPrivate,
    Shared,
    RShared,
    Slave,
    RSlave,
}

impl std::fmt::Display for MountPropagation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Private => write!(f, "private"),
            Self::RPrivate => write!(f, "rprivate"),
            Self::Shared => write!(f, "shared"),
            Self::RShared => write!(f, "rshared"),
            Self::Slave => write!(f, "slave"),
            Self::RSlave => write!(f, "rslave"),
        }
    }
}

/// Which containers `list` should return
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// `key=value` label every returned container must carry
    pub label: Option<(String, String)>,
    /// Suffix every returned container name must end with
    pub name_suffix: Option<String>,
}

impl ListFilter {
    /// Filter matching containers created by this tool
    pub fn managed(label: &str, suffix: &str) -> Self {
        Self {
            label: Some(("type".to_string(), label.to_string())),
            name_suffix: Some(format!("_{}", suffix)),
        }
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.name_suffix
            .as_deref()
            .map(|suffix| name.ends_with(suffix))
            .unwrap_or(true)
    }
}

/// Basic container info for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    pub labels: HashMap<String, String>,
}

/// Detailed container information
#[derive(Debug, Clone)]
pub struct ContainerDetails {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub image_id: String,
    pub status: ContainerStatus,
    pub labels: HashMap<String, String>,
    pub env: Vec<String>,
    pub mounts: Vec<MountInfo>,
    pub network_mode: Option<String>,
    pub privileged: bool,
}

/// Mount information
#[derive(Debug, Clone)]
pub struct MountInfo {
    pub mount_type: String,
    pub source: String,
    pub destination: String,
    pub read_only: bool,
}

/// Provider information
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub provider_type: ProviderType,
    pub version: String,
    pub api_version: String,
    pub os: String,
    pub arch: String,
}
