//! Global configuration for rosbox
//!
//! Located at `~/.config/rosbox/config.toml` (or `$ROSBOX_CONFIG_DIR/config.toml`).

use crate::{ConfigError, ImageConfig, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "ROSBOX_CONFIG_DIR";

/// Global rosbox configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub defaults: DefaultsConfig,
    pub naming: NamingConfig,
    pub paths: PathsConfig,
    pub registry: RegistryConfig,
    pub providers: ProvidersConfig,
    /// Extra or overridden logical images, keyed by logical name
    pub images: BTreeMap<String, ImageConfig>,
}

/// Default settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Backend used for every operation ("docker" or "distrobox")
    pub backend: String,
    /// Shell started by `rosbox enter`
    pub shell: String,
    /// Forward the host X11 display into new boxes
    pub display: bool,
    /// Bind `/dev` into new boxes. Unset means "follow the host profile".
    pub devices: Option<bool>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            backend: "docker".to_string(),
            shell: "bash".to_string(),
            display: true,
            devices: None,
        }
    }
}

/// Naming convention for managed containers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Suffix appended to every display name (`<name>_<suffix>`)
    pub suffix: String,
    /// Value of the `type` label placed on every managed container
    pub label: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            suffix: "rosbox".to_string(),
            label: "rosbox".to_string(),
        }
    }
}

/// Host and in-container paths used by the mount policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Home directory of the container user
    pub container_home: String,
    /// Directory under `container_home` where the workspace is bound
    pub workspace_dir: String,
    /// Host SSH directory (supports `~`)
    pub ssh_dir: String,
    /// Template root used by `rosbox build` (defaults to the data dir)
    pub templates_dir: Option<String>,
    /// Host X11 socket directory on Linux
    pub x11_socket: String,
    /// X11 socket directory exposed by WSLg on Windows hosts
    pub wsl_x11_socket: String,
    /// Host XAUTHORITY file (defaults to `$XAUTHORITY`, then `~/.Xauthority`)
    pub xauthority: Option<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            container_home: "/home/ubuntu".to_string(),
            workspace_dir: "ros_ws".to_string(),
            ssh_dir: "~/.ssh".to_string(),
            templates_dir: None,
            x11_socket: "/tmp/.X11-unix".to_string(),
            wsl_x11_socket: "/run/desktop/mnt/host/wslg/.X11-unix".to_string(),
            xauthority: None,
        }
    }
}

impl PathsConfig {
    /// Host SSH directory with `~` expanded
    pub fn ssh_dir(&self) -> PathBuf {
        expand_path(&self.ssh_dir)
    }

    /// Host XAUTHORITY file: explicit setting, then `$XAUTHORITY`, then `~/.Xauthority`
    pub fn xauthority(&self) -> PathBuf {
        match &self.xauthority {
            Some(path) => expand_path(path),
            None => std::env::var("XAUTHORITY")
                .map(PathBuf::from)
                .unwrap_or_else(|_| expand_path("~/.Xauthority")),
        }
    }

    /// Template root with `~` expanded
    pub fn templates_dir(&self) -> Result<PathBuf> {
        match &self.templates_dir {
            Some(dir) => Ok(expand_path(dir)),
            None => Ok(GlobalConfig::data_dir()?.join("templates")),
        }
    }
}

/// Image registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Repository published images live in, one tag per image
    /// (`<repository>:<name>-latest`)
    pub repository: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            repository: "docker.io/sterren642/rosbox".to_string(),
        }
    }
}

/// Backend-specific configurations
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub docker: DockerConfig,
    pub distrobox: DistroboxConfig,
}

/// Docker-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Docker socket path
    pub socket: String,
    /// CLI used for interactive sessions (`<cli> exec -it ...`)
    pub cli: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: default_docker_socket(),
            cli: "docker".to_string(),
        }
    }
}

#[cfg(windows)]
fn default_docker_socket() -> String {
    "//./pipe/docker_engine".to_string()
}

#[cfg(not(windows))]
fn default_docker_socket() -> String {
    "/var/run/docker.sock".to_string()
}

/// Distrobox-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistroboxConfig {
    /// Executable to run
    pub command: String,
    /// Default home directory override for new boxes
    pub home: Option<String>,
}

impl Default for DistroboxConfig {
    fn default() -> Self {
        Self {
            command: "distrobox".to_string(),
            home: None,
        }
    }
}

impl GlobalConfig {
    /// Load global configuration from the default path
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load global configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        tracing::debug!(
            "Loaded config from {:?}: backend={}, {} extra image(s)",
            path,
            config.defaults.backend,
            config.images.len()
        );

        Ok(config)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            return Ok(PathBuf::from(dir).join("config.toml"));
        }
        let dirs = ProjectDirs::from("", "", "rosbox").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path
    pub fn data_dir() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "rosbox").ok_or(ConfigError::NoDataDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GlobalConfig::default();
        assert_eq!(config.defaults.backend, "docker");
        assert_eq!(config.defaults.shell, "bash");
        assert!(config.defaults.display);
        assert_eq!(config.naming.suffix, "rosbox");
        assert_eq!(config.naming.label, "rosbox");
        assert_eq!(config.paths.container_home, "/home/ubuntu");
        assert!(config.images.is_empty());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[defaults]
backend = "distrobox"
shell = "zsh"
display = false

[naming]
suffix = "bx"

[paths]
ssh_dir = "/opt/keys"

[providers.distrobox]
home = "/srv/boxes"

[images.noetic]
base = "focal"
variant = "ros-noetic"
entrypoint = "it"
"#;

        let config: GlobalConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.defaults.backend, "distrobox");
        assert_eq!(config.defaults.shell, "zsh");
        assert!(!config.defaults.display);
        assert_eq!(config.naming.suffix, "bx");
        // untouched fields keep their defaults
        assert_eq!(config.naming.label, "rosbox");
        assert_eq!(config.paths.ssh_dir(), PathBuf::from("/opt/keys"));
        assert_eq!(config.providers.distrobox.home.as_deref(), Some("/srv/boxes"));
        assert_eq!(config.images["noetic"].variant, "ros-noetic");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = GlobalConfig::load_from(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.defaults.backend, "docker");
    }

    #[test]
    fn test_load_invalid_toml_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[defaults\nbackend = ").unwrap();
        let err = GlobalConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParseError { .. }));
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/.ssh");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with(".ssh"));
        assert_eq!(expand_path("/abs/path"), PathBuf::from("/abs/path"));
    }

    #[test]
    fn test_explicit_xauthority_wins() {
        let paths = PathsConfig {
            xauthority: Some("/tmp/custom.xauth".to_string()),
            ..Default::default()
        };
        assert_eq!(paths.xauthority(), PathBuf::from("/tmp/custom.xauth"));
    }

    #[test]
    fn test_roundtrip_to_toml_keeps_backend() {
        let mut config = GlobalConfig::default();
        config.defaults.backend = "distrobox".to_string();
        let rendered = config.to_toml().unwrap();
        let parsed: GlobalConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.defaults.backend, "distrobox");
    }
}
