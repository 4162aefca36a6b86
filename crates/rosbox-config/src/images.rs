//! Registry of logical images
//!
//! A logical image is a named combination of build templates together with the
//! tag it gets when built locally and the reference it is published under.

use crate::GlobalConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `[images.<name>]` table of the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    pub base: String,
    pub variant: String,
    pub entrypoint: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
    /// Override for the locally built tag (default `rosbox-<name>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub built_tag: Option<String>,
    /// Override for the registry reference (default `<repository>:<name>-latest`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_reference: Option<String>,
}

impl ImageConfig {
    fn new(base: &str, variant: &str, entrypoint: &str) -> Self {
        Self {
            base: base.to_string(),
            variant: variant.to_string(),
            entrypoint: entrypoint.to_string(),
            extensions: Vec::new(),
            built_tag: None,
            registry_reference: None,
        }
    }
}

/// A fully resolved logical image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalImage {
    pub name: String,
    pub base_template: String,
    pub variant_template: String,
    pub entrypoint_template: String,
    pub extensions: Vec<String>,
    pub built_tag: String,
    pub registry_reference: String,
}

/// Immutable name -> image mapping, built once per process
#[derive(Debug, Clone, Default)]
pub struct ImageRegistry {
    images: BTreeMap<String, LogicalImage>,
}

/// Images known without any configuration
fn builtin_images() -> BTreeMap<String, ImageConfig> {
    [
        ("desktop", "universal", "ros-desktop", "rosbox"),
        ("desktopjazzy", "universaljazzy", "ros-desktopjazzy", "rosboxjazzy"),
        ("robot-jetracer", "universal", "ros-base", "rosbox"),
        ("robot-jetank", "universal", "ros-base", "rosbox"),
        ("sim", "universal", "ros-simulation", "rosbox"),
    ]
    .into_iter()
    .map(|(name, base, variant, entrypoint)| {
        (name.to_string(), ImageConfig::new(base, variant, entrypoint))
    })
    .collect()
}

impl ImageRegistry {
    /// Built-in images merged with the `[images]` tables of `config`.
    /// Config entries replace built-ins of the same name.
    pub fn from_config(config: &GlobalConfig) -> Self {
        let mut merged = builtin_images();
        merged.extend(config.images.clone());

        let images = merged
            .into_iter()
            .map(|(name, cfg)| {
                let image = LogicalImage {
                    built_tag: cfg
                        .built_tag
                        .unwrap_or_else(|| format!("rosbox-{}", name)),
                    registry_reference: cfg.registry_reference.unwrap_or_else(|| {
                        format!(
                            "{}:{}-latest",
                            config.registry.repository.trim_end_matches('/'),
                            name
                        )
                    }),
                    name: name.clone(),
                    base_template: cfg.base,
                    variant_template: cfg.variant,
                    entrypoint_template: cfg.entrypoint,
                    extensions: cfg.extensions,
                };
                (name, image)
            })
            .collect();

        Self { images }
    }

    pub fn get(&self, name: &str) -> Option<&LogicalImage> {
        self.images.get(name)
    }

    /// Known logical names, sorted
    pub fn names(&self) -> Vec<String> {
        self.images.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogicalImage> {
        self.images.values()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
