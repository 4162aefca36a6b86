//! Build recipe composition
//!
//! A recipe is a base template with three placeholders filled in: the ROS
//! install variant, the entrypoint setup and the extension snippets.
//!
//! Layout of the template root:
//!
//! ```text
//! base_templates/Dockerfile.<key>.jinja
//! variant_templates/Dockerfile.<key>.template
//! entrypoints_templates/Dockerfile.<key>.template
//! entrypoints_templates/*.sh
//! extensions.json
//! ```

use crate::{CoreError, Result};
use rosbox_config::LogicalImage;
use rosbox_provider::{BuildConfig, ContainerProvider, ImageId, Operation};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

const BASE_DIR: &str = "base_templates";
const VARIANT_DIR: &str = "variant_templates";
const ENTRYPOINT_DIR: &str = "entrypoints_templates";
const EXTENSIONS_FILE: &str = "extensions.json";

/// Dockerfile name inside a generated build context
pub const DOCKERFILE: &str = "Dockerfile";

#[derive(Debug, Deserialize)]
struct ExtensionsFile {
    #[serde(default)]
    template_extensions: BTreeMap<String, ExtensionSpec>,
}

#[derive(Debug, Deserialize)]
struct ExtensionSpec {
    #[serde(default)]
    commands: Vec<String>,
}

/// Templates available under a template root
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    root: PathBuf,
    bases: BTreeMap<String, PathBuf>,
    variants: BTreeMap<String, PathBuf>,
    entrypoints: BTreeMap<String, PathBuf>,
    /// Extension key -> rendered `RUN` lines
    extensions: BTreeMap<String, String>,
}

impl TemplateCatalog {
    /// Scan a template root
    pub fn load(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(CoreError::Template(format!(
                "Template directory not found: {}",
                root.display()
            )));
        }

        let catalog = Self {
            root: root.to_path_buf(),
            bases: scan(&root.join(BASE_DIR), ".jinja")?,
            variants: scan(&root.join(VARIANT_DIR), ".template")?,
            entrypoints: scan(&root.join(ENTRYPOINT_DIR), ".template")?,
            extensions: load_extensions(&root.join(EXTENSIONS_FILE))?,
        };

        tracing::debug!(
            "Loaded templates from {:?}: {} base, {} variant, {} entrypoint, {} extension",
            root,
            catalog.bases.len(),
            catalog.variants.len(),
            catalog.entrypoints.len(),
            catalog.extensions.len()
        );

        Ok(catalog)
    }

    pub fn bases(&self) -> Vec<&str> {
        self.bases.keys().map(String::as_str).collect()
    }

    pub fn variants(&self) -> Vec<&str> {
        self.variants.keys().map(String::as_str).collect()
    }

    pub fn entrypoints(&self) -> Vec<&str> {
        self.entrypoints.keys().map(String::as_str).collect()
    }

    pub fn extensions(&self) -> Vec<&str> {
        self.extensions.keys().map(String::as_str).collect()
    }

    /// Render the build recipe for `image`
    pub fn compose(&self, image: &LogicalImage) -> Result<String> {
        let base = read_template(&self.bases, "base", &image.base_template)?;
        let variant = read_template(&self.variants, "variant", &image.variant_template)?;
        let entrypoint =
            read_template(&self.entrypoints, "entrypoint", &image.entrypoint_template)?;

        let mut extensions = String::new();
        for key in &image.extensions {
            let snippet = self
                .extensions
                .get(key)
                .ok_or_else(|| missing("extension", key, self.extensions.keys()))?;
            extensions.push_str(snippet);
        }

        Ok(render(
            &base,
            &HashMap::from([
                ("ros_install", variant.as_str()),
                ("entrypoint_setup", entrypoint.as_str()),
                ("extensions_install", extensions.as_str()),
            ]),
        ))
    }

    /// Write a complete build context for `image` into `dir`: the composed
    /// recipe plus the entrypoint scripts it copies in.
    pub fn write_build_context(&self, image: &LogicalImage, dir: &Path) -> Result<()> {
        std::fs::write(dir.join(DOCKERFILE), self.compose(image)?)?;

        let scripts = self.root.join(ENTRYPOINT_DIR);
        for entry in std::fs::read_dir(&scripts)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "sh") {
                if let Some(name) = path.file_name() {
                    std::fs::copy(&path, dir.join(name))?;
                }
            }
        }

        Ok(())
    }
}

/// Compose and build `image` under its built tag
pub async fn build_image(
    provider: &dyn ContainerProvider,
    catalog: &TemplateCatalog,
    image: &LogicalImage,
    labels: HashMap<String, String>,
    no_cache: bool,
    progress: mpsc::UnboundedSender<String>,
) -> Result<ImageId> {
    if !provider.supports(Operation::Build) {
        return Err(CoreError::UnsupportedOperation(format!(
            "{} backend cannot build images",
            provider.info().provider_type
        )));
    }

    let context = tempfile::tempdir()?;
    catalog.write_build_context(image, context.path())?;

    tracing::info!("Building {} as {}", image.name, image.built_tag);
    let config = BuildConfig {
        context: context.path().to_path_buf(),
        dockerfile: DOCKERFILE.to_string(),
        tag: image.built_tag.clone(),
        labels,
        no_cache,
    };

    Ok(provider.build_with_progress(&config, progress).await?)
}

/// Map `Dockerfile.<key><ext>` files of `dir` to their keys
fn scan(dir: &Path, ext: &str) -> Result<BTreeMap<String, PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        CoreError::Template(format!("Cannot read {}: {}", dir.display(), e))
    })?;

    let mut found = BTreeMap::new();
    for entry in entries {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(key) = file_name
            .strip_suffix(ext)
            .map(|stem| stem.strip_prefix("Dockerfile.").unwrap_or(stem))
        {
            found.insert(key.to_string(), path.clone());
        }
    }
    Ok(found)
}

fn load_extensions(path: &Path) -> Result<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content = std::fs::read_to_string(path)?;
    let file: ExtensionsFile = serde_json::from_str(&content).map_err(|e| {
        CoreError::Template(format!("Invalid {}: {}", path.display(), e))
    })?;

    Ok(file
        .template_extensions
        .into_iter()
        .map(|(key, spec)| {
            let lines: String = spec
                .commands
                .iter()
                .map(|cmd| format!("RUN {}\n", cmd))
                .collect();
            (key, lines)
        })
        .collect())
}

fn read_template(templates: &BTreeMap<String, PathBuf>, kind: &str, key: &str) -> Result<String> {
    let path = templates
        .get(key)
        .ok_or_else(|| missing(kind, key, templates.keys()))?;
    Ok(std::fs::read_to_string(path)?)
}

fn missing<'a>(kind: &str, key: &str, available: impl Iterator<Item = &'a String>) -> CoreError {
    let available: Vec<&str> = available.map(String::as_str).collect();
    CoreError::Template(format!(
        "No {} template '{}'. Available: {}",
        kind,
        key,
        available.join(", ")
    ))
}

/// Substitute `{{ name }}` placeholders. Unknown placeholders are kept as-is.
pub fn render(template: &str, values: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match values.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use rosbox_provider::ProviderType;

    fn write(path: PathBuf, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn template_root() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        write(
            root.join("base_templates/Dockerfile.universal.jinja"),
            "FROM ubuntu:22.04\n{{ ros_install }}\n{{extensions_install}}\n{{  entrypoint_setup }}\nLABEL note=\"{{ other }}\"\n",
        );
        write(
            root.join("variant_templates/Dockerfile.ros-desktop.template"),
            "RUN apt-get install -y ros-humble-desktop",
        );
        write(
            root.join("entrypoints_templates/Dockerfile.rosbox.template"),
            "COPY entrypoint.sh /\nENTRYPOINT [\"/entrypoint.sh\"]",
        );
        write(root.join("entrypoints_templates/entrypoint.sh"), "#!/bin/bash\nexec \"$@\"\n");
        write(
            root.join("extensions.json"),
            r#"{"template_extensions": {"nav": {"commands": ["apt-get update", "apt-get install -y ros-humble-nav2"]}}}"#,
        );
        tmp
    }

    fn image(extensions: &[&str]) -> LogicalImage {
        LogicalImage {
            name: "desktop".to_string(),
            base_template: "universal".to_string(),
            variant_template: "ros-desktop".to_string(),
            entrypoint_template: "rosbox".to_string(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            built_tag: "rosbox-desktop".to_string(),
            registry_reference: "docker.io/sterren642/rosbox:desktop-latest".to_string(),
        }
    }

    #[test]
    fn test_render_tolerates_whitespace_and_keeps_unknown() {
        let values = HashMap::from([("a", "1"), ("b", "2")]);
        assert_eq!(render("x{{a}}y{{ b }}z", &values), "x1y2z");
        assert_eq!(render("{{ c }} {{a", &values), "{{ c }} {{a");
    }

    #[test]
    fn test_catalog_scan() {
        let tmp = template_root();
        let catalog = TemplateCatalog::load(tmp.path()).unwrap();
        assert_eq!(catalog.bases(), vec!["universal"]);
        assert_eq!(catalog.variants(), vec!["ros-desktop"]);
        assert_eq!(catalog.entrypoints(), vec!["rosbox"]);
        assert_eq!(catalog.extensions(), vec!["nav"]);
    }

    #[test]
    fn test_compose_substitutes_all_placeholders() {
        let tmp = template_root();
        let catalog = TemplateCatalog::load(tmp.path()).unwrap();
        let recipe = catalog.compose(&image(&["nav"])).unwrap();

        assert!(recipe.starts_with("FROM ubuntu:22.04\nRUN apt-get install -y ros-humble-desktop\n"));
        assert!(recipe.contains("RUN apt-get update\nRUN apt-get install -y ros-humble-nav2\n"));
        assert!(recipe.contains("ENTRYPOINT [\"/entrypoint.sh\"]"));
        assert!(!recipe.contains("ros_install"));
        assert!(!recipe.contains("entrypoint_setup"));
        assert!(!recipe.contains("extensions_install"));
        assert!(recipe.contains("{{ other }}"));
    }

    #[test]
    fn test_compose_missing_key_lists_options() {
        let tmp = template_root();
        let catalog = TemplateCatalog::load(tmp.path()).unwrap();

        let mut bad = image(&[]);
        bad.variant_template = "ros-jazzy".to_string();
        let err = catalog.compose(&bad).unwrap_err().to_string();
        assert!(err.contains("ros-jazzy"));
        assert!(err.contains("ros-desktop"));

        let err = catalog.compose(&image(&["gpu"])).unwrap_err().to_string();
        assert!(err.contains("No extension template 'gpu'"));
        assert!(err.contains("nav"));
    }

    #[test]
    fn test_missing_root_is_template_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = TemplateCatalog::load(&tmp.path().join("nowhere")).unwrap_err();
        assert!(matches!(err, CoreError::Template(_)));
    }

    #[test]
    fn test_write_build_context_copies_scripts() {
        let tmp = template_root();
        let catalog = TemplateCatalog::load(tmp.path()).unwrap();
        let out = tempfile::tempdir().unwrap();

        catalog.write_build_context(&image(&[]), out.path()).unwrap();
        assert!(out.path().join("Dockerfile").is_file());
        assert!(out.path().join("entrypoint.sh").is_file());
        assert!(!out.path().join("Dockerfile.rosbox.template").exists());
    }

    #[tokio::test]
    async fn test_build_image_uses_built_tag() {
        let tmp = template_root();
        let catalog = TemplateCatalog::load(tmp.path()).unwrap();
        let mock = MockProvider::new(ProviderType::Docker);
        let (tx, mut rx) = mpsc::unbounded_channel();

        build_image(&mock, &catalog, &image(&[]), HashMap::new(), false, tx)
            .await
            .unwrap();
        assert!(mock.was_called(&MockCall::Build {
            tag: "rosbox-desktop".to_string()
        }));
        assert!(mock.local_digests_for("rosbox-desktop").is_some());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_build_image_unsupported_backend() {
        let tmp = template_root();
        let catalog = TemplateCatalog::load(tmp.path()).unwrap();
        let mock = MockProvider::new(ProviderType::Distrobox);
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = build_image(&mock, &catalog, &image(&[]), HashMap::new(), false, tx)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedOperation(_)));
        assert!(mock.get_calls().is_empty());
    }
}
