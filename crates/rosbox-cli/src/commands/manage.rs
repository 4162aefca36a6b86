//! Management commands: list, images, build, ibuilder, config

use anyhow::{bail, Context, Result};
use dialoguer::{theme::ColorfulTheme, MultiSelect, Select};
use rosbox_config::{GlobalConfig, ImageRegistry, LogicalImage};
use rosbox_core::template::{self, TemplateCatalog};
use rosbox_core::{BoxManager, CoreError};
use rosbox_provider::{ContainerStatus, Operation};
use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::Path;

use super::with_progress;

/// List boxes
pub async fn list(manager: &BoxManager, json: bool) -> Result<()> {
    if json {
        let rows = list_json(manager).await?;
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let boxes = manager.list().await?;
    if boxes.is_empty() {
        println!("No boxes found.");
        println!("\nUse 'rosbox create <image> <name>' to create one.");
        return Ok(());
    }

    // Column widths
    const NAME_WIDTH: usize = 24;
    const STATUS_WIDTH: usize = 12;
    const ID_WIDTH: usize = 14;

    println!(
        "  {:<NAME_WIDTH$} {:<STATUS_WIDTH$} {:<ID_WIDTH$} IMAGE",
        "NAME", "STATUS", "ID"
    );
    println!("{}", "-".repeat(80));

    for b in boxes {
        let status_symbol = match b.status {
            ContainerStatus::Running => "●",
            ContainerStatus::Created => "◔",
            ContainerStatus::Paused | ContainerStatus::Restarting => "◐",
            ContainerStatus::Exited => "○",
            ContainerStatus::Removing | ContainerStatus::Dead => "✗",
            ContainerStatus::Unknown => "?",
        };

        println!(
            "{} {:<NAME_WIDTH$} {:<STATUS_WIDTH$} {:<ID_WIDTH$} {}",
            status_symbol,
            b.id.display_name(),
            b.status.to_string(),
            b.container_id.short(),
            b.image
        );
    }

    Ok(())
}

/// Managed boxes with the options each was created with, as JSON rows
pub async fn list_json(manager: &BoxManager) -> Result<serde_json::Value> {
    let mut rows = Vec::new();
    for b in manager.list().await? {
        let details = manager.inspect(b.id.display_name()).await?;
        rows.push(serde_json::json!({
            "name": details.info.id.display_name(),
            "id": details.info.container_id.short(),
            "status": details.info.status.to_string(),
            "image": details.info.image,
            "workspace": details.workspace,
            "ssh": details.ssh,
            "display": details.display,
            "host_network": details.host_network,
            "privileged": details.privileged,
        }));
    }
    Ok(serde_json::Value::Array(rows))
}

/// List logical images and whether they are present on the backend
pub async fn images(manager: &BoxManager) -> Result<()> {
    let registry = manager.registry();
    if registry.is_empty() {
        println!("No images configured.");
        return Ok(());
    }

    let check_local = manager.provider().supports(Operation::ImageStore);

    const NAME_WIDTH: usize = 12;
    const TAG_WIDTH: usize = 20;
    const REF_WIDTH: usize = 44;

    println!(
        "{:<NAME_WIDTH$} {:<TAG_WIDTH$} {:<REF_WIDTH$} LOCAL",
        "NAME", "BUILT TAG", "REGISTRY"
    );
    println!("{}", "-".repeat(90));

    for image in registry.iter() {
        let local = if check_local {
            let mut present = Vec::new();
            if manager.provider().image_exists(&image.built_tag).await? {
                present.push("built");
            }
            if manager
                .provider()
                .image_exists(&image.registry_reference)
                .await?
            {
                present.push("pulled");
            }
            if present.is_empty() {
                "-".to_string()
            } else {
                present.join(", ")
            }
        } else {
            "n/a".to_string()
        };

        println!(
            "{:<NAME_WIDTH$} {:<TAG_WIDTH$} {:<REF_WIDTH$} {}",
            image.name, image.built_tag, image.registry_reference, local
        );
    }

    if !check_local {
        println!(
            "\nThe {} backend has no local image store to check.",
            manager.provider_type()
        );
    }

    Ok(())
}

/// Build a logical image. Backends that cannot build get the composed
/// Dockerfile written to the current directory instead.
pub async fn build(manager: &BoxManager, image: Option<String>, no_cache: bool) -> Result<()> {
    let name = select_image(manager.registry(), image)?;
    let image = lookup(manager.registry(), &name)?;
    let catalog = load_catalog(manager.config())?;

    if !manager.provider().supports(Operation::Build) {
        println!(
            "The {} backend cannot build images, writing the Dockerfile only",
            manager.provider_type()
        );
        return write_dockerfile(&catalog, image, Path::new(template::DOCKERFILE));
    }

    build_with_catalog(manager, &catalog, image, no_cache).await
}

/// Templates picked for an image that is not in the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeChoice {
    pub base: String,
    pub variant: String,
    pub entrypoint: String,
    pub extensions: Vec<String>,
}

impl Default for RecipeChoice {
    fn default() -> Self {
        Self {
            base: "universal".to_string(),
            variant: "ros-desktop".to_string(),
            entrypoint: "rosbox".to_string(),
            extensions: Vec::new(),
        }
    }
}

/// Image made from `choice`, built and referenced under `name` itself
pub fn custom_image(name: &str, choice: RecipeChoice) -> LogicalImage {
    LogicalImage {
        name: name.to_string(),
        base_template: choice.base,
        variant_template: choice.variant,
        entrypoint_template: choice.entrypoint,
        extensions: choice.extensions,
        built_tag: name.to_string(),
        registry_reference: name.to_string(),
    }
}

/// Compose a Dockerfile from picked templates, write it to `output` and
/// build it tagged `name`.
///
/// Templates are asked for on the terminal unless `choice` is given. Without
/// a backend, or with one that cannot build, only the Dockerfile is written.
pub async fn ibuilder(
    config: &GlobalConfig,
    manager: Option<&BoxManager>,
    name: &str,
    choice: Option<RecipeChoice>,
    output: &Path,
) -> Result<()> {
    let catalog = load_catalog(config)?;
    let choice = match choice {
        Some(choice) => choice,
        None => pick_recipe(&catalog)?,
    };
    tracing::debug!("Custom image {}: {:?}", name, choice);

    let image = custom_image(name, choice);
    write_dockerfile(&catalog, &image, output)?;

    let Some(manager) = manager else {
        return Ok(());
    };
    if !manager.provider().supports(Operation::Build) {
        println!(
            "The {} backend cannot build images, skipping the build",
            manager.provider_type()
        );
        return Ok(());
    }
    build_with_catalog(manager, &catalog, &image, false).await
}

/// Compose the Dockerfile of a logical image and write it to `output`
/// without building
pub fn write_recipe(config: &GlobalConfig, image: Option<String>, output: &Path) -> Result<()> {
    let registry = ImageRegistry::from_config(config);
    let name = select_image(&registry, image)?;
    let image = lookup(&registry, &name)?;
    let catalog = load_catalog(config)?;
    write_dockerfile(&catalog, image, output)
}

/// Show the config file location and the effective configuration
pub fn config(config: &GlobalConfig) -> Result<()> {
    let config_path = GlobalConfig::config_path()?;

    if config_path.exists() {
        println!("# Config file: {:?}\n", config_path);
    } else {
        println!("# Config file: {:?} (not created yet)\n", config_path);
    }
    println!("{}", config.to_toml()?);

    Ok(())
}

fn lookup<'a>(registry: &'a ImageRegistry, name: &str) -> Result<&'a LogicalImage> {
    registry
        .get(name)
        .ok_or_else(|| {
            CoreError::UnknownImage {
                name: name.to_string(),
                known: registry.names(),
            }
            .into()
        })
}

fn load_catalog(config: &GlobalConfig) -> Result<TemplateCatalog> {
    let root = config.paths.templates_dir()?;
    tracing::debug!("Loading templates from {}", root.display());
    Ok(TemplateCatalog::load(&root)?)
}

fn write_dockerfile(catalog: &TemplateCatalog, image: &LogicalImage, output: &Path) -> Result<()> {
    let recipe = catalog.compose(image)?;
    std::fs::write(output, recipe)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let shown = std::path::absolute(output).unwrap_or_else(|_| output.to_path_buf());
    println!("Wrote Dockerfile for '{}' to {}", image.name, shown.display());
    Ok(())
}

async fn build_with_catalog(
    manager: &BoxManager,
    catalog: &TemplateCatalog,
    image: &LogicalImage,
    no_cache: bool,
) -> Result<()> {
    if no_cache {
        println!("Building '{}' as {} (no cache)...", image.name, image.built_tag);
    } else {
        println!("Building '{}' as {}...", image.name, image.built_tag);
    }

    let labels = HashMap::from([(
        "type".to_string(),
        manager.config().naming.label.clone(),
    )]);
    let image_id = with_progress(|tx| async move {
        template::build_image(manager.provider(), catalog, image, labels, no_cache, tx).await
    })
    .await?;

    println!("Built image: {}", image_id);
    Ok(())
}

/// Ask for a generation method, then for each template when it is "custom"
fn pick_recipe(catalog: &TemplateCatalog) -> Result<RecipeChoice> {
    if !std::io::stdin().is_terminal() {
        bail!("Picking templates needs an interactive terminal");
    }

    let theme = ColorfulTheme::default();
    let method = Select::with_theme(&theme)
        .with_prompt("Choose a generation method")
        .items(&["default", "custom"])
        .default(0)
        .interact()?;
    let defaults = RecipeChoice::default();
    if method == 0 {
        return Ok(defaults);
    }

    let base = pick_one(&theme, "Choose a base template", &catalog.bases(), &defaults.base)?;
    let variant = pick_one(&theme, "Choose a ROS template", &catalog.variants(), &defaults.variant)?;
    let entrypoint = pick_one(
        &theme,
        "Choose an entrypoint template",
        &catalog.entrypoints(),
        &defaults.entrypoint,
    )?;

    let available = catalog.extensions();
    let extensions = if available.is_empty() {
        Vec::new()
    } else {
        MultiSelect::with_theme(&theme)
            .with_prompt("Choose extensions (space to select)")
            .items(&available)
            .interact()?
            .into_iter()
            .map(|i| available[i].to_string())
            .collect()
    };

    Ok(RecipeChoice {
        base,
        variant,
        entrypoint,
        extensions,
    })
}

/// Single choice out of `keys`, with `preferred` preselected when present
fn pick_one(theme: &ColorfulTheme, prompt: &str, keys: &[&str], preferred: &str) -> Result<String> {
    if keys.is_empty() {
        bail!("No templates to choose from for: {}", prompt);
    }
    let selection = Select::with_theme(theme)
        .with_prompt(prompt)
        .items(keys)
        .default(keys.iter().position(|k| *k == preferred).unwrap_or(0))
        .interact()?;
    Ok(keys[selection].to_string())
}

/// Use the given image name, or ask for one on a terminal
fn select_image(registry: &ImageRegistry, image: Option<String>) -> Result<String> {
    if let Some(name) = image {
        return Ok(name);
    }

    let names = registry.names();
    if names.is_empty() {
        bail!("No images configured");
    }
    if !std::io::stdin().is_terminal() {
        bail!("No image specified. Known images: {}", names.join(", "));
    }

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select image to build")
        .items(&names)
        .default(0)
        .interact()?;

    Ok(names[selection].clone())
}
