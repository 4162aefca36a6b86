//! Lifecycle commands: create, update, start, stop, enter, remove

use anyhow::{bail, Context, Result};
use rosbox_core::{BoxManager, CoreError, CreateRequest, MountRequest, ResolveMode, UpdateOutcome};
use rosbox_provider::Operation;
use std::path::PathBuf;

use super::with_progress;

/// Arguments of `rosbox create`
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Logical image name, or an image reference in `Custom` mode
    pub image: String,
    pub name: String,
    pub mode: ResolveMode,
    pub workspace: Option<PathBuf>,
    pub start: bool,
    pub ssh: bool,
    pub host_network: bool,
    pub home: Option<String>,
}

/// Create a box
pub async fn create(manager: &BoxManager, options: &CreateOptions) -> Result<()> {
    // Checked before resolving so a taken name never triggers a pull
    if manager.exists(&options.name).await? {
        return Err(CoreError::NameAlreadyExists(options.name.clone()).into());
    }

    let image = with_progress(|tx| async move {
        manager
            .resolve_image(&options.image, options.mode, Some(&tx))
            .await
    })
    .await?;

    println!("Creating '{}' from {}...", options.name, image.reference);
    let request = CreateRequest {
        name: options.name.clone(),
        image,
        mounts: MountRequest {
            workspace: options.workspace.clone(),
            ssh: options.ssh,
            display: manager.config().defaults.display,
            host_network: options.host_network,
        },
        home: options.home.clone(),
        start: options.start,
    };
    let id = manager.create(&request).await?;
    println!("Created '{}' ({})", options.name, id.short());

    if options.start && manager.provider().supports(Operation::Start) {
        println!("Started '{}'", options.name);
    }

    Ok(())
}

/// Recreate a box from the latest registry image
pub async fn update(manager: &BoxManager, name: &str) -> Result<()> {
    println!("Checking '{}' for updates...", name);
    let outcome = with_progress(|tx| async move { manager.update(name, Some(&tx)).await }).await?;

    match outcome {
        UpdateOutcome::UpToDate { reference } => {
            println!("'{}' is up to date ({})", name, reference);
        }
        UpdateOutcome::Updated {
            reference,
            restarted,
        } => {
            println!("Updated '{}' to the latest {}", name, reference);
            if restarted {
                println!("Restarted '{}'", name);
            }
        }
    }

    Ok(())
}

/// Start a box
pub async fn start(manager: &BoxManager, name: &str) -> Result<()> {
    println!("Starting '{}'...", name);
    manager.start(name).await?;
    println!("Started '{}'", name);
    Ok(())
}

/// Stop a box
pub async fn stop(manager: &BoxManager, name: &str) -> Result<()> {
    println!("Stopping '{}'...", name);
    manager.stop(name).await?;
    println!("Stopped '{}'", name);
    Ok(())
}

/// Open the configured shell in a box. Returns the shell's exit code.
pub async fn enter(manager: &BoxManager, name: &str) -> Result<i32> {
    let configured = &manager.config().defaults.shell;
    let shell = shell_words::split(configured)
        .with_context(|| format!("Invalid shell command '{}'", configured))?;
    if shell.is_empty() {
        bail!("No shell configured (set defaults.shell)");
    }

    let code = manager.enter(name, &shell).await?;
    if code != 0 {
        tracing::debug!("Shell in '{}' exited with code {}", name, code);
    }
    Ok(code)
}

/// Remove a box
pub async fn remove(manager: &BoxManager, name: &str) -> Result<()> {
    println!("Removing '{}'...", name);
    manager.remove(name).await?;
    println!("Removed '{}'", name);
    Ok(())
}
