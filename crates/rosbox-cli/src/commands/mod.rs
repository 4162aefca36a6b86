//! CLI command implementations

mod lifecycle;
mod manage;

pub use lifecycle::*;
pub use manage::*;

use anyhow::{anyhow, bail, Result};
use rosbox_config::GlobalConfig;
use rosbox_core::CoreError;
use rosbox_provider::{default_backend, ProviderType};
use std::future::Future;
use tokio::sync::mpsc;

/// Backend named by `--backend`, else by `defaults.backend`. Distrobox is
/// refused on hosts other than Linux (`os` as in `std::env::consts::OS`).
pub fn select_backend(flag: Option<&str>, config: &GlobalConfig, os: &str) -> Result<ProviderType> {
    let provider_type = match flag {
        Some(name) => name.parse().map_err(|e: String| anyhow!(e))?,
        None => default_backend(config).map_err(CoreError::from)?,
    };
    if provider_type == ProviderType::Distrobox && os != "linux" {
        bail!("Distrobox is only supported on Linux");
    }
    Ok(provider_type)
}

/// Run `op` with a progress channel whose lines are printed as they arrive.
/// Returns once `op` has finished and every line has been printed.
async fn with_progress<F, Fut, T>(op: F) -> T
where
    F: FnOnce(mpsc::UnboundedSender<String>) -> Fut,
    Fut: Future<Output = T>,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            println!("  {}", line);
        }
    });

    let result = op(tx).await;
    // `op` owned the sender, so the channel is closed here
    let _ = printer.await;
    result
}
