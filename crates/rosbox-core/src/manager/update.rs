//! In-place image refresh for an existing box

use super::{backend_id, BoxManager};
use crate::{is_current, CoreError, MountRequest, Result};
use rosbox_provider::Operation;
use tokio::sync::mpsc;

/// Result of `BoxManager::update`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The box already runs the registry's latest image
    UpToDate { reference: String },
    /// The box was recreated from a fresh pull
    Updated { reference: String, restarted: bool },
}

impl BoxManager {
    /// Recreate a box from the latest version of its image.
    ///
    /// The replacement is created before the old container is torn down. The
    /// old container is moved aside under `<name>_stale` while the
    /// replacement takes its name, and is renamed back if creation fails.
    pub async fn update(
        &self,
        name: &str,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> Result<UpdateOutcome> {
        let id = self.box_id(name)?;
        self.require_operation(Operation::Update)?;
        let old = self.require(&id).await?;
        let reference = old.image.clone();

        // The tag may have moved since the box was created, so check the
        // image the container actually runs.
        let running = if old.image_id.is_empty() {
            reference.as_str()
        } else {
            old.image_id.as_str()
        };
        let current = is_current(self.provider.as_ref(), running, &reference)
            .await
            .map_err(|e| {
                CoreError::OperationFailed(format!(
                    "Could not check {} for updates: {}",
                    reference, e
                ))
            })?;
        if current {
            tracing::info!("Box {} is up to date", id.display_name());
            return Ok(UpdateOutcome::UpToDate { reference });
        }

        tracing::info!("Pulling {}", reference);
        self.provider
            .pull_with_progress(&reference, progress.cloned())
            .await?;

        let request = MountRequest::from_details(&old, self.mounts.defaults());
        let policy = self.mounts.build(&request)?;
        let config = self.container_config(&id, &reference, &policy, None);

        let was_running = old.status.is_running();
        let backend_name = id.backend_name();
        let stale_name = format!("{}_stale", backend_name);

        self.provider.rename(&old.id, &stale_name).await?;

        let new_id = match self.provider.create(&config).await {
            Ok(new_id) => new_id,
            Err(e) => {
                if let Err(restore) = self.provider.rename(&old.id, &backend_name).await {
                    tracing::warn!(
                        "Could not rename {} back to {}: {}",
                        stale_name,
                        backend_name,
                        restore
                    );
                }
                return Err(e.into());
            }
        };
        tracing::debug!("Created replacement container {}", new_id.short());

        if was_running {
            self.provider.stop(&old.id, None).await?;
        }
        self.provider.remove(&old.id, false).await?;

        if was_running {
            self.provider.start(&backend_id(&id)).await?;
        }

        tracing::info!("Updated box {}", id.display_name());
        Ok(UpdateOutcome::Updated {
            reference,
            restarted: was_running,
        })
    }
}
