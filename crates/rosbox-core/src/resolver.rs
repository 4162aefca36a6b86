//! Image resolution
//!
//! Maps a logical image name plus a mode onto the concrete reference a box
//! is created from.

use crate::{CoreError, Result};
use rosbox_config::{ImageRegistry, LogicalImage};
use rosbox_provider::{ContainerProvider, Operation, ProviderError};
use tokio::sync::mpsc;

/// How the caller wants the image picked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Use the caller's string verbatim
    Custom,
    /// Use the locally built tag, which must already exist
    BuildLocal,
    /// Use the registry reference, pulling or refreshing as needed
    PullDefault,
}

/// Where a resolved image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOrigin {
    Custom,
    LocalBuild,
    RegistryPull,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub reference: String,
    pub origin: ImageOrigin,
}

/// Resolves logical image names against a backend's image store
pub struct ImageResolver<'a> {
    provider: &'a dyn ContainerProvider,
    registry: &'a ImageRegistry,
}

impl<'a> ImageResolver<'a> {
    pub fn new(provider: &'a dyn ContainerProvider, registry: &'a ImageRegistry) -> Self {
        Self { provider, registry }
    }

    /// Look up a logical image, failing with the list of known names
    pub fn lookup(&self, name: &str) -> Result<&'a LogicalImage> {
        self.registry
            .get(name)
            .ok_or_else(|| CoreError::UnknownImage {
                name: name.to_string(),
                known: self.registry.names(),
            })
    }

    pub async fn resolve(
        &self,
        image: &str,
        mode: ResolveMode,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> Result<ResolvedImage> {
        match mode {
            ResolveMode::Custom => Ok(ResolvedImage {
                reference: image.to_string(),
                origin: ImageOrigin::Custom,
            }),
            ResolveMode::BuildLocal => self.resolve_local(self.lookup(image)?).await,
            ResolveMode::PullDefault => self.resolve_registry(self.lookup(image)?, progress).await,
        }
    }

    async fn resolve_local(&self, image: &LogicalImage) -> Result<ResolvedImage> {
        let resolved = ResolvedImage {
            reference: image.built_tag.clone(),
            origin: ImageOrigin::LocalBuild,
        };

        if !self.provider.supports(Operation::ImageStore) {
            tracing::debug!(
                "Backend has no image store, using {} unchecked",
                resolved.reference
            );
            return Ok(resolved);
        }

        if !self.provider.image_exists(&image.built_tag).await? {
            return Err(CoreError::ImageNotBuilt {
                name: image.name.clone(),
                tag: image.built_tag.clone(),
            });
        }

        Ok(resolved)
    }

    async fn resolve_registry(
        &self,
        image: &LogicalImage,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> Result<ResolvedImage> {
        let reference = &image.registry_reference;
        let resolved = ResolvedImage {
            reference: reference.clone(),
            origin: ImageOrigin::RegistryPull,
        };

        if !self.provider.supports(Operation::ImageStore) {
            tracing::debug!(
                "Backend has no image store, it will pull {} on create",
                reference
            );
            return Ok(resolved);
        }

        if !self.provider.image_exists(reference).await? {
            tracing::info!("Pulling {}", reference);
            self.provider
                .pull_with_progress(reference, progress.cloned())
                .await?;
            return Ok(resolved);
        }

        match self.refresh(reference, progress).await {
            Ok(true) => tracing::info!("Updated {} to the latest version", reference),
            Ok(false) => tracing::debug!("{} is up to date", reference),
            Err(e) => tracing::warn!(
                "Could not check {} for updates, using the local image: {}",
                reference,
                e
            ),
        }

        Ok(resolved)
    }

    /// Pull `reference` if the registry has a newer digest. Returns whether a
    /// pull happened.
    async fn refresh(
        &self,
        reference: &str,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> std::result::Result<bool, ProviderError> {
        if !self.provider.supports(Operation::Freshness) {
            return Ok(false);
        }
        if is_current(self.provider, reference, reference).await? {
            return Ok(false);
        }
        self.provider
            .pull_with_progress(reference, progress.cloned())
            .await?;
        Ok(true)
    }
}

/// Whether the local image `local` (a tag or an image ID) carries the
/// registry's current digest for `reference`
pub async fn is_current(
    provider: &dyn ContainerProvider,
    local: &str,
    reference: &str,
) -> std::result::Result<bool, ProviderError> {
    let digests = provider.local_digests(local).await?;
    let remote = provider.remote_digest(reference).await?;
    tracing::debug!("{} ({}): local {:?}, remote {}", reference, local, digests, remote);
    Ok(digest_matches(&digests, &remote))
}

/// Compare local repo digests (`repo@sha256:...`) with a registry digest
pub fn digest_matches(local: &[String], remote: &str) -> bool {
    local.iter().any(|entry| {
        let digest = entry.rsplit_once('@').map(|(_, d)| d).unwrap_or(entry);
        digest == remote
    })
}
