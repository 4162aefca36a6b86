//! Box manager - coordinates all box operations against one backend

mod update;

pub use update::UpdateOutcome;

use crate::{
    BoxId, CoreError, HostOs, ImageResolver, MountDefaults, MountPolicy, MountPolicyBuilder,
    MountRequest, ResolveMode, ResolvedImage, Result,
};
use rosbox_config::{GlobalConfig, ImageRegistry};
use rosbox_provider::{
    ContainerDetails, ContainerId, ContainerProvider, ContainerStatus, CreateContainerConfig,
    ListFilter, Operation, ProviderError, ProviderType,
};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Main box manager
pub struct BoxManager {
    provider: Box<dyn ContainerProvider>,
    config: GlobalConfig,
    registry: ImageRegistry,
    mounts: MountPolicyBuilder,
}

/// Everything needed to create a box. The image must already be resolved.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub name: String,
    pub image: ResolvedImage,
    pub mounts: MountRequest,
    /// Home directory override (distrobox only)
    pub home: Option<String>,
    /// Start the box right after creating it
    pub start: bool,
}

/// One row of `rosbox list`
#[derive(Debug, Clone)]
pub struct BoxInfo {
    pub id: BoxId,
    pub container_id: ContainerId,
    pub image: String,
    pub status: ContainerStatus,
}

/// A box together with the configuration it was created with
#[derive(Debug, Clone)]
pub struct BoxDetails {
    pub info: BoxInfo,
    pub workspace: Option<PathBuf>,
    pub ssh: bool,
    pub display: bool,
    pub host_network: bool,
    pub privileged: bool,
}

impl BoxManager {
    /// Create a manager for the current host
    pub fn new(provider: Box<dyn ContainerProvider>, config: GlobalConfig) -> Result<Self> {
        let host_os = HostOs::detect()?;
        let defaults = MountDefaults::from_config(&config);
        Ok(Self::with_host(provider, config, host_os, defaults))
    }

    /// Create a manager with an explicit host profile
    pub fn with_host(
        provider: Box<dyn ContainerProvider>,
        config: GlobalConfig,
        host_os: HostOs,
        defaults: MountDefaults,
    ) -> Self {
        let registry = ImageRegistry::from_config(&config);
        tracing::debug!(
            "Box manager for {} backend on {:?} host",
            provider.info().provider_type,
            host_os
        );
        Self {
            provider,
            config,
            registry,
            mounts: MountPolicyBuilder::new(host_os, defaults),
        }
    }

    pub fn provider(&self) -> &dyn ContainerProvider {
        self.provider.as_ref()
    }

    pub fn provider_type(&self) -> ProviderType {
        self.provider.info().provider_type
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    pub fn registry(&self) -> &ImageRegistry {
        &self.registry
    }

    /// Validate a display name into a box identity
    pub fn box_id(&self, name: &str) -> Result<BoxId> {
        BoxId::new(name, &self.config.naming.suffix)
    }

    /// Resolve a logical image (or custom reference) for `create`
    pub async fn resolve_image(
        &self,
        image: &str,
        mode: ResolveMode,
        progress: Option<&mpsc::UnboundedSender<String>>,
    ) -> Result<ResolvedImage> {
        ImageResolver::new(self.provider.as_ref(), &self.registry)
            .resolve(image, mode, progress)
            .await
    }

    /// Whether a box with this display name exists on the backend
    pub async fn exists(&self, name: &str) -> Result<bool> {
        let id = self.box_id(name)?;
        Ok(self.find(&id).await?.is_some())
    }

    /// Create a box. An existing box with the same name is left untouched.
    pub async fn create(&self, request: &CreateRequest) -> Result<ContainerId> {
        let id = self.box_id(&request.name)?;
        if self.find(&id).await?.is_some() {
            return Err(CoreError::NameAlreadyExists(id.display_name().to_string()));
        }

        let policy = self.mounts.build(&request.mounts)?;
        let config = self.container_config(
            &id,
            &request.image.reference,
            &policy,
            request.home.clone(),
        );

        tracing::info!(
            "Creating box {} from {}",
            id.display_name(),
            request.image.reference
        );
        let container_id = self.provider.create(&config).await?;
        tracing::debug!("Created container {}", container_id.short());

        if request.start {
            if self.provider.supports(Operation::Start) {
                self.provider.start(&container_id).await?;
            } else {
                tracing::info!(
                    "The {} backend starts boxes on enter, skipping start",
                    self.provider_type()
                );
            }
        }

        Ok(container_id)
    }

    /// Start a box
    pub async fn start(&self, name: &str) -> Result<()> {
        let id = self.box_id(name)?;
        self.require_operation(Operation::Start)?;
        self.require(&id).await?;
        self.provider.start(&backend_id(&id)).await?;
        Ok(())
    }

    /// Stop a box
    pub async fn stop(&self, name: &str) -> Result<()> {
        let id = self.box_id(name)?;
        self.require_operation(Operation::Stop)?;
        self.require(&id).await?;
        self.provider.stop(&backend_id(&id), None).await?;
        Ok(())
    }

    /// Attach an interactive shell, starting the box first if needed.
    /// Blocks until the shell exits and returns its exit code.
    pub async fn enter(&self, name: &str, shell: &[String]) -> Result<i32> {
        let id = self.box_id(name)?;
        let details = self.require(&id).await?;
        let cid = backend_id(&id);

        if !details.status.is_running() && self.provider.supports(Operation::Start) {
            tracing::info!("Starting box {}", id.display_name());
            self.provider.start(&cid).await?;
        }

        Ok(self.provider.enter(&cid, shell).await?)
    }

    /// Remove a stopped box
    pub async fn remove(&self, name: &str) -> Result<()> {
        let id = self.box_id(name)?;
        let details = self.require(&id).await?;
        let can_stop = self.provider.supports(Operation::Stop);

        if can_stop && details.status.is_running() {
            return Err(CoreError::PreconditionFailed(format!(
                "Box {} is running. Please stop it first with `rosbox stop {}`",
                id.display_name(),
                id.display_name()
            )));
        }

        self.provider.remove(&backend_id(&id), !can_stop).await?;
        Ok(())
    }

    /// Managed boxes, sorted by display name
    pub async fn list(&self) -> Result<Vec<BoxInfo>> {
        let naming = &self.config.naming;
        let filter = ListFilter::managed(&naming.label, &naming.suffix);

        let mut boxes: Vec<BoxInfo> = self
            .provider
            .list(&filter)
            .await?
            .into_iter()
            .filter_map(|c| {
                let id = BoxId::from_backend_name(&c.name, &naming.suffix)?;
                Some(BoxInfo {
                    id,
                    container_id: c.id,
                    image: c.image,
                    status: c.status,
                })
            })
            .collect();

        boxes.sort_by(|a, b| a.id.display_name().cmp(b.id.display_name()));
        Ok(boxes)
    }

    /// Look up one box
    pub async fn inspect(&self, name: &str) -> Result<BoxDetails> {
        let id = self.box_id(name)?;
        let details = self.require(&id).await?;
        let request = MountRequest::from_details(&details, self.mounts.defaults());

        Ok(BoxDetails {
            info: BoxInfo {
                id,
                container_id: details.id,
                image: details.image,
                status: details.status,
            },
            workspace: request.workspace,
            ssh: request.ssh,
            display: request.display,
            host_network: request.host_network,
            privileged: details.privileged,
        })
    }

    fn container_config(
        &self,
        id: &BoxId,
        image: &str,
        policy: &MountPolicy,
        home: Option<String>,
    ) -> CreateContainerConfig {
        CreateContainerConfig {
            image: image.to_string(),
            name: id.backend_name(),
            hostname: Some(id.display_name().to_string()),
            env: policy.env.clone(),
            mounts: policy.mounts.clone(),
            labels: HashMap::from([("type".to_string(), self.config.naming.label.clone())]),
            network_mode: Some(policy.network_mode.as_str().to_string()),
            privileged: policy.privileged,
            home,
            tty: true,
            stdin_open: true,
        }
    }

    fn require_operation(&self, op: Operation) -> Result<()> {
        if self.provider.supports(op) {
            return Ok(());
        }
        Err(CoreError::UnsupportedOperation(format!(
            "{} is not available with the {} backend",
            op,
            self.provider_type()
        )))
    }

    async fn find(&self, id: &BoxId) -> Result<Option<ContainerDetails>> {
        match self.provider.inspect(&backend_id(id)).await {
            Ok(details) => Ok(Some(details)),
            Err(ProviderError::ContainerNotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn require(&self, id: &BoxId) -> Result<ContainerDetails> {
        self.find(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(id.display_name().to_string()))
    }
}

fn backend_id(id: &BoxId) -> ContainerId {
    ContainerId::new(id.backend_name())
}
