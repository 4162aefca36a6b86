//! Test support utilities for rosbox-core
//!
//! Provides an in-memory MockProvider for unit testing BoxManager and the
//! image resolver without a real Docker daemon or distrobox install.

use async_trait::async_trait;
use rosbox_provider::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Records which methods were called on the mock
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Ping,
    Create { name: String, image: String },
    Start { id: String },
    Stop { id: String },
    Remove { id: String, force: bool },
    Rename { id: String, new_name: String },
    Inspect { id: String },
    List,
    Enter { id: String, shell: Vec<String> },
    ImageExists { reference: String },
    Pull { reference: String },
    LocalDigests { reference: String },
    RemoteDigest { reference: String },
    Build { tag: String },
}

/// A container held by the mock
#[derive(Debug, Clone)]
pub struct MockContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    pub labels: HashMap<String, String>,
    pub env: HashMap<String, String>,
    pub mounts: Vec<MountConfig>,
    pub network_mode: Option<String>,
    pub privileged: bool,
    pub hostname: Option<String>,
    /// Image ID the container was created from. `None` follows the tag.
    pub image_id: Option<String>,
}

impl MockContainer {
    /// A managed container (carries the default `type=rosbox` label)
    pub fn managed(name: &str, image: &str, status: ContainerStatus) -> Self {
        Self {
            id: format!("{}_id0123456789", name),
            name: name.to_string(),
            image: image.to_string(),
            status,
            labels: HashMap::from([("type".to_string(), "rosbox".to_string())]),
            env: HashMap::new(),
            mounts: Vec::new(),
            network_mode: Some("host".to_string()),
            privileged: true,
            hostname: None,
            image_id: None,
        }
    }

    /// A container this tool did not create
    pub fn foreign(name: &str, image: &str) -> Self {
        Self {
            labels: HashMap::new(),
            ..Self::managed(name, image, ContainerStatus::Running)
        }
    }

    pub fn with_mounts(mut self, mounts: Vec<MountConfig>) -> Self {
        self.mounts = mounts;
        self
    }

    pub fn with_network(mut self, mode: &str) -> Self {
        self.network_mode = Some(mode.to_string());
        self
    }
}

/// Configurable in-memory container provider for testing.
/// Clones share state, so a test can keep a handle after boxing the provider.
#[derive(Clone)]
pub struct MockProvider {
    pub provider_type: ProviderType,
    pub calls: Arc<Mutex<Vec<MockCall>>>,
    pub containers: Arc<Mutex<Vec<MockContainer>>>,
    /// Local image store: reference -> repo digests
    pub images: Arc<Mutex<HashMap<String, Vec<String>>>>,
    /// Local tags: reference -> image ID
    pub tags: Arc<Mutex<HashMap<String, String>>>,
    /// Repo digests by image ID. Entries outlive the tag that created them.
    pub image_digests: Arc<Mutex<HashMap<String, Vec<String>>>>,
    /// Registry digests by reference
    pub remote_digests: Arc<Mutex<HashMap<String, String>>>,
    /// Result for ping calls
    pub ping_result: Arc<Mutex<Result<()>>>,
    /// Error returned by create calls (if Some)
    pub create_error: Arc<Mutex<Option<ProviderError>>>,
    /// Error returned by pull calls (if Some)
    pub pull_error: Arc<Mutex<Option<ProviderError>>>,
    /// Error returned by remote_digest calls (if Some)
    pub remote_digest_error: Arc<Mutex<Option<ProviderError>>>,
    /// Error returned by build calls (if Some)
    pub build_error: Arc<Mutex<Option<ProviderError>>>,
    /// Exit code returned by enter
    pub enter_exit_code: Arc<Mutex<i32>>,
    next_id: Arc<Mutex<u32>>,
}

impl MockProvider {
    /// Create an empty mock. Docker mocks support every operation,
    /// distrobox mocks none of the optional ones.
    pub fn new(provider_type: ProviderType) -> Self {
        Self {
            provider_type,
            calls: Arc::new(Mutex::new(Vec::new())),
            containers: Arc::new(Mutex::new(Vec::new())),
            images: Arc::new(Mutex::new(HashMap::new())),
            tags: Arc::new(Mutex::new(HashMap::new())),
            image_digests: Arc::new(Mutex::new(HashMap::new())),
            remote_digests: Arc::new(Mutex::new(HashMap::new())),
            ping_result: Arc::new(Mutex::new(Ok(()))),
            create_error: Arc::new(Mutex::new(None)),
            pull_error: Arc::new(Mutex::new(None)),
            remote_digest_error: Arc::new(Mutex::new(None)),
            build_error: Arc::new(Mutex::new(None)),
            enter_exit_code: Arc::new(Mutex::new(0)),
            next_id: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_container(self, container: MockContainer) -> Self {
        self.containers.lock().unwrap().push(container);
        self
    }

    pub fn with_image(self, reference: &str, digests: &[&str]) -> Self {
        self.store_image(reference, digests.iter().map(|d| d.to_string()).collect());
        self
    }

    /// Point `reference` at a fresh image ID carrying `digests`
    fn store_image(&self, reference: &str, digests: Vec<String>) -> String {
        let image_id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("sha256:image{:06}", *next)
        };
        self.image_digests
            .lock()
            .unwrap()
            .insert(image_id.clone(), digests.clone());
        self.tags
            .lock()
            .unwrap()
            .insert(reference.to_string(), image_id.clone());
        self.images
            .lock()
            .unwrap()
            .insert(reference.to_string(), digests);
        image_id
    }

    /// Drop a local tag, leaving the image itself in place
    pub fn untag(&self, reference: &str) {
        self.images.lock().unwrap().remove(reference);
        self.tags.lock().unwrap().remove(reference);
    }

    /// Image ID a tag currently points at
    pub fn tag_target(&self, reference: &str) -> Option<String> {
        self.tags.lock().unwrap().get(reference).cloned()
    }

    pub fn with_remote_digest(self, reference: &str, digest: &str) -> Self {
        self.remote_digests
            .lock()
            .unwrap()
            .insert(reference.to_string(), digest.to_string());
        self
    }

    /// Record a call
    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Check if a specific call was made
    pub fn was_called(&self, call: &MockCall) -> bool {
        self.calls.lock().unwrap().contains(call)
    }

    /// Snapshot of a container by name
    pub fn container(&self, name: &str) -> Option<MockContainer> {
        find_container(&self.containers, name)
    }

    /// Local repo digests recorded for an image
    pub fn local_digests_for(&self, reference: &str) -> Option<Vec<String>> {
        self.images.lock().unwrap().get(reference).cloned()
    }

    fn unsupported(&self, op: Operation) -> Result<()> {
        if self.supports(op) {
            Ok(())
        } else {
            Err(ProviderError::Unsupported(format!("{} (mock {})", op, self.provider_type)))
        }
    }

    fn with_container_mut<T>(
        &self,
        id: &ContainerId,
        f: impl FnOnce(&mut MockContainer) -> Result<T>,
    ) -> Result<T> {
        let mut containers = self.containers.lock().unwrap();
        let container = containers
            .iter_mut()
            .find(|c| c.id == id.0 || c.name == id.0)
            .ok_or_else(|| ProviderError::ContainerNotFound(id.0.clone()))?;
        f(container)
    }
}

fn find_container(containers: &Arc<Mutex<Vec<MockContainer>>>, key: &str) -> Option<MockContainer> {
    containers
        .lock()
        .unwrap()
        .iter()
        .find(|c| c.id == key || c.name == key)
        .cloned()
}

/// Take a configured error, cloning it so it fires on every call
fn injected(slot: &Arc<Mutex<Option<ProviderError>>>) -> Result<()> {
    match &*slot.lock().unwrap() {
        Some(e) => Err(clone_provider_error(e)),
        None => Ok(()),
    }
}

/// Clone a ProviderError (thiserror types don't implement Clone)
pub fn clone_provider_error(e: &ProviderError) -> ProviderError {
    match e {
        ProviderError::ConnectionError(s) => ProviderError::ConnectionError(s.clone()),
        ProviderError::ContainerNotFound(s) => ProviderError::ContainerNotFound(s.clone()),
        ProviderError::ImageNotFound(s) => ProviderError::ImageNotFound(s.clone()),
        ProviderError::BuildError(s) => ProviderError::BuildError(s.clone()),
        ProviderError::PullError(s) => ProviderError::PullError(s.clone()),
        ProviderError::RuntimeError(s) => ProviderError::RuntimeError(s.clone()),
        ProviderError::Unsupported(s) => ProviderError::Unsupported(s.clone()),
        ProviderError::Docker(e) => ProviderError::RuntimeError(e.to_string()),
        ProviderError::IoError(_) => ProviderError::RuntimeError("IO error (cloned)".into()),
        ProviderError::Config(e) => {
            ProviderError::Config(rosbox_config::ConfigError::Invalid(e.to_string()))
        }
    }
}

/// `repo:tag` -> `repo`
fn repository(reference: &str) -> &str {
    match reference.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => repo,
        _ => reference,
    }
}

fn to_details(c: &MockContainer, tags: &HashMap<String, String>) -> ContainerDetails {
    let mut env: Vec<String> = c.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    env.sort();
    ContainerDetails {
        id: ContainerId::new(c.id.clone()),
        name: c.name.clone(),
        image: c.image.clone(),
        image_id: c
            .image_id
            .clone()
            .or_else(|| tags.get(&c.image).cloned())
            .unwrap_or_default(),
        status: c.status,
        labels: c.labels.clone(),
        env,
        mounts: c
            .mounts
            .iter()
            .map(|m| MountInfo {
                mount_type: "bind".to_string(),
                source: m.source.clone(),
                destination: m.target.clone(),
                read_only: m.read_only,
            })
            .collect(),
        network_mode: c.network_mode.clone(),
        privileged: c.privileged,
    }
}

#[async_trait]
impl ContainerProvider for MockProvider {
    fn supports(&self, _op: Operation) -> bool {
        self.provider_type == ProviderType::Docker
    }

    async fn ping(&self) -> Result<()> {
        self.record(MockCall::Ping);
        match &*self.ping_result.lock().unwrap() {
            Ok(()) => Ok(()),
            Err(e) => Err(clone_provider_error(e)),
        }
    }

    async fn create(&self, config: &CreateContainerConfig) -> Result<ContainerId> {
        self.record(MockCall::Create {
            name: config.name.clone(),
            image: config.image.clone(),
        });
        injected(&self.create_error)?;

        let image_id = self.tag_target(&config.image);
        let mut containers = self.containers.lock().unwrap();
        if containers.iter().any(|c| c.name == config.name) {
            return Err(ProviderError::RuntimeError(format!(
                "Conflict. The container name \"/{}\" is already in use",
                config.name
            )));
        }

        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("mock{:012}", *next)
        };

        containers.push(MockContainer {
            id: id.clone(),
            name: config.name.clone(),
            image: config.image.clone(),
            status: ContainerStatus::Created,
            labels: config.labels.clone(),
            env: config.env.clone(),
            mounts: config.mounts.clone(),
            network_mode: config.network_mode.clone(),
            privileged: config.privileged,
            hostname: config.hostname.clone(),
            image_id,
        });

        Ok(ContainerId::new(id))
    }

    async fn start(&self, id: &ContainerId) -> Result<()> {
        self.record(MockCall::Start { id: id.0.clone() });
        self.unsupported(Operation::Start)?;
        self.with_container_mut(id, |c| {
            c.status = ContainerStatus::Running;
            Ok(())
        })
    }

    async fn stop(&self, id: &ContainerId, _timeout: Option<u32>) -> Result<()> {
        self.record(MockCall::Stop { id: id.0.clone() });
        self.unsupported(Operation::Stop)?;
        self.with_container_mut(id, |c| {
            c.status = ContainerStatus::Exited;
            Ok(())
        })
    }

    async fn remove(&self, id: &ContainerId, force: bool) -> Result<()> {
        self.record(MockCall::Remove {
            id: id.0.clone(),
            force,
        });
        let mut containers = self.containers.lock().unwrap();
        let pos = containers
            .iter()
            .position(|c| c.id == id.0 || c.name == id.0)
            .ok_or_else(|| ProviderError::ContainerNotFound(id.0.clone()))?;
        if containers[pos].status.is_running() && !force {
            return Err(ProviderError::RuntimeError(
                "cannot remove a running container".into(),
            ));
        }
        containers.remove(pos);
        Ok(())
    }

    async fn rename(&self, id: &ContainerId, new_name: &str) -> Result<()> {
        self.record(MockCall::Rename {
            id: id.0.clone(),
            new_name: new_name.to_string(),
        });
        self.unsupported(Operation::Rename)?;
        if find_container(&self.containers, new_name).is_some() {
            return Err(ProviderError::RuntimeError(format!(
                "name {} is already in use",
                new_name
            )));
        }
        self.with_container_mut(id, |c| {
            c.name = new_name.to_string();
            Ok(())
        })
    }

    async fn inspect(&self, id: &ContainerId) -> Result<ContainerDetails> {
        self.record(MockCall::Inspect { id: id.0.clone() });
        let tags = self.tags.lock().unwrap().clone();
        find_container(&self.containers, &id.0)
            .map(|c| to_details(&c, &tags))
            .ok_or_else(|| ProviderError::ContainerNotFound(id.0.clone()))
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<ContainerInfo>> {
        self.record(MockCall::List);
        let check_labels = self.provider_type == ProviderType::Docker;
        Ok(self
            .containers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| {
                !check_labels
                    || filter
                        .label
                        .as_ref()
                        .map(|(k, v)| c.labels.get(k) == Some(v))
                        .unwrap_or(true)
            })
            .filter(|c| filter.matches_name(&c.name))
            .map(|c| ContainerInfo {
                id: ContainerId::new(c.id.clone()),
                name: c.name.clone(),
                image: c.image.clone(),
                status: c.status,
                labels: c.labels.clone(),
            })
            .collect())
    }

    async fn enter(&self, id: &ContainerId, shell: &[String]) -> Result<i32> {
        self.record(MockCall::Enter {
            id: id.0.clone(),
            shell: shell.to_vec(),
        });
        if find_container(&self.containers, &id.0).is_none() {
            return Err(ProviderError::ContainerNotFound(id.0.clone()));
        }
        Ok(*self.enter_exit_code.lock().unwrap())
    }

    async fn image_exists(&self, reference: &str) -> Result<bool> {
        self.record(MockCall::ImageExists {
            reference: reference.to_string(),
        });
        self.unsupported(Operation::ImageStore)?;
        Ok(self.images.lock().unwrap().contains_key(reference))
    }

    async fn pull_with_progress(
        &self,
        reference: &str,
        progress: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<ImageId> {
        self.record(MockCall::Pull {
            reference: reference.to_string(),
        });
        self.unsupported(Operation::ImageStore)?;
        injected(&self.pull_error)?;

        if let Some(tx) = progress {
            let _ = tx.send(format!("{}: Pulling from mock registry", reference));
            let _ = tx.send("layer0: Download complete".to_string());
        }

        let digests = self
            .remote_digests
            .lock()
            .unwrap()
            .get(reference)
            .map(|d| vec![format!("{}@{}", repository(reference), d)])
            .unwrap_or_default();

        Ok(ImageId::new(self.store_image(reference, digests)))
    }

    async fn local_digests(&self, reference: &str) -> Result<Vec<String>> {
        self.record(MockCall::LocalDigests {
            reference: reference.to_string(),
        });
        self.unsupported(Operation::Freshness)?;
        let by_id = self.image_digests.lock().unwrap().get(reference).cloned();
        by_id
            .or_else(|| self.images.lock().unwrap().get(reference).cloned())
            .ok_or_else(|| ProviderError::ImageNotFound(reference.to_string()))
    }

    async fn remote_digest(&self, reference: &str) -> Result<String> {
        self.record(MockCall::RemoteDigest {
            reference: reference.to_string(),
        });
        self.unsupported(Operation::Freshness)?;
        injected(&self.remote_digest_error)?;
        self.remote_digests
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| ProviderError::ImageNotFound(reference.to_string()))
    }

    async fn build_with_progress(
        &self,
        config: &BuildConfig,
        progress: mpsc::UnboundedSender<String>,
    ) -> Result<ImageId> {
        self.record(MockCall::Build {
            tag: config.tag.clone(),
        });
        self.unsupported(Operation::Build)?;
        injected(&self.build_error)?;
        let _ = progress.send(format!("Step 1/1 : FROM mock ({})", config.dockerfile));
        Ok(ImageId::new(self.store_image(&config.tag, Vec::new())))
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            provider_type: self.provider_type,
            version: "mock".to_string(),
            api_version: "mock".to_string(),
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
        }
    }
}
