// ABOUTME: Capability seam over the container engine used by reconciliation and attach
// Implemented by DockerRuntime over Bollard; mocked in tests

use crate::config::PortMapping;
use crate::dockerfile::BuildContext;
use crate::project::ImageReference;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::collections::BTreeMap;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Docker daemon unreachable: {0}")]
    Unavailable(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Docker API error: {0}")]
    Api(#[from] bollard::errors::Error),
    #[error("Container operation failed: {0}")]
    OperationFailed(String),
}

impl RuntimeError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RuntimeError::Unavailable(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound(_))
    }
}

/// One message from an image build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    Output(String),
    Error(String),
}

pub type BuildProgressStream = BoxStream<'static, Result<BuildEvent, RuntimeError>>;

/// Observed state of an existing container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDescriptor {
    pub id: String,
    pub name: String,
    /// Image reference the container was created from, as the engine reports it
    pub image: String,
    pub running: bool,
}

impl ContainerDescriptor {
    pub fn is_bound_to(&self, image: &ImageReference) -> bool {
        self.image == image.to_string()
    }
}

/// Summary row for `rig list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerListing {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartPolicy {
    #[default]
    Never,
}

/// Everything needed to create a project container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: ImageReference,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: String,
    /// Bind mounts in `host:container[:mode]` form
    pub binds: Vec<String>,
    pub ports: Vec<PortMapping>,
    pub network_mode: String,
    pub extra_hosts: Vec<String>,
    pub restart_policy: RestartPolicy,
}

/// Terminal dimensions in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub width: u16,
    pub height: u16,
}

impl TerminalSize {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }
}

/// Duplex byte stream attached to an exec instance
pub struct ExecStream {
    pub reader: Pin<Box<dyn AsyncRead + Send>>,
    pub writer: Pin<Box<dyn AsyncWrite + Send>>,
}

impl std::fmt::Debug for ExecStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecStream").finish_non_exhaustive()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Verifies the engine is reachable
    async fn ping(&self) -> Result<(), RuntimeError>;

    async fn image_exists(&self, image: &ImageReference) -> Result<bool, RuntimeError>;

    /// Starts a build tagged `image`; the stream ends when the build does
    async fn build_image(
        &self,
        context: BuildContext,
        image: &ImageReference,
    ) -> Result<BuildProgressStream, RuntimeError>;

    /// Looks up a container (running or stopped) by exact name
    async fn find_container(&self, name: &str) -> Result<Option<String>, RuntimeError>;

    async fn create_container(&self, spec: ContainerSpec) -> Result<String, RuntimeError>;

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), RuntimeError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerDescriptor, RuntimeError>;

    /// Blocks until the container is no longer running
    async fn wait_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// All containers whose name carries the `rig-` prefix
    async fn list_project_containers(&self) -> Result<Vec<ContainerListing>, RuntimeError>;

    /// Removes every tag of `repository`, returning the tags removed
    async fn remove_images(&self, repository: &str) -> Result<Vec<String>, RuntimeError>;

    /// Creates an exec instance with stdin/stdout/stderr attached and a tty
    async fn exec_create(
        &self,
        container_id: &str,
        command: &[String],
    ) -> Result<String, RuntimeError>;

    async fn exec_attach(&self, exec_id: &str) -> Result<ExecStream, RuntimeError>;

    async fn exec_resize(&self, exec_id: &str, size: TerminalSize) -> Result<(), RuntimeError>;
}
