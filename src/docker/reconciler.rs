// ABOUTME: Brings the project's image and container in line with the current configuration
// Sequential: each runtime call completes before the next is issued; no retries

use super::client::{BuildEvent, ContainerSpec, RestartPolicy, RuntimeClient};
use crate::config::SessionConfig;
use crate::dockerfile;
use crate::error::SessionError;
use crate::project::{ImageReference, Project};
use futures_util::stream::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const WORKSPACE_PATH: &str = "/workspace";
pub const DOCKER_SOCKET: &str = "/var/run/docker.sock";
pub const NETWORK_MODE: &str = "bridge";
pub const HOST_GATEWAY_ALIAS: &str = "host.docker.internal:host-gateway";

/// Given a configuration and project, ensures exactly one running container on the current image.
///
/// Concurrent reconciliation of the same project is not guarded here: two
/// invocations may both observe no container and both attempt creation.
/// Callers that can race must serialize per project.
pub struct SessionReconciler {
    runtime: Arc<dyn RuntimeClient>,
    progress: Option<mpsc::UnboundedSender<String>>,
}

impl SessionReconciler {
    pub fn new(runtime: Arc<dyn RuntimeClient>) -> Self {
        Self {
            runtime,
            progress: None,
        }
    }

    /// Forwards build output and status lines to `sender`.
    pub fn with_progress(mut self, sender: mpsc::UnboundedSender<String>) -> Self {
        self.progress = Some(sender);
        self
    }

    fn report(&self, line: impl Into<String>) {
        if let Some(sender) = &self.progress {
            let _ = sender.send(line.into());
        }
    }

    pub async fn reconcile(
        &self,
        config: &SessionConfig,
        project: &Project,
    ) -> Result<String, SessionError> {
        let image = project.image_reference(config.raw());
        let container_name = project.container_name();
        info!("Reconciling {} against image {}", container_name, image);

        self.ensure_image(config, &image).await?;

        let mut existing = None;
        if let Some(id) = self
            .runtime
            .find_container(&container_name)
            .await
            .map_err(|e| SessionError::runtime("finding container", e))?
        {
            let descriptor = self
                .runtime
                .inspect_container(&id)
                .await
                .map_err(|e| SessionError::runtime("inspecting container", e))?;

            if descriptor.is_bound_to(&image) {
                debug!("Container {} already uses {}", id, image);
                existing = Some((id, descriptor.running));
            } else {
                info!(
                    "Container {} uses {}, recreating for {}",
                    id, descriptor.image, image
                );
                self.report("Config changed, recreating container...");
                if descriptor.running {
                    self.runtime
                        .stop_container(&id)
                        .await
                        .map_err(|e| SessionError::runtime("stopping container", e))?;
                }
                self.runtime
                    .remove_container(&id, true)
                    .await
                    .map_err(|e| SessionError::runtime("removing container", e))?;
            }
        }

        let (id, running) = match existing {
            Some(found) => found,
            None => {
                self.report(format!("Creating container {}...", container_name));
                let spec = container_spec(config, project, &image)?;
                let id = self
                    .runtime
                    .create_container(spec)
                    .await
                    .map_err(|e| SessionError::runtime("creating container", e))?;
                (id, false)
            }
        };

        if !running {
            self.report("Starting container...");
            self.runtime
                .start_container(&id)
                .await
                .map_err(|e| SessionError::runtime("starting container", e))?;
        }

        Ok(id)
    }

    /// Builds `image` unless the engine already has it; the tag is the cache key.
    pub async fn ensure_image(
        &self,
        config: &SessionConfig,
        image: &ImageReference,
    ) -> Result<(), SessionError> {
        let exists = self
            .runtime
            .image_exists(image)
            .await
            .map_err(|e| SessionError::runtime("checking image", e))?;
        if exists {
            debug!("Image {} already present", image);
            return Ok(());
        }

        self.build(config, image).await
    }

    /// Unconditionally builds `image` from `config`.
    pub async fn build(
        &self,
        config: &SessionConfig,
        image: &ImageReference,
    ) -> Result<(), SessionError> {
        self.report(format!("Building image {}...", image));
        let context = dockerfile::generate(config);

        let mut progress = self
            .runtime
            .build_image(context, image)
            .await
            .map_err(|e| match e {
                e if e.is_unavailable() => SessionError::runtime("building image", e),
                e => SessionError::build("building image", e.to_string()),
            })?;

        while let Some(event) = progress.next().await {
            match event {
                Ok(BuildEvent::Output(line)) => self.report(line.trim_end()),
                Ok(BuildEvent::Error(message)) => {
                    warn!("Build of {} failed: {}", image, message);
                    return Err(SessionError::build("building image", message));
                }
                Err(e) => {
                    warn!("Build stream for {} failed: {}", image, e);
                    return Err(SessionError::build("building image", e.to_string()));
                }
            }
        }

        info!("Built image {}", image);
        self.report("Image built successfully");
        Ok(())
    }
}

/// The fixed container shape: workspace and engine-socket binds, published ports,
/// bridge networking with a host-gateway alias, and no restart policy.
pub fn container_spec(
    config: &SessionConfig,
    project: &Project,
    image: &ImageReference,
) -> Result<ContainerSpec, SessionError> {
    let ports = config.port_mappings().map_err(|e| SessionError::ContainerState {
        stage: "creating container",
        source: super::RuntimeError::OperationFailed(e.to_string()),
    })?;

    let workspace = project.workspace();
    Ok(ContainerSpec {
        name: project.container_name(),
        image: image.clone(),
        command: config.default_command(),
        env: config.env.clone(),
        working_dir: WORKSPACE_PATH.to_string(),
        binds: vec![
            format!("{}:{}:rw", workspace.display(), WORKSPACE_PATH),
            format!("{}:{}", DOCKER_SOCKET, DOCKER_SOCKET),
        ],
        ports,
        network_mode: NETWORK_MODE.to_string(),
        extra_hosts: vec![HOST_GATEWAY_ALIAS.to_string()],
        restart_policy: RestartPolicy::Never,
    })
}
