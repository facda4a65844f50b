// ABOUTME: Bollard-backed RuntimeClient talking to the local Docker daemon
// Handles socket discovery, image builds, container lifecycle and exec sessions

use super::client::{
    BuildEvent, BuildProgressStream, ContainerDescriptor, ContainerListing, ContainerSpec,
    ExecStream, RestartPolicy, RuntimeClient, RuntimeError, TerminalSize,
};
use crate::config::AppConfig;
use crate::dockerfile::BuildContext;
use crate::project::{self, ImageReference};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogOutput,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, ResizeExecOptions, StartExecOptions, StartExecResults};
use bollard::image::{BuildImageOptions, ListImagesOptions, RemoveImageOptions};
use bollard::models::{
    BuildInfo, HostConfig, PortBinding, RestartPolicy as DockerRestartPolicy,
    RestartPolicyNameEnum,
};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::future;
use futures_util::stream::{Stream, StreamExt};
use std::collections::HashMap;
use std::io;
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Maps engine errors onto the runtime taxonomy; transport failures mean the daemon is unreachable.
fn classify(err: BollardError) -> RuntimeError {
    if matches!(
        err,
        BollardError::IOError { .. } | BollardError::HyperResponseError { .. }
    ) {
        return RuntimeError::Unavailable(err.to_string());
    }

    match err {
        BollardError::DockerResponseServerError {
            status_code: 404,
            message,
        } => RuntimeError::NotFound(message),
        other => RuntimeError::Api(other),
    }
}

fn build_event(info: BuildInfo) -> Option<BuildEvent> {
    if let Some(error) = info.error {
        return Some(BuildEvent::Error(error));
    }
    if let Some(message) = info.error_detail.and_then(|detail| detail.message) {
        return Some(BuildEvent::Error(message));
    }
    info.stream
        .or(info.status)
        .filter(|line| !line.is_empty())
        .map(BuildEvent::Output)
}

/// Maps engine build progress onto `BuildEvent`s, skipping lines with no content.
fn build_events<S>(progress: S) -> BuildProgressStream
where
    S: Stream<Item = Result<BuildInfo, BollardError>> + Send + 'static,
{
    progress
        .filter_map(|item| {
            future::ready(match item {
                Ok(info) => build_event(info).map(Ok),
                Err(e) => Some(Err(classify(e))),
            })
        })
        .boxed()
}

pub struct DockerRuntime {
    docker: Docker,
    stop_timeout_secs: i64,
}

impl DockerRuntime {
    pub fn connect(config: &AppConfig) -> Result<Self, RuntimeError> {
        let docker = Self::connect_to_docker(config).map_err(classify)?;
        Ok(Self {
            docker,
            stop_timeout_secs: config.docker.stop_timeout_secs,
        })
    }

    fn connect_to_docker(config: &AppConfig) -> Result<Docker, BollardError> {
        if let Some(docker_host) = &config.docker.host {
            info!("Using Docker host from config: {}", docker_host);
            match Self::connect_to_host(docker_host) {
                Ok(docker) => return Ok(docker),
                Err(e) => {
                    warn!("Failed to connect to configured Docker host {}: {}", docker_host, e);
                }
            }
        }

        if let Ok(docker_host) = std::env::var("DOCKER_HOST") {
            info!("Using DOCKER_HOST: {}", docker_host);
            return Docker::connect_with_local_defaults();
        }

        for socket_path in Self::get_docker_socket_paths() {
            if std::path::Path::new(&socket_path).exists() {
                debug!("Found Docker socket at: {}", socket_path);
                match Self::connect_to_host(&format!("unix://{}", socket_path)) {
                    Ok(docker) => return Ok(docker),
                    Err(e) => {
                        warn!("Failed to connect to Docker socket {}: {}", socket_path, e);
                        continue;
                    }
                }
            }
        }

        debug!("No Docker socket found, trying default connection");
        Docker::connect_with_local_defaults()
    }

    #[cfg(unix)]
    fn connect_to_host(host: &str) -> Result<Docker, BollardError> {
        match host.strip_prefix("unix://") {
            Some(path) => Docker::connect_with_unix(path, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION),
            None => Docker::connect_with_http(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION),
        }
    }

    #[cfg(not(unix))]
    fn connect_to_host(host: &str) -> Result<Docker, BollardError> {
        Docker::connect_with_http(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
    }

    fn get_docker_socket_paths() -> Vec<String> {
        let mut paths = Vec::new();
        let home = dirs::home_dir().map(|h| h.to_string_lossy().to_string());

        if cfg!(target_os = "macos") {
            if let Some(home) = &home {
                // Docker Desktop, Colima, Podman machine
                paths.push(format!("{}/.docker/run/docker.sock", home));
                paths.push(format!("{}/.colima/default/docker.sock", home));
                paths.push(format!(
                    "{}/.local/share/containers/podman/machine/podman.sock",
                    home
                ));
            }
        }

        if cfg!(target_os = "linux") {
            paths.push("/var/run/docker.sock".to_string());
            if let Ok(xdg_runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
                paths.push(format!("{}/docker.sock", xdg_runtime_dir));
                paths.push(format!("{}/podman/podman.sock", xdg_runtime_dir));
            }
        }

        paths
    }

    fn to_container_config(spec: &ContainerSpec) -> Config<String> {
        let mut exposed_ports = HashMap::new();
        let mut port_bindings = HashMap::new();
        for mapping in &spec.ports {
            exposed_ports.insert(mapping.container_key(), HashMap::new());
            port_bindings.insert(
                mapping.container_key(),
                Some(vec![PortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some(mapping.host.to_string()),
                }]),
            );
        }

        let restart_policy = match spec.restart_policy {
            RestartPolicy::Never => DockerRestartPolicy {
                name: Some(RestartPolicyNameEnum::NO),
                maximum_retry_count: None,
            },
        };

        let host_config = HostConfig {
            binds: Some(spec.binds.clone()),
            port_bindings: Some(port_bindings),
            // The socket mount does not need privileged mode
            privileged: Some(false),
            network_mode: Some(spec.network_mode.clone()),
            restart_policy: Some(restart_policy),
            extra_hosts: Some(spec.extra_hosts.clone()),
            ..Default::default()
        };

        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        Config {
            image: Some(spec.image.to_string()),
            cmd: Some(spec.command.clone()),
            env: Some(env),
            exposed_ports: Some(exposed_ports),
            tty: Some(true),
            open_stdin: Some(true),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            working_dir: Some(spec.working_dir.clone()),
            host_config: Some(host_config),
            ..Default::default()
        }
    }
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        debug!("Docker daemon is reachable");
        Ok(())
    }

    async fn image_exists(&self, image: &ImageReference) -> Result<bool, RuntimeError> {
        match self.docker.inspect_image(&image.to_string()).await {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = classify(e);
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn build_image(
        &self,
        context: BuildContext,
        image: &ImageReference,
    ) -> Result<BuildProgressStream, RuntimeError> {
        let tar = context.to_tar().map_err(|e| {
            RuntimeError::OperationFailed(format!("creating build context: {}", e))
        })?;

        let options = BuildImageOptions {
            dockerfile: context.dockerfile_name().to_string(),
            t: image.to_string(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        info!("Building image {}", image);
        // The engine stream borrows its client, so the stream owns a clone
        let docker = self.docker.clone();
        let progress = async_stream::stream! {
            let mut builds = Box::pin(docker.build_image(options, None, Some(tar.into())));
            while let Some(item) = builds.next().await {
                yield item;
            }
        };

        Ok(build_events(progress))
    }

    async fn find_container(&self, name: &str) -> Result<Option<String>, RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![name.to_string()]);

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(classify)?;

        // The name filter matches substrings; engine names carry a leading "/"
        let wanted = format!("/{}", name);
        let found = containers.into_iter().find(|c| {
            c.names
                .as_ref()
                .map_or(false, |names| names.iter().any(|n| *n == wanted))
        });

        Ok(found.and_then(|c| c.id))
    }

    async fn create_container(&self, spec: ContainerSpec) -> Result<String, RuntimeError> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let config = Self::to_container_config(&spec);

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(classify)?;

        for warning in &response.warnings {
            warn!("Docker warning creating {}: {}", spec.name, warning);
        }
        info!("Created container {} with ID {}", spec.name, response.id);
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(classify)?;
        info!("Started container {}", id);
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        let options = StopContainerOptions {
            t: self.stop_timeout_secs,
        };

        match self.docker.stop_container(id, Some(options)).await {
            Ok(_) => {
                info!("Stopped container {}", id);
                Ok(())
            }
            Err(BollardError::DockerResponseServerError { status_code: 304, .. }) => {
                debug!("Container {} was already stopped", id);
                Ok(())
            }
            Err(e) => Err(classify(e)),
        }
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };

        match self.docker.remove_container(id, Some(options)).await {
            Ok(_) => {
                info!("Removed container {}", id);
                Ok(())
            }
            Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => {
                debug!("Container {} was already removed", id);
                Ok(())
            }
            Err(e) => Err(classify(e)),
        }
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDescriptor, RuntimeError> {
        let response = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(classify)?;

        Ok(ContainerDescriptor {
            id: response.id.unwrap_or_else(|| id.to_string()),
            name: response
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            image: response
                .config
                .and_then(|c| c.image)
                .unwrap_or_default(),
            running: response
                .state
                .and_then(|s| s.running)
                .unwrap_or(false),
        })
    }

    async fn wait_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut stream = self
            .docker
            .wait_container(id, None::<WaitContainerOptions<String>>);

        while let Some(result) = stream.next().await {
            match result {
                Ok(_) => {}
                // A non-zero exit code still means the container stopped
                Err(BollardError::DockerContainerWaitError { .. }) => break,
                Err(e) => return Err(classify(e)),
            }
        }
        Ok(())
    }

    async fn list_project_containers(&self) -> Result<Vec<ContainerListing>, RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![project::container_name("")]);

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(classify)?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let name = c
                    .names
                    .unwrap_or_default()
                    .into_iter()
                    .find(|n| project::project_from_container_name(n).is_some())?;
                Some(ContainerListing {
                    id: c.id.unwrap_or_default(),
                    name: name.trim_start_matches('/').to_string(),
                    image: c.image.unwrap_or_default(),
                    status: c.status.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn remove_images(&self, repository: &str) -> Result<Vec<String>, RuntimeError> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await
            .map_err(classify)?;

        let prefix = format!("{}:", repository);
        let mut removed = Vec::new();
        for image in images {
            let Some(tag) = image
                .repo_tags
                .iter()
                .find(|t| t.starts_with(&prefix) || *t == repository)
                .cloned()
            else {
                continue;
            };

            let options = RemoveImageOptions {
                force: true,
                ..Default::default()
            };
            match self.docker.remove_image(&image.id, Some(options), None).await {
                Ok(_) => {
                    info!("Removed image {}", tag);
                    removed.push(tag);
                }
                Err(e) => warn!("Could not remove image {}: {}", tag, e),
            }
        }

        Ok(removed)
    }

    async fn exec_create(
        &self,
        container_id: &str,
        command: &[String],
    ) -> Result<String, RuntimeError> {
        let options = CreateExecOptions {
            cmd: Some(command.to_vec()),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(true),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(container_id, options)
            .await
            .map_err(classify)?;
        debug!("Created exec {} in container {}", exec.id, container_id);
        Ok(exec.id)
    }

    async fn exec_attach(&self, exec_id: &str) -> Result<ExecStream, RuntimeError> {
        let options = StartExecOptions {
            detach: false,
            tty: true,
            ..Default::default()
        };

        match self
            .docker
            .start_exec(exec_id, Some(options))
            .await
            .map_err(classify)?
        {
            StartExecResults::Attached { output, input } => {
                let bytes = output.map(|item| {
                    item.map(LogOutput::into_bytes)
                        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
                });
                Ok(ExecStream {
                    reader: Box::pin(StreamReader::new(bytes)),
                    writer: input,
                })
            }
            StartExecResults::Detached => Err(RuntimeError::OperationFailed(format!(
                "exec {} started detached",
                exec_id
            ))),
        }
    }

    async fn exec_resize(&self, exec_id: &str, size: TerminalSize) -> Result<(), RuntimeError> {
        self.docker
            .resize_exec(
                exec_id,
                ResizeExecOptions {
                    width: size.width,
                    height: size.height,
                },
            )
            .await
            .map_err(classify)
    }
}
