// ABOUTME: One-shot lifecycle commands over project containers and images
// list, down, destroy and rebuild; none of them attach

use crate::config::SessionConfig;
use crate::docker::{ContainerListing, RuntimeClient, SessionReconciler};
use crate::error::SessionError;
use crate::project::{ImageReference, Project};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownOutcome {
    Stopped,
    AlreadyStopped,
    NotFound,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestroyReport {
    pub container_removed: bool,
    pub images_removed: Vec<String>,
}

pub async fn list(runtime: &dyn RuntimeClient) -> Result<Vec<ContainerListing>, SessionError> {
    runtime
        .list_project_containers()
        .await
        .map_err(|e| SessionError::runtime("listing containers", e))
}

/// Stops the project's container and waits for it to exit.
pub async fn down(runtime: &dyn RuntimeClient, project: &Project) -> Result<DownOutcome, SessionError> {
    let name = project.container_name();
    let Some(id) = runtime
        .find_container(&name)
        .await
        .map_err(|e| SessionError::runtime("finding container", e))?
    else {
        return Ok(DownOutcome::NotFound);
    };

    let descriptor = runtime
        .inspect_container(&id)
        .await
        .map_err(|e| SessionError::runtime("inspecting container", e))?;
    if !descriptor.running {
        return Ok(DownOutcome::AlreadyStopped);
    }

    stop_and_wait(runtime, &id).await?;
    info!("Stopped {}", name);
    Ok(DownOutcome::Stopped)
}

/// Removes the project's container, then every image in its repository.
pub async fn destroy(runtime: &dyn RuntimeClient, project: &Project) -> Result<DestroyReport, SessionError> {
    let mut report = DestroyReport::default();

    if let Some(id) = runtime
        .find_container(&project.container_name())
        .await
        .map_err(|e| SessionError::runtime("finding container", e))?
    {
        let descriptor = runtime
            .inspect_container(&id)
            .await
            .map_err(|e| SessionError::runtime("inspecting container", e))?;
        if descriptor.running {
            stop_and_wait(runtime, &id).await?;
        }
        runtime
            .remove_container(&id, true)
            .await
            .map_err(|e| SessionError::runtime("removing container", e))?;
        report.container_removed = true;
    }

    report.images_removed = runtime
        .remove_images(&project.repository())
        .await
        .map_err(|e| SessionError::runtime("removing images", e))?;
    info!(
        "Destroyed {} ({} images removed)",
        project.name(),
        report.images_removed.len()
    );
    Ok(report)
}

/// Discards the container and images, then builds the current image from scratch.
/// The next session creates a fresh container.
pub async fn rebuild(
    runtime: Arc<dyn RuntimeClient>,
    config: &SessionConfig,
    project: &Project,
    progress: Option<mpsc::UnboundedSender<String>>,
) -> Result<ImageReference, SessionError> {
    destroy(&*runtime, project).await?;

    let image = project.image_reference(config.raw());
    let mut reconciler = SessionReconciler::new(runtime);
    if let Some(sender) = progress {
        reconciler = reconciler.with_progress(sender);
    }
    reconciler.build(config, &image).await?;
    Ok(image)
}

async fn stop_and_wait(runtime: &dyn RuntimeClient, id: &str) -> Result<(), SessionError> {
    runtime
        .stop_container(id)
        .await
        .map_err(|e| SessionError::runtime("stopping container", e))?;
    runtime
        .wait_container(id)
        .await
        .map_err(|e| SessionError::runtime("waiting for container", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RuntimeCall, TrackedRuntimeClient};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_list_shows_only_project_containers() {
        let client = TrackedRuntimeClient::default();
        client.seed_container("rig-api", "rig-api:6ae8a7555520", true);
        client.seed_container("rig-web", "rig-web:e3b0c44298fc", false);
        client.seed_container("postgres", "postgres:16", true);

        let rows = list(&client).await.unwrap();

        let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["rig-api", "rig-web"]);
    }

    #[tokio::test]
    async fn test_down_stops_running_container() {
        let client = TrackedRuntimeClient::default();
        let id = client.seed_container("rig-api", "rig-api:6ae8a7555520", true);

        let outcome = down(&client, &Project::named("api")).await.unwrap();

        assert_eq!(outcome, DownOutcome::Stopped);
        assert_eq!(client.mutating_calls(), vec![RuntimeCall::Stop(id.clone())]);
        assert!(!client.container(&id).unwrap().running);
    }

    #[tokio::test]
    async fn test_down_leaves_stopped_and_missing_alone() {
        let client = TrackedRuntimeClient::default();
        client.seed_container("rig-api", "rig-api:6ae8a7555520", false);

        assert_eq!(
            down(&client, &Project::named("api")).await.unwrap(),
            DownOutcome::AlreadyStopped
        );
        assert_eq!(
            down(&client, &Project::named("web")).await.unwrap(),
            DownOutcome::NotFound
        );
        assert!(client.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_destroy_removes_container_and_every_tag() {
        let client = TrackedRuntimeClient::default();
        let id = client.seed_container("rig-api", "rig-api:6ae8a7555520", true);
        client.seed_image(&ImageReference::new("rig-api", "6ae8a7555520"));
        client.seed_image(&ImageReference::new("rig-api", "e3b0c44298fc"));
        client.seed_image(&ImageReference::new("rig-web", "e3b0c44298fc"));

        let report = destroy(&client, &Project::named("api")).await.unwrap();

        assert!(report.container_removed);
        assert_eq!(report.images_removed.len(), 2);
        assert_eq!(
            client.mutating_calls(),
            vec![
                RuntimeCall::Stop(id.clone()),
                RuntimeCall::Remove(id, true),
                RuntimeCall::RemoveImages("rig-api".to_string()),
            ]
        );
        assert_eq!(client.container_count(), 0);
        assert_eq!(client.image_count(), 1);
    }

    #[tokio::test]
    async fn test_rebuild_replaces_image_without_creating_container() {
        let client = Arc::new(TrackedRuntimeClient::default());
        let config = SessionConfig::parse(b"languages:\n  go:\n    version: \"1.22\"\n").unwrap();
        let project = Project::from_dir("/src/api");
        let current = project.image_reference(config.raw());
        client.seed_image(&current);
        client.seed_container("rig-api", &current.to_string(), false);

        let image = rebuild(client.clone(), &config, &project, None).await.unwrap();

        assert_eq!(image, current);
        assert!(client.has_image(&current));
        assert_eq!(client.container_count(), 0);
        assert_eq!(
            client.mutating_calls().last(),
            Some(&RuntimeCall::Build(current.to_string()))
        );
    }
}
