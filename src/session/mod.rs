// ABOUTME: Per-invocation glue: verify the engine, reconcile the project container, attach
// One-shot lifecycle commands live in `commands` and never reconcile

pub mod commands;

use crate::config::SessionConfig;
use crate::docker::{RuntimeClient, SessionReconciler};
use crate::error::SessionError;
use crate::project::Project;
use crate::terminal::InteractiveAttachment;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct SessionOrchestrator {
    runtime: Arc<dyn RuntimeClient>,
    attachment: InteractiveAttachment,
}

impl SessionOrchestrator {
    pub fn new(runtime: Arc<dyn RuntimeClient>) -> Self {
        let attachment = InteractiveAttachment::new(runtime.clone());
        Self::with_attachment(runtime, attachment)
    }

    pub fn with_attachment(
        runtime: Arc<dyn RuntimeClient>,
        attachment: InteractiveAttachment,
    ) -> Self {
        Self {
            runtime,
            attachment,
        }
    }

    /// Pings the engine and reconciles, returning the container id.
    /// Progress lines go to `progress`, which is dropped before returning.
    pub async fn prepare(
        &self,
        config: &SessionConfig,
        project: &Project,
        progress: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<String, SessionError> {
        self.runtime
            .ping()
            .await
            .map_err(|source| SessionError::RuntimeUnavailable {
                stage: "pinging docker",
                source,
            })?;

        let mut reconciler = SessionReconciler::new(self.runtime.clone());
        if let Some(sender) = progress {
            reconciler = reconciler.with_progress(sender);
        }
        let container_id = reconciler.reconcile(config, project).await?;
        info!("Project {} ready in container {}", project.name(), container_id);
        Ok(container_id)
    }

    pub async fn attach(
        &self,
        container_id: &str,
        command: &[String],
        cancel: CancellationToken,
    ) -> Result<(), SessionError> {
        self.attachment.attach(container_id, command, cancel).await
    }

    /// `prepare` followed by `attach`, with `command` defaulting to the configured shell.
    pub async fn run(
        &self,
        config: &SessionConfig,
        project: &Project,
        command: Option<Vec<String>>,
        cancel: CancellationToken,
    ) -> Result<(), SessionError> {
        let container_id = self.prepare(config, project, None).await?;
        let command = command.unwrap_or_else(|| config.default_command());
        self.attach(&container_id, &command, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::client::MockRuntimeClient;
    use crate::docker::RuntimeError;
    use crate::test_utils::{RuntimeCall, TrackedRuntimeClient};

    fn config() -> SessionConfig {
        SessionConfig::parse(b"languages:\n  python:\n    version: \"3.12\"\nshell: bash\n").unwrap()
    }

    #[tokio::test]
    async fn test_unreachable_engine_stops_before_reconcile() {
        let mut mock = MockRuntimeClient::new();
        mock.expect_ping()
            .times(1)
            .returning(|| Err(RuntimeError::Unavailable("no such file or directory".to_string())));
        mock.expect_image_exists().never();
        mock.expect_exec_create().never();

        let orchestrator = SessionOrchestrator::new(Arc::new(mock));
        let result = orchestrator
            .prepare(&config(), &Project::from_dir("/src/svc"), None)
            .await;

        assert!(matches!(
            result,
            Err(SessionError::RuntimeUnavailable { stage: "pinging docker", .. })
        ));
    }

    #[tokio::test]
    async fn test_prepare_reports_progress_and_starts_container() {
        let client = Arc::new(TrackedRuntimeClient::default());
        let orchestrator = SessionOrchestrator::new(client.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let container_id = orchestrator
            .prepare(&config(), &Project::from_dir("/src/svc"), Some(tx))
            .await
            .unwrap();

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        assert!(lines.iter().any(|l| l == "Creating container rig-svc..."));
        assert!(client.container(&container_id).unwrap().running);
        assert!(client
            .mutating_calls()
            .contains(&RuntimeCall::Start(container_id)));
    }

    #[tokio::test]
    async fn test_prepare_is_idempotent() {
        let client = Arc::new(TrackedRuntimeClient::default());
        let orchestrator = SessionOrchestrator::new(client.clone());
        let project = Project::from_dir("/src/svc");

        let first = orchestrator.prepare(&config(), &project, None).await.unwrap();
        client.clear_calls();
        let second = orchestrator.prepare(&config(), &project, None).await.unwrap();

        assert_eq!(first, second);
        assert!(client.mutating_calls().is_empty());
        assert_eq!(client.created_specs()[0].command, vec!["/bin/bash".to_string()]);
    }
}
