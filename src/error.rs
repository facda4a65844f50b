// ABOUTME: Error taxonomy for reconciling and attaching to project containers
// Every variant that originates in a runtime call carries the stage that failed

use crate::docker::RuntimeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{stage}: build failed: {reason}")]
    BuildFailed { stage: &'static str, reason: String },

    #[error("{stage}: container runtime unavailable: {source}")]
    RuntimeUnavailable {
        stage: &'static str,
        #[source]
        source: RuntimeError,
    },

    #[error("{stage}: {source}")]
    ContainerState {
        stage: &'static str,
        #[source]
        source: RuntimeError,
    },

    #[error("stdin is not a terminal")]
    NotATerminal,

    #[error("{stage}: {source}")]
    Io {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("session canceled")]
    Canceled,
}

impl SessionError {
    /// Wraps a runtime failure, promoting connection failures to `RuntimeUnavailable`.
    pub fn runtime(stage: &'static str, source: RuntimeError) -> Self {
        if source.is_unavailable() {
            SessionError::RuntimeUnavailable { stage, source }
        } else {
            SessionError::ContainerState { stage, source }
        }
    }

    pub fn build(stage: &'static str, reason: impl Into<String>) -> Self {
        SessionError::BuildFailed {
            stage,
            reason: reason.into(),
        }
    }

    pub fn io(stage: &'static str, source: std::io::Error) -> Self {
        SessionError::Io { stage, source }
    }
}
