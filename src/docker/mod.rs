// ABOUTME: Docker integration for per-project sandbox containers

pub mod client;
pub mod reconciler;
pub mod runtime;

pub use client::{
    BuildEvent, BuildProgressStream, ContainerDescriptor, ContainerListing, ContainerSpec,
    ExecStream, RestartPolicy, RuntimeClient, RuntimeError, TerminalSize,
};
pub use reconciler::{container_spec, SessionReconciler};
pub use runtime::DockerRuntime;
