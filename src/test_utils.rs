// ABOUTME: In-memory fakes for the runtime, terminal and resize seams
// Records every mutating runtime call so tests can assert on exact sequences

use crate::docker::{
    BuildEvent, BuildProgressStream, ContainerDescriptor, ContainerListing, ContainerSpec,
    ExecStream, RuntimeClient, RuntimeError, TerminalSize,
};
use crate::dockerfile::BuildContext;
use crate::project::{ImageReference, NAME_PREFIX};
use crate::terminal::{ResizeEventSource, ResizeEvents, TerminalControl};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::{BTreeSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Build(String),
    Create(String),
    Start(String),
    Stop(String),
    Remove(String, bool),
    RemoveImages(String),
    ExecCreate(String, Vec<String>),
    ExecAttach(String),
    ExecResize(String, TerminalSize),
}

impl RuntimeCall {
    fn is_mutating(&self) -> bool {
        matches!(
            self,
            RuntimeCall::Build(_)
                | RuntimeCall::Create(_)
                | RuntimeCall::Start(_)
                | RuntimeCall::Stop(_)
                | RuntimeCall::Remove(..)
                | RuntimeCall::RemoveImages(_)
        )
    }
}

#[derive(Default)]
struct FakeEngine {
    images: BTreeSet<String>,
    containers: Vec<ContainerDescriptor>,
    calls: Vec<RuntimeCall>,
    created_specs: Vec<ContainerSpec>,
    next_id: usize,
    build_error: Option<String>,
    create_error: Option<RuntimeError>,
    exec_streams: VecDeque<ExecStream>,
    fail_resizes: bool,
}

impl FakeEngine {
    fn allocate_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

/// A fake engine that keeps images and containers in memory.
#[derive(Default)]
pub struct TrackedRuntimeClient {
    state: Mutex<FakeEngine>,
}

impl TrackedRuntimeClient {
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutating_calls(&self) -> Vec<RuntimeCall> {
        self.calls().into_iter().filter(RuntimeCall::is_mutating).collect()
    }

    pub fn resize_calls(&self) -> Vec<TerminalSize> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RuntimeCall::ExecResize(_, size) => Some(size),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn created_specs(&self) -> Vec<ContainerSpec> {
        self.state.lock().unwrap().created_specs.clone()
    }

    pub fn container(&self, id: &str) -> Option<ContainerDescriptor> {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub fn container_count(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }

    pub fn seed_container(&self, name: &str, image: &str, running: bool) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.allocate_id("seeded");
        state.containers.push(ContainerDescriptor {
            id: id.clone(),
            name: name.to_string(),
            image: image.to_string(),
            running,
        });
        id
    }

    pub fn seed_image(&self, image: &ImageReference) {
        self.state.lock().unwrap().images.insert(image.to_string());
    }

    pub fn has_image(&self, image: &ImageReference) -> bool {
        self.state
            .lock()
            .unwrap()
            .images
            .contains(&image.to_string())
    }

    pub fn image_count(&self) -> usize {
        self.state.lock().unwrap().images.len()
    }

    pub fn fail_build_with(&self, message: &str) {
        self.state.lock().unwrap().build_error = Some(message.to_string());
    }

    /// The next create fails with `error`; later creates succeed.
    pub fn fail_create_with(&self, error: RuntimeError) {
        self.state.lock().unwrap().create_error = Some(error);
    }

    pub fn fail_resizes(&self) {
        self.state.lock().unwrap().fail_resizes = true;
    }

    /// Queues the duplex end the next `exec_attach` hands out.
    pub fn queue_exec_stream(&self, stream: DuplexStream) {
        let (reader, writer) = tokio::io::split(stream);
        self.state.lock().unwrap().exec_streams.push_back(ExecStream {
            reader: Box::pin(reader),
            writer: Box::pin(writer),
        });
    }

    fn record(&self, call: RuntimeCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl RuntimeClient for TrackedRuntimeClient {
    async fn ping(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn image_exists(&self, image: &ImageReference) -> Result<bool, RuntimeError> {
        Ok(self.has_image(image))
    }

    async fn build_image(
        &self,
        _context: BuildContext,
        image: &ImageReference,
    ) -> Result<BuildProgressStream, RuntimeError> {
        self.record(RuntimeCall::Build(image.to_string()));
        let mut state = self.state.lock().unwrap();

        let mut events = vec![Ok(BuildEvent::Output(
            "Step 1/1 : FROM debian:bookworm-slim\n".to_string(),
        ))];
        match state.build_error.clone() {
            Some(message) => events.push(Ok(BuildEvent::Error(message))),
            None => {
                state.images.insert(image.to_string());
            }
        }
        Ok(stream::iter(events).boxed())
    }

    async fn find_container(&self, name: &str) -> Result<Option<String>, RuntimeError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .containers
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.id.clone()))
    }

    async fn create_container(&self, spec: ContainerSpec) -> Result<String, RuntimeError> {
        self.record(RuntimeCall::Create(spec.name.clone()));
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.create_error.take() {
            return Err(error);
        }
        if state.containers.iter().any(|c| c.name == spec.name) {
            return Err(RuntimeError::OperationFailed(format!(
                "Conflict. The container name \"/{}\" is already in use",
                spec.name
            )));
        }

        let id = state.allocate_id("container");
        state.containers.push(ContainerDescriptor {
            id: id.clone(),
            name: spec.name.clone(),
            image: spec.image.to_string(),
            running: false,
        });
        state.created_specs.push(spec);
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::Start(id.to_string()));
        let mut state = self.state.lock().unwrap();
        match state.containers.iter_mut().find(|c| c.id == id) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => Err(RuntimeError::NotFound(id.to_string())),
        }
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::Stop(id.to_string()));
        let mut state = self.state.lock().unwrap();
        match state.containers.iter_mut().find(|c| c.id == id) {
            Some(container) => {
                container.running = false;
                Ok(())
            }
            None => Err(RuntimeError::NotFound(id.to_string())),
        }
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::Remove(id.to_string(), force));
        let mut state = self.state.lock().unwrap();
        if !force && state.containers.iter().any(|c| c.id == id && c.running) {
            return Err(RuntimeError::OperationFailed(format!(
                "You cannot remove a running container {}",
                id
            )));
        }
        state.containers.retain(|c| c.id != id);
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDescriptor, RuntimeError> {
        self.container(id)
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))
    }

    async fn wait_container(&self, _id: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn list_project_containers(&self) -> Result<Vec<ContainerListing>, RuntimeError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .containers
            .iter()
            .filter(|c| c.name.starts_with(NAME_PREFIX))
            .map(|c| ContainerListing {
                id: c.id.clone(),
                name: c.name.clone(),
                image: c.image.clone(),
                status: if c.running { "Up" } else { "Exited (0)" }.to_string(),
            })
            .collect())
    }

    async fn remove_images(&self, repository: &str) -> Result<Vec<String>, RuntimeError> {
        self.record(RuntimeCall::RemoveImages(repository.to_string()));
        let mut state = self.state.lock().unwrap();
        let prefix = format!("{}:", repository);
        let removed: Vec<String> = state
            .images
            .iter()
            .filter(|image| image.starts_with(&prefix))
            .cloned()
            .collect();
        state.images.retain(|image| !image.starts_with(&prefix));
        Ok(removed)
    }

    async fn exec_create(
        &self,
        container_id: &str,
        command: &[String],
    ) -> Result<String, RuntimeError> {
        self.record(RuntimeCall::ExecCreate(
            container_id.to_string(),
            command.to_vec(),
        ));
        Ok(self.state.lock().unwrap().allocate_id("exec"))
    }

    async fn exec_attach(&self, exec_id: &str) -> Result<ExecStream, RuntimeError> {
        self.record(RuntimeCall::ExecAttach(exec_id.to_string()));
        self.state
            .lock()
            .unwrap()
            .exec_streams
            .pop_front()
            .ok_or_else(|| RuntimeError::OperationFailed(format!("exec {} not running", exec_id)))
    }

    async fn exec_resize(&self, exec_id: &str, size: TerminalSize) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::ExecResize(exec_id.to_string(), size));
        if self.state.lock().unwrap().fail_resizes {
            return Err(RuntimeError::OperationFailed(
                "cannot resize a stopped exec".to_string(),
            ));
        }
        Ok(())
    }
}

/// A terminal whose mode changes are counted instead of applied.
pub struct FakeTerminal {
    tty: bool,
    size: Mutex<TerminalSize>,
    raw_enables: AtomicUsize,
    restores: AtomicUsize,
}

impl FakeTerminal {
    pub fn tty(width: u16, height: u16) -> Self {
        Self {
            tty: true,
            size: Mutex::new(TerminalSize::new(width, height)),
            raw_enables: AtomicUsize::new(0),
            restores: AtomicUsize::new(0),
        }
    }

    pub fn not_a_tty() -> Self {
        Self {
            tty: false,
            ..Self::tty(80, 24)
        }
    }

    pub fn set_size(&self, width: u16, height: u16) {
        *self.size.lock().unwrap() = TerminalSize::new(width, height);
    }

    pub fn raw_enables(&self) -> usize {
        self.raw_enables.load(Ordering::SeqCst)
    }

    pub fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }
}

impl TerminalControl for FakeTerminal {
    fn is_terminal(&self) -> bool {
        self.tty
    }

    fn enable_raw_mode(&self) -> io::Result<()> {
        self.raw_enables.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn restore_mode(&self) -> io::Result<()> {
        self.restores.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn size(&self) -> io::Result<TerminalSize> {
        Ok(*self.size.lock().unwrap())
    }
}

/// Resize events driven by the test through a channel.
pub struct ChannelResizeSource {
    receiver: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
}

impl ChannelResizeSource {
    pub fn new() -> (Self, mpsc::UnboundedSender<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                receiver: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

struct ChannelResizeEvents(mpsc::UnboundedReceiver<()>);

#[async_trait]
impl ResizeEvents for ChannelResizeEvents {
    async fn recv(&mut self) -> Option<()> {
        self.0.recv().await
    }
}

impl ResizeEventSource for ChannelResizeSource {
    fn subscribe(&self) -> io::Result<Box<dyn ResizeEvents>> {
        self.receiver
            .lock()
            .unwrap()
            .take()
            .map(|rx| Box::new(ChannelResizeEvents(rx)) as Box<dyn ResizeEvents>)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "already subscribed"))
    }
}
