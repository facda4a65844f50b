// ABOUTME: Interactive exec attach bridging the local terminal to a container process
// Raw mode, resize propagation and the two byte copies live and die together

use super::control::{CrosstermTerminal, RawModeGuard, TerminalControl};
use super::resize::{ResizeEventSource, ResizeEvents, SignalResizeSource};
use crate::docker::{ExecStream, RuntimeClient};
use crate::error::SessionError;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttachState {
    Idle,
    RawMode,
    Attached,
    Draining,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Input,
    Output,
}

impl Direction {
    fn stage(self) -> &'static str {
        match self {
            Direction::Input => "copying input",
            Direction::Output => "copying output",
        }
    }
}

type CopyOutcome = (Direction, io::Result<u64>);

/// Listener task that forwards terminal size changes to one exec.
struct ResizeSubscription {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ResizeSubscription {
    fn spawn(
        mut events: Box<dyn ResizeEvents>,
        runtime: Arc<dyn RuntimeClient>,
        terminal: Arc<dyn TerminalControl>,
        exec_id: String,
        token: CancellationToken,
    ) -> Self {
        let listener = token.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = listener.cancelled() => break,
                    event = events.recv() => match event {
                        Some(()) => propagate_size(&*runtime, &*terminal, &exec_id).await,
                        None => break,
                    },
                }
            }
            debug!("Resize listener for exec {} stopped", exec_id);
        });
        Self { token, handle }
    }

    fn abort(&self) {
        self.token.cancel();
        self.handle.abort();
    }

    async fn stop(self) {
        self.abort();
        let _ = self.handle.await;
    }
}

async fn propagate_size(runtime: &dyn RuntimeClient, terminal: &dyn TerminalControl, exec_id: &str) {
    let size = match terminal.size() {
        Ok(size) => size,
        Err(e) => {
            debug!("Could not read terminal size: {}", e);
            return;
        }
    };
    if let Err(e) = runtime.exec_resize(exec_id, size).await {
        debug!(
            "Resize of exec {} to {}x{} failed: {}",
            exec_id, size.width, size.height, e
        );
    }
}

/// Resources held while attached. Teardown order is resize listener, terminal
/// mode, then the stream; fields are declared in that order so `Drop` agrees.
/// The copy tasks own both halves of the exec stream.
struct AttachmentSession {
    resize: Option<ResizeSubscription>,
    raw_mode: RawModeGuard,
    copies: JoinSet<CopyOutcome>,
    exec_id: String,
    state: AttachState,
}

impl AttachmentSession {
    fn new(exec_id: String, raw_mode: RawModeGuard) -> Self {
        debug!(
            "Attach {}: {:?} -> {:?}",
            exec_id,
            AttachState::Idle,
            AttachState::RawMode
        );
        Self {
            resize: None,
            raw_mode,
            copies: JoinSet::new(),
            exec_id,
            state: AttachState::RawMode,
        }
    }

    fn transition(&mut self, next: AttachState) {
        debug!("Attach {}: {:?} -> {:?}", self.exec_id, self.state, next);
        self.state = next;
    }

    fn restore_terminal(&mut self) {
        if let Err(e) = self.raw_mode.restore() {
            warn!("Failed to restore terminal mode: {}", e);
        }
    }

    /// Full teardown. The exec stream is closed once this returns.
    async fn close(&mut self) {
        if self.state == AttachState::Closed {
            return;
        }
        if let Some(resize) = self.resize.take() {
            resize.stop().await;
        }
        self.restore_terminal();
        self.copies.abort_all();
        // Aborted tasks finish at their next poll, dropping the stream halves they own
        while self.copies.join_next().await.is_some() {}
        self.transition(AttachState::Closed);
    }
}

impl Drop for AttachmentSession {
    fn drop(&mut self) {
        if self.state == AttachState::Closed {
            return;
        }
        if let Some(resize) = self.resize.take() {
            resize.abort();
        }
        self.restore_terminal();
        self.copies.abort_all();
    }
}

/// Runs a command inside a container with the local terminal attached.
pub struct InteractiveAttachment {
    runtime: Arc<dyn RuntimeClient>,
    terminal: Arc<dyn TerminalControl>,
    resize_source: Arc<dyn ResizeEventSource>,
}

impl InteractiveAttachment {
    pub fn new(runtime: Arc<dyn RuntimeClient>) -> Self {
        Self::with_terminal(
            runtime,
            Arc::new(CrosstermTerminal),
            Arc::new(SignalResizeSource),
        )
    }

    pub fn with_terminal(
        runtime: Arc<dyn RuntimeClient>,
        terminal: Arc<dyn TerminalControl>,
        resize_source: Arc<dyn ResizeEventSource>,
    ) -> Self {
        Self {
            runtime,
            terminal,
            resize_source,
        }
    }

    /// Attaches the process's stdin and stdout.
    pub async fn attach(
        &self,
        container_id: &str,
        command: &[String],
        cancel: CancellationToken,
    ) -> Result<(), SessionError> {
        self.attach_with_io(
            container_id,
            command,
            tokio::io::stdin(),
            tokio::io::stdout(),
            cancel,
        )
        .await
    }

    /// Returns `Ok` when either side reaches end of stream, `Canceled` when
    /// `cancel` fires first. The terminal is restored exactly once on every path.
    pub async fn attach_with_io<R, W>(
        &self,
        container_id: &str,
        command: &[String],
        input: R,
        output: W,
        cancel: CancellationToken,
    ) -> Result<(), SessionError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        if !self.terminal.is_terminal() {
            return Err(SessionError::NotATerminal);
        }
        if cancel.is_cancelled() {
            return Err(SessionError::Canceled);
        }

        let exec_id = self
            .runtime
            .exec_create(container_id, command)
            .await
            .map_err(|e| SessionError::runtime("creating exec", e))?;
        info!(
            "Attaching to container {} via exec {}: {:?}",
            container_id, exec_id, command
        );

        let raw_mode = RawModeGuard::enter(self.terminal.clone())
            .map_err(|e| SessionError::io("entering raw mode", e))?;
        let mut session = AttachmentSession::new(exec_id.clone(), raw_mode);

        let ExecStream { reader, writer } = self
            .runtime
            .exec_attach(&exec_id)
            .await
            .map_err(|e| SessionError::runtime("attaching to exec", e))?;
        session.transition(AttachState::Attached);

        propagate_size(&*self.runtime, &*self.terminal, &exec_id).await;
        match self.resize_source.subscribe() {
            Ok(events) => {
                session.resize = Some(ResizeSubscription::spawn(
                    events,
                    self.runtime.clone(),
                    self.terminal.clone(),
                    exec_id.clone(),
                    cancel.child_token(),
                ));
            }
            Err(e) => debug!("Resize notifications unavailable: {}", e),
        }

        session.copies.spawn(async move {
            let mut input = input;
            let mut writer = writer;
            (Direction::Input, tokio::io::copy(&mut input, &mut writer).await)
        });
        session.copies.spawn(async move {
            let mut reader = reader;
            let mut output = output;
            let copied = tokio::io::copy(&mut reader, &mut output).await;
            let flushed = output.flush().await;
            (Direction::Output, copied.and_then(|n| flushed.map(|_| n)))
        });

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Attach {} canceled", exec_id);
                Err(SessionError::Canceled)
            }
            finished = session.copies.join_next() => match finished {
                Some(Ok((direction, Ok(bytes)))) => {
                    debug!("Attach {}: {:?} reached end of stream after {} bytes", exec_id, direction, bytes);
                    Ok(())
                }
                Some(Ok((direction, Err(e)))) => Err(SessionError::io(direction.stage(), e)),
                Some(Err(e)) => Err(SessionError::io(
                    "copying",
                    io::Error::new(io::ErrorKind::Other, e),
                )),
                None => Ok(()),
            },
        };

        session.transition(AttachState::Draining);
        session.close().await;
        outcome
    }
}
