// ABOUTME: Terminal resize notifications as a pluggable event source
// On unix this is SIGWINCH through tokio's signal driver

use async_trait::async_trait;
use std::io;

#[async_trait]
pub trait ResizeEvents: Send {
    /// Waits for the next size change; `None` once no more can arrive.
    async fn recv(&mut self) -> Option<()>;
}

pub trait ResizeEventSource: Send + Sync {
    fn subscribe(&self) -> io::Result<Box<dyn ResizeEvents>>;
}

/// Window-change signals delivered to this process
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalResizeSource;

#[cfg(unix)]
struct WindowChangeSignal(tokio::signal::unix::Signal);

#[cfg(unix)]
#[async_trait]
impl ResizeEvents for WindowChangeSignal {
    async fn recv(&mut self) -> Option<()> {
        self.0.recv().await
    }
}

#[cfg(not(unix))]
struct NoResizeEvents;

#[cfg(not(unix))]
#[async_trait]
impl ResizeEvents for NoResizeEvents {
    async fn recv(&mut self) -> Option<()> {
        std::future::pending().await
    }
}

impl ResizeEventSource for SignalResizeSource {
    #[cfg(unix)]
    fn subscribe(&self) -> io::Result<Box<dyn ResizeEvents>> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Box::new(WindowChangeSignal(signal(SignalKind::window_change())?)))
    }

    #[cfg(not(unix))]
    fn subscribe(&self) -> io::Result<Box<dyn ResizeEvents>> {
        Ok(Box::new(NoResizeEvents))
    }
}
