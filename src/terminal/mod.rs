// ABOUTME: Local terminal handling and interactive container attach

pub mod attach;
pub mod control;
pub mod resize;

pub use attach::InteractiveAttachment;
pub use control::{CrosstermTerminal, RawModeGuard, TerminalControl};
pub use resize::{ResizeEventSource, ResizeEvents, SignalResizeSource};
