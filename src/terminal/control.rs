// ABOUTME: Local terminal control: tty detection, raw mode and window size
// RawModeGuard restores the prior mode exactly once, on drop if not before

use crate::docker::TerminalSize;
use crossterm::tty::IsTty;
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};

pub trait TerminalControl: Send + Sync {
    /// Whether standard input is a terminal device
    fn is_terminal(&self) -> bool;

    fn enable_raw_mode(&self) -> io::Result<()>;

    /// Returns the terminal to the mode saved by `enable_raw_mode`
    fn restore_mode(&self) -> io::Result<()>;

    fn size(&self) -> io::Result<TerminalSize>;
}

/// The process's own terminal, driven through crossterm
#[derive(Debug, Default, Clone, Copy)]
pub struct CrosstermTerminal;

impl TerminalControl for CrosstermTerminal {
    fn is_terminal(&self) -> bool {
        io::stdin().is_tty()
    }

    fn enable_raw_mode(&self) -> io::Result<()> {
        crossterm::terminal::enable_raw_mode()
    }

    fn restore_mode(&self) -> io::Result<()> {
        crossterm::terminal::disable_raw_mode()
    }

    fn size(&self) -> io::Result<TerminalSize> {
        let (width, height) = crossterm::terminal::size()?;
        Ok(TerminalSize::new(width, height))
    }
}

pub struct RawModeGuard {
    terminal: Arc<dyn TerminalControl>,
    active: bool,
}

impl RawModeGuard {
    pub fn enter(terminal: Arc<dyn TerminalControl>) -> io::Result<Self> {
        terminal.enable_raw_mode()?;
        debug!("Terminal switched to raw mode");
        Ok(Self {
            terminal,
            active: true,
        })
    }

    /// Restores the saved mode; later calls are no-ops.
    pub fn restore(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        self.terminal.restore_mode()?;
        debug!("Terminal mode restored");
        Ok(())
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!("Failed to restore terminal mode: {}", e);
        }
    }
}
