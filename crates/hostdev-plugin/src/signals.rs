//! Process signal handling for the host event loop.

use std::fmt;

use tokio::signal::unix::{Signal, SignalKind, signal};

use crate::error::{PluginError, PluginResult};

/// Signals the host event loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    /// SIGHUP: re-register without tearing anything down.
    Hangup,
    /// SIGINT.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// SIGQUIT.
    Quit,
}

impl HostSignal {
    /// Whether this signal ends the process.
    #[must_use]
    pub fn is_terminating(self) -> bool {
        !matches!(self, Self::Hangup)
    }
}

impl fmt::Display for HostSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hangup => "SIGHUP",
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Quit => "SIGQUIT",
        })
    }
}

/// Listens for SIGHUP, SIGINT, SIGTERM and SIGQUIT.
#[derive(Debug)]
pub struct SignalListener {
    hangup: Signal,
    interrupt: Signal,
    terminate: Signal,
    quit: Signal,
}

impl SignalListener {
    /// Install handlers for all four signals.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Signal`] if a handler cannot be installed.
    pub fn new() -> PluginResult<Self> {
        let install = |kind| signal(kind).map_err(PluginError::Signal);
        Ok(Self {
            hangup: install(SignalKind::hangup())?,
            interrupt: install(SignalKind::interrupt())?,
            terminate: install(SignalKind::terminate())?,
            quit: install(SignalKind::quit())?,
        })
    }

    /// Wait for the next signal. Cancel safe.
    pub async fn recv(&mut self) -> HostSignal {
        tokio::select! {
            Some(()) = self.hangup.recv() => HostSignal::Hangup,
            Some(()) = self.interrupt.recv() => HostSignal::Interrupt,
            Some(()) = self.terminate.recv() => HostSignal::Terminate,
            Some(()) = self.quit.recv() => HostSignal::Quit,
            // The signal driver is gone; nothing more will arrive.
            else => HostSignal::Terminate,
        }
    }
}
