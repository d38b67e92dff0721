//! The process-lifetime dispatch loop.
//!
//! ```text
//! timer tick ───────────────┐
//! kubelet socket created ───┤
//! SIGHUP ───────────────────┼──► dispatch() ──► PluginSupervisor
//! SIGINT/SIGTERM/SIGQUIT ───┤
//! cancellation token ───────┘
//! ```
//!
//! A terminating signal or the cancellation token ends the loop, after which
//! every endpoint is stopped.

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::Duration;

use hostdev_config::PluginSettings;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::PluginResult;
use crate::signals::{HostSignal, SignalListener};
use crate::supervisor::PluginSupervisor;
use crate::watcher::{SocketDirWatcher, SocketEvent};

/// Everything the loop reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// Periodic re-registration timer fired.
    Tick,
    /// Something happened to the kubelet socket.
    Socket(SocketEvent),
    /// A process signal arrived.
    Signal(HostSignal),
    /// The loop was cancelled from outside.
    Cancelled,
}

/// Drives a started [`PluginSupervisor`] until shutdown.
#[derive(Debug)]
pub struct HostEventLoop {
    supervisor: PluginSupervisor,
    plugin_dir: PathBuf,
    kubelet_socket: PathBuf,
    register_interval: Duration,
    cancel: CancellationToken,
}

impl HostEventLoop {
    /// Create a loop around an already started supervisor.
    #[must_use]
    pub fn new(supervisor: PluginSupervisor, settings: &PluginSettings) -> Self {
        Self {
            supervisor,
            plugin_dir: settings.plugin_dir.clone(),
            kubelet_socket: settings.kubelet_socket(),
            register_interval: settings.register_interval(),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that ends the loop like a terminating signal when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The supervised endpoints.
    #[must_use]
    pub fn supervisor(&self) -> &PluginSupervisor {
        &self.supervisor
    }

    /// Run until a terminating signal or cancellation, then stop all endpoints.
    ///
    /// The first timer tick fires immediately, so registration is attempted
    /// right away.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory watcher or the signal handlers
    /// cannot be set up. Endpoints are stopped in that case too.
    pub async fn run(mut self) -> PluginResult<()> {
        let (mut watcher, mut signals) = match self.event_sources() {
            Ok(sources) => sources,
            Err(e) => {
                self.supervisor.stop_all().await;
                return Err(e);
            },
        };

        let mut ticker = tokio::time::interval(self.register_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let cancel = self.cancel.clone();
        let mut watching = true;

        info!(
            interval = ?self.register_interval,
            endpoints = self.supervisor.len(),
            "host event loop running"
        );

        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => HostEvent::Cancelled,
                _ = ticker.tick() => HostEvent::Tick,
                ev = watcher.next(), if watching => match ev {
                    Some(ev) => HostEvent::Socket(ev),
                    None => {
                        warn!("directory watcher closed; relying on the timer alone");
                        watching = false;
                        continue;
                    },
                },
                sig = signals.recv() => HostEvent::Signal(sig),
            };

            if self.dispatch(event).await.is_break() {
                break;
            }
        }

        self.supervisor.stop_all().await;
        Ok(())
    }

    fn event_sources(&self) -> PluginResult<(SocketDirWatcher, SignalListener)> {
        let watcher = SocketDirWatcher::new(&self.plugin_dir, self.kubelet_socket.clone())?;
        let signals = SignalListener::new()?;
        Ok((watcher, signals))
    }

    /// React to one event. Returns `Break` when the loop should end.
    pub async fn dispatch(&mut self, event: HostEvent) -> ControlFlow<()> {
        match event {
            HostEvent::Tick => {
                self.register_pending().await;
            },
            HostEvent::Socket(SocketEvent::KubeletStarted) => {
                info!(socket = %self.kubelet_socket.display(), "kubelet socket created, re-registering");
                self.supervisor.mark_all_unregistered();
                self.register_pending().await;
            },
            HostEvent::Socket(SocketEvent::KubeletStopped) => {
                warn!(socket = %self.kubelet_socket.display(), "kubelet socket removed");
                self.supervisor.mark_all_unregistered();
            },
            HostEvent::Socket(SocketEvent::Error(e)) => {
                warn!(error = %e, "directory watcher error");
            },
            HostEvent::Signal(sig) if !sig.is_terminating() => {
                info!(signal = %sig, "received signal, re-registering");
                self.supervisor.mark_all_unregistered();
                self.register_pending().await;
            },
            HostEvent::Signal(sig) => {
                info!(signal = %sig, "received signal, shutting down");
                return ControlFlow::Break(());
            },
            HostEvent::Cancelled => {
                info!("event loop cancelled, shutting down");
                return ControlFlow::Break(());
            },
        }
        ControlFlow::Continue(())
    }

    async fn register_pending(&self) {
        // Each failure was already logged with its device.
        if let Err(e) = self.supervisor.register_pending().await {
            debug!(error = %e, "registration incomplete, will retry");
        }
    }
}

#[cfg(test)]
mod tests {
    use hostdev_config::parse_device_list;

    use super::*;

    fn event_loop(dir: &std::path::Path) -> HostEventLoop {
        let settings = PluginSettings::default().with_plugin_dir(dir);
        let devs = parse_device_list("/dev/mem:rw").unwrap();
        let sup = PluginSupervisor::build_all(&devs, &settings).unwrap();
        HostEventLoop::new(sup, &settings)
    }

    #[tokio::test]
    async fn test_dispatch_control_flow() {
        let tmp = tempfile::tempdir().unwrap();
        let mut el = event_loop(tmp.path());

        assert!(el.dispatch(HostEvent::Tick).await.is_continue());
        assert!(
            el.dispatch(HostEvent::Socket(SocketEvent::Error("boom".into())))
                .await
                .is_continue()
        );
        assert!(
            el.dispatch(HostEvent::Signal(HostSignal::Hangup))
                .await
                .is_continue()
        );
        assert!(
            el.dispatch(HostEvent::Signal(HostSignal::Terminate))
                .await
                .is_break()
        );
        assert!(el.dispatch(HostEvent::Cancelled).await.is_break());
    }

    #[tokio::test]
    async fn test_run_fails_without_plugin_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let el = event_loop(&tmp.path().join("missing"));
        assert!(el.run().await.is_err());
    }
}
