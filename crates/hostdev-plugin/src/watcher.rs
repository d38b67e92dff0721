//! Watches the plugin directory for the kubelet socket coming and going.
//!
//! The kubelet recreates its registration socket on every start and forgets
//! all registrations when it does, so a create event is our cue to
//! re-register immediately instead of waiting for the next timer tick.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::info;

use crate::error::PluginResult;

/// What the watcher reports to the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The kubelet socket was created: the kubelet (re)started.
    KubeletStarted,
    /// The kubelet socket was removed: the kubelet went away.
    KubeletStopped,
    /// The underlying watcher reported an error. Not fatal.
    Error(String),
}

/// Filesystem watcher on the plugin socket directory.
pub struct SocketDirWatcher {
    kubelet_socket: PathBuf,
    /// Dropping the `notify` handle stops watching.
    _watcher: RecommendedWatcher,
    raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl std::fmt::Debug for SocketDirWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketDirWatcher")
            .field("kubelet_socket", &self.kubelet_socket)
            .finish_non_exhaustive()
    }
}

impl SocketDirWatcher {
    /// Start watching `dir` (non-recursively) for `kubelet_socket`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PluginError::Watch`] if the watcher cannot be created
    /// or `dir` cannot be watched.
    pub fn new(dir: &Path, kubelet_socket: PathBuf) -> PluginResult<Self> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = raw_tx.send(res);
            },
            notify::Config::default(),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        info!(dir = %dir.display(), kubelet = %kubelet_socket.display(), "watching plugin directory");

        Ok(Self {
            kubelet_socket,
            _watcher: watcher,
            raw_rx,
        })
    }

    /// Wait for the next relevant event.
    ///
    /// Returns `None` once the watcher has shut down. Cancel safe.
    pub async fn next(&mut self) -> Option<SocketEvent> {
        loop {
            match self.raw_rx.recv().await? {
                Ok(event) => {
                    if let Some(ev) = classify(&event, &self.kubelet_socket) {
                        return Some(ev);
                    }
                },
                Err(e) => return Some(SocketEvent::Error(e.to_string())),
            }
        }
    }
}

/// Map a raw `notify` event to a [`SocketEvent`] if it concerns the kubelet socket.
fn classify(event: &Event, kubelet_socket: &Path) -> Option<SocketEvent> {
    let ours = event.paths.iter().any(|p| p == kubelet_socket);
    if !ours {
        return None;
    }
    match event.kind {
        EventKind::Create(_) => Some(SocketEvent::KubeletStarted),
        EventKind::Remove(_) => Some(SocketEvent::KubeletStopped),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    use super::*;

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_classify() {
        let sock = Path::new("/plugins/kubelet.sock");
        assert_eq!(
            classify(&event(EventKind::Create(CreateKind::File), "/plugins/kubelet.sock"), sock),
            Some(SocketEvent::KubeletStarted)
        );
        assert_eq!(
            classify(&event(EventKind::Remove(RemoveKind::Any), "/plugins/kubelet.sock"), sock),
            Some(SocketEvent::KubeletStopped)
        );
        assert_eq!(
            classify(&event(EventKind::Create(CreateKind::File), "/plugins/dev_mem.sock"), sock),
            None
        );
        assert_eq!(
            classify(&event(EventKind::Modify(ModifyKind::Any), "/plugins/kubelet.sock"), sock),
            None
        );
    }

    #[tokio::test]
    async fn test_reports_socket_creation() {
        let tmp = tempfile::tempdir().unwrap();
        let sock = tmp.path().join("kubelet.sock");
        let mut watcher = SocketDirWatcher::new(tmp.path(), sock.clone()).unwrap();

        // Unrelated files are ignored.
        std::fs::write(tmp.path().join("other"), b"x").unwrap();
        let _listener = std::os::unix::net::UnixListener::bind(&sock).unwrap();

        let ev = tokio::time::timeout(Duration::from_secs(5), watcher.next())
            .await
            .unwrap();
        assert_eq!(ev, Some(SocketEvent::KubeletStarted));
    }

    #[test]
    fn test_missing_dir_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing");
        assert!(SocketDirWatcher::new(&missing, missing.join("kubelet.sock")).is_err());
    }
}
