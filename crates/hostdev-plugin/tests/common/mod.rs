//! Shared test fixtures: an in-process fake kubelet and settings helpers.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hostdev_api::v1beta1::registration_server::{Registration, RegistrationServer};
use hostdev_api::v1beta1::{Empty, RegisterRequest};
use hostdev_config::{PluginSettings, parse_device_list};
use hostdev_plugin::PluginSupervisor;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnixListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

#[derive(Clone, Default)]
struct Recorder {
    requests: Arc<Mutex<Vec<RegisterRequest>>>,
    reject: Arc<AtomicBool>,
}

#[tonic::async_trait]
impl Registration for Recorder {
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<Empty>, Status> {
        self.requests.lock().unwrap().push(request.into_inner());
        if self.reject.load(Ordering::SeqCst) {
            return Err(Status::invalid_argument("registration rejected"));
        }
        Ok(Response::new(Empty {}))
    }
}

/// A kubelet registration server listening on a unix socket.
pub struct FakeKubelet {
    recorder: Recorder,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
    path: PathBuf,
}

impl FakeKubelet {
    /// Bind at `path` and start serving.
    pub fn start(path: &Path) -> Self {
        let listener = UnixListener::bind(path).unwrap();
        let recorder = Recorder::default();
        let shutdown = CancellationToken::new();

        let svc = RegistrationServer::new(recorder.clone());
        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            Server::builder()
                .add_service(svc)
                .serve_with_incoming_shutdown(UnixListenerStream::new(listener), async move {
                    token.cancelled().await;
                })
                .await
                .unwrap();
        });

        Self {
            recorder,
            shutdown,
            handle,
            path: path.to_path_buf(),
        }
    }

    /// Number of registration requests received so far.
    pub fn count(&self) -> usize {
        self.recorder.requests.lock().unwrap().len()
    }

    /// All registration requests received so far.
    pub fn requests(&self) -> Vec<RegisterRequest> {
        self.recorder.requests.lock().unwrap().clone()
    }

    /// Make subsequent registrations fail with `InvalidArgument`.
    pub fn set_reject(&self, reject: bool) {
        self.recorder.reject.store(reject, Ordering::SeqCst);
    }

    /// Stop serving and remove the socket.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Plugin settings rooted at `dir` with short timeouts.
pub fn settings(dir: &Path) -> PluginSettings {
    PluginSettings {
        dial_timeout_secs: 2,
        shutdown_grace_secs: 2,
        ..PluginSettings::default().with_plugin_dir(dir)
    }
}

/// A supervisor for `devs` (e.g. `/dev/mem:rw`) under `dir`.
pub fn supervisor(devs: &str, settings: &PluginSettings) -> PluginSupervisor {
    PluginSupervisor::build_all(&parse_device_list(devs).unwrap(), settings).unwrap()
}

/// Poll `cond` every 20ms until it holds or `timeout` passes.
pub async fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    #[allow(clippy::arithmetic_side_effects)]
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}
