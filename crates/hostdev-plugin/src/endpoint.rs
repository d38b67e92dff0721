//! One device plugin endpoint: a gRPC server on a per-device unix socket.
//!
//! Lifecycle:
//!
//! ```text
//! new()  (pure)
//!   -> start()     bind socket, serve, probe our own socket
//!   -> register()  any number of times, flips `registered`
//!   -> stop()      cancel health streams, drain server, remove socket
//! ```
//!
//! `stop` is idempotent. An endpoint is not restartable once stopped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use hostdev_api::VERSION;
use hostdev_api::v1beta1::device_plugin_client::DevicePluginClient;
use hostdev_api::v1beta1::device_plugin_server::DevicePluginServer;
use hostdev_api::v1beta1::registration_client::RegistrationClient;
use hostdev_api::v1beta1::{Empty, RegisterRequest};
use hostdev_config::{DeviceDescriptor, PluginSettings};
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnixListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::{debug, info, warn};

use crate::dial::dial;
use crate::error::{DialError, PluginError, PluginResult};
use crate::service::{DevicePluginService, plugin_options};

type ServerTask = JoinHandle<Result<(), tonic::transport::Error>>;

/// Runtime state for one exposed device.
#[derive(Debug)]
pub struct PluginEndpoint {
    device: Arc<DeviceDescriptor>,
    socket_path: PathBuf,
    kubelet_socket: PathBuf,
    health_interval: Duration,
    dial_timeout: Duration,
    shutdown_grace: Duration,
    registered: AtomicBool,
    /// Fired once by `stop`; ends health streams and the server.
    stop_signal: CancellationToken,
    server: Option<ServerTask>,
}

impl PluginEndpoint {
    /// Create an endpoint for `device`. Performs no I/O.
    #[must_use]
    pub fn new(device: DeviceDescriptor, settings: &PluginSettings) -> Self {
        Self {
            socket_path: settings.socket_path(&device.normalized_name),
            kubelet_socket: settings.kubelet_socket(),
            health_interval: settings.health_interval(),
            dial_timeout: settings.dial_timeout(),
            shutdown_grace: settings.shutdown_grace(),
            device: Arc::new(device),
            registered: AtomicBool::new(false),
            stop_signal: CancellationToken::new(),
            server: None,
        }
    }

    /// The device this endpoint exposes.
    #[must_use]
    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    /// Path of the endpoint's listening socket.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Socket file name as sent to the kubelet, e.g. `dev_mem.sock`.
    #[must_use]
    pub fn endpoint_name(&self) -> String {
        self.socket_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Whether the last registration attempt succeeded.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Forget a previous registration so the next sweep announces us again.
    pub fn mark_unregistered(&self) {
        self.registered.store(false, Ordering::Release);
    }

    /// Whether the server is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.server.is_some()
    }

    /// Bind the socket, start serving and wait until the server answers.
    ///
    /// Calling `start` on a running endpoint is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Bind`] if the socket path is taken or its
    /// directory is missing, and [`PluginError::Startup`] if the server does
    /// not answer within the dial timeout or the endpoint was stopped before.
    pub async fn start(&mut self) -> PluginResult<()> {
        if self.server.is_some() {
            debug!(device = %self.device.device_name, "endpoint already running");
            return Ok(());
        }
        if self.stop_signal.is_cancelled() {
            return Err(self.startup_error("endpoint was stopped and cannot be restarted"));
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|source| PluginError::Bind {
            socket: self.socket_path.clone(),
            source,
        })?;

        let service = DevicePluginService::new(
            Arc::clone(&self.device),
            self.health_interval,
            self.stop_signal.clone(),
        );
        let stop = self.stop_signal.clone();
        self.server = Some(tokio::spawn(async move {
            Server::builder()
                .add_service(DevicePluginServer::new(service))
                .serve_with_incoming_shutdown(UnixListenerStream::new(listener), async move {
                    stop.cancelled().await;
                })
                .await
        }));

        if let Err(e) = self.probe().await {
            warn!(
                device = %self.device.device_name,
                socket = %self.socket_path.display(),
                error = %e,
                "endpoint did not come up"
            );
            self.stop().await?;
            return Err(self.startup_error(&format!("liveness probe failed: {e}")));
        }

        info!(
            device = %self.device.device_name,
            socket = %self.socket_path.display(),
            "device plugin serving"
        );
        Ok(())
    }

    /// Connect to our own socket and make one cheap call.
    async fn probe(&self) -> Result<(), DialError> {
        let channel = dial(&self.socket_path, self.dial_timeout).await?;
        let mut client = DevicePluginClient::new(channel);
        tokio::time::timeout(
            self.dial_timeout,
            client.get_device_plugin_options(Empty {}),
        )
        .await
        .map_err(|_| DialError::Timeout(self.dial_timeout))??;
        Ok(())
    }

    /// Announce this endpoint to the kubelet.
    ///
    /// Sets the registered flag on success and clears it on any failure.
    /// Does not skip when already registered; callers decide that.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Registration`] if the kubelet is unreachable or
    /// rejects the request.
    pub async fn register(&self) -> PluginResult<()> {
        match self.try_register().await {
            Ok(()) => {
                self.registered.store(true, Ordering::Release);
                info!(
                    device = %self.device.device_name,
                    resource = %self.device.resource_name,
                    endpoint = %self.endpoint_name(),
                    "registered with kubelet"
                );
                Ok(())
            },
            Err(e) => {
                self.registered.store(false, Ordering::Release);
                warn!(
                    device = %self.device.device_name,
                    kubelet = %self.kubelet_socket.display(),
                    error = %e,
                    "registration failed"
                );
                Err(PluginError::Registration {
                    device: self.device.device_name.clone(),
                    reason: e.to_string(),
                })
            },
        }
    }

    async fn try_register(&self) -> Result<(), DialError> {
        let channel = dial(&self.kubelet_socket, self.dial_timeout).await?;
        let mut client = RegistrationClient::new(channel);
        let request = RegisterRequest {
            version: VERSION.to_string(),
            endpoint: self.endpoint_name(),
            resource_name: self.device.resource_name.clone(),
            options: Some(plugin_options()),
        };
        tokio::time::timeout(self.dial_timeout, client.register(request))
            .await
            .map_err(|_| DialError::Timeout(self.dial_timeout))??;
        Ok(())
    }

    /// Stop serving, end all health streams and remove the socket.
    ///
    /// Second and later calls do nothing.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::SocketCleanup`] if the socket file exists but
    /// cannot be removed.
    pub async fn stop(&mut self) -> PluginResult<()> {
        let Some(mut server) = self.server.take() else {
            return Ok(());
        };

        self.stop_signal.cancel();
        self.registered.store(false, Ordering::Release);

        match tokio::time::timeout(self.shutdown_grace, &mut server).await {
            Ok(Ok(Ok(()))) => {},
            Ok(Ok(Err(e))) => warn!(device = %self.device.device_name, error = %e, "server exited with error"),
            Ok(Err(e)) => warn!(device = %self.device.device_name, error = %e, "server task failed"),
            Err(_) => {
                warn!(
                    device = %self.device.device_name,
                    grace = ?self.shutdown_grace,
                    "server did not drain in time, aborting"
                );
                server.abort();
            },
        }

        remove_socket(&self.socket_path)?;
        info!(device = %self.device.device_name, "device plugin stopped");
        Ok(())
    }

    fn startup_error(&self, reason: &str) -> PluginError {
        PluginError::Startup {
            device: self.device.device_name.clone(),
            reason: reason.to_string(),
        }
    }
}

impl Drop for PluginEndpoint {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            self.stop_signal.cancel();
            server.abort();
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

fn remove_socket(path: &Path) -> PluginResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PluginError::SocketCleanup {
            socket: path.to_path_buf(),
            source,
        }),
    }
}
