use std::path::PathBuf;
use std::time::Duration;

use hostdev_config::ConfigError;
use thiserror::Error;

/// Errors raised by plugin endpoints, the supervisor and the host event loop.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Invalid device configuration. Fatal before any endpoint starts.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The endpoint socket could not be bound.
    #[error("failed to bind {socket}: {source}")]
    Bind {
        /// Socket path.
        socket: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The endpoint server did not come up.
    #[error("failed to start plugin for {device}: {reason}")]
    Startup {
        /// Device name.
        device: String,
        /// What went wrong.
        reason: String,
    },

    /// Registration with the kubelet failed. Retried on the next trigger.
    #[error("failed to register {device} with the kubelet: {reason}")]
    Registration {
        /// Device name.
        device: String,
        /// What went wrong.
        reason: String,
    },

    /// Removing an endpoint socket failed.
    #[error("failed to remove socket {socket}: {source}")]
    SocketCleanup {
        /// Socket path.
        socket: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The plugin directory watcher could not be set up.
    #[error("filesystem watcher: {0}")]
    Watch(#[from] notify::Error),

    /// A signal handler could not be installed.
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Errors from dialing a gRPC peer over a unix socket.
#[derive(Debug, Error)]
pub enum DialError {
    /// No connection within the deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Connection or handshake failure.
    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),

    /// The peer answered with an error status.
    #[error("{}: {}", .0.code(), .0.message())]
    Status(#[from] tonic::Status),
}
