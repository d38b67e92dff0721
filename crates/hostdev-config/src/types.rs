//! Configuration struct definitions.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::DeviceConfig;

/// Default directory shared by the kubelet and device plugin sockets.
pub const DEFAULT_PLUGIN_DIR: &str = "/var/lib/kubelet/device-plugins/";

/// Default kubelet socket file name inside the plugin directory.
pub const DEFAULT_KUBELET_SOCKET_NAME: &str = "kubelet.sock";

/// Default namespace prefix of advertised resource names.
pub const DEFAULT_RESOURCE_PREFIX: &str = "hostdev.k8s.io/";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Devices to expose, in order.
    pub devices: Vec<DeviceConfig>,
    /// Plugin runtime settings.
    pub plugin: PluginSettings,
    /// Logging settings.
    pub log: LogSettings,
}

/// Runtime settings for the plugin endpoints and the host event loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    /// Directory holding the per-device sockets and the kubelet socket.
    pub plugin_dir: PathBuf,
    /// Kubelet registration socket. Defaults to `<plugin_dir>/kubelet.sock`.
    pub kubelet_socket: Option<PathBuf>,
    /// Prefix prepended to normalized device names.
    pub resource_prefix: String,
    /// Suffix appended to the per-device socket file name.
    pub socket_suffix: String,
    /// Seconds between re-registration sweeps.
    pub register_interval_secs: u64,
    /// Seconds between health snapshots on an open `ListAndWatch` stream.
    pub health_interval_secs: u64,
    /// Timeout for dialing the kubelet or probing our own socket.
    pub dial_timeout_secs: u64,
    /// How long `stop` waits for the gRPC server to drain.
    pub shutdown_grace_secs: u64,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            plugin_dir: PathBuf::from(DEFAULT_PLUGIN_DIR),
            kubelet_socket: None,
            resource_prefix: DEFAULT_RESOURCE_PREFIX.to_string(),
            socket_suffix: ".sock".to_string(),
            register_interval_secs: 5,
            health_interval_secs: 10,
            dial_timeout_secs: 5,
            shutdown_grace_secs: 5,
        }
    }
}

impl PluginSettings {
    /// Settings rooted at a different plugin directory, e.g. a temp dir.
    #[must_use]
    pub fn with_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = dir.into();
        self
    }

    /// The kubelet registration socket path.
    #[must_use]
    pub fn kubelet_socket(&self) -> PathBuf {
        self.kubelet_socket
            .clone()
            .unwrap_or_else(|| self.plugin_dir.join(DEFAULT_KUBELET_SOCKET_NAME))
    }

    /// Socket path for a device with the given normalized name.
    #[must_use]
    pub fn socket_path(&self, normalized_name: &str) -> PathBuf {
        self.plugin_dir
            .join(format!("{normalized_name}{}", self.socket_suffix))
    }

    /// Interval between re-registration sweeps.
    #[must_use]
    pub fn register_interval(&self) -> Duration {
        Duration::from_secs(self.register_interval_secs)
    }

    /// Interval between health snapshots.
    #[must_use]
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    /// Dial and probe timeout.
    #[must_use]
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    /// Shutdown grace period.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Logging settings as found in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Level filter, e.g. `info` or `hostdev_plugin=debug`.
    pub level: String,
    /// One of `pretty`, `compact`, `json`, `full`.
    pub format: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
