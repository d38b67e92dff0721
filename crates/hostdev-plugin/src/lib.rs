#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![allow(clippy::module_name_repetitions)]

//! Hostdev Plugin - exposes host device nodes to the kubelet.
//!
//! One [`PluginEndpoint`] per device serves the `DevicePlugin` gRPC service
//! on its own unix socket. The [`PluginSupervisor`] starts, registers and
//! stops all of them; the [`HostEventLoop`] keeps registrations alive across
//! kubelet restarts and shuts everything down on a terminating signal.
//!
//! # Example
//!
//! ```rust,no_run
//! use hostdev_config::{PluginSettings, parse_device_list};
//! use hostdev_plugin::{HostEventLoop, PluginSupervisor};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = PluginSettings::default();
//! let devices = parse_device_list("/dev/mem:rw")?;
//!
//! let mut supervisor = PluginSupervisor::build_all(&devices, &settings)?;
//! supervisor.start_all().await?;
//!
//! HostEventLoop::new(supervisor, &settings).run().await?;
//! # Ok(())
//! # }
//! ```

/// gRPC client connections over unix sockets.
pub mod dial;
/// Per-device endpoint lifecycle.
pub mod endpoint;
/// Plugin error types.
pub mod error;
/// The timer, watcher and signal dispatch loop.
pub mod event_loop;
/// The `DevicePlugin` gRPC service.
pub mod service;
/// Process signal handling.
pub mod signals;
/// Fan-out over all endpoints.
pub mod supervisor;
/// Plugin directory watcher.
pub mod watcher;

pub use endpoint::PluginEndpoint;
pub use error::{DialError, PluginError, PluginResult};
pub use event_loop::{HostEvent, HostEventLoop};
pub use service::DevicePluginService;
pub use signals::{HostSignal, SignalListener};
pub use supervisor::PluginSupervisor;
pub use watcher::{SocketDirWatcher, SocketEvent};
