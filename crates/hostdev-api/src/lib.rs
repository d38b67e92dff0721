#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![allow(clippy::module_name_repetitions)]

//! Hostdev API - gRPC bindings for the kubelet device plugin protocol.
//!
//! The message and service types are generated from
//! `proto/deviceplugin.proto` at build time. This crate only adds the
//! protocol constants both sides of the protocol agree on.
//!
//! # Example
//!
//! ```rust
//! use hostdev_api::v1beta1::{Device, ListAndWatchResponse};
//! use hostdev_api::HEALTHY;
//!
//! let snapshot = ListAndWatchResponse {
//!     devices: vec![Device {
//!         id: "/dev/mem".to_string(),
//!         health: HEALTHY.to_string(),
//!         topology: None,
//!     }],
//! };
//! assert_eq!(snapshot.devices.len(), 1);
//! ```

/// Generated protocol types, clients and servers.
#[allow(missing_docs, unreachable_pub, clippy::all, clippy::pedantic)]
pub mod v1beta1 {
    tonic::include_proto!("v1beta1");
}

/// API version sent in every registration request.
pub const VERSION: &str = "v1beta1";

/// Directory in which the kubelet and all device plugins place their sockets.
pub const DEVICE_PLUGIN_PATH: &str = "/var/lib/kubelet/device-plugins/";

/// File name of the kubelet registration socket inside [`DEVICE_PLUGIN_PATH`].
pub const KUBELET_SOCKET_NAME: &str = "kubelet.sock";

/// Full path of the kubelet registration socket.
pub const KUBELET_SOCKET: &str = "/var/lib/kubelet/device-plugins/kubelet.sock";

/// Health value reported for a usable device.
pub const HEALTHY: &str = "Healthy";

/// Health value reported for an unusable device.
pub const UNHEALTHY: &str = "Unhealthy";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kubelet_socket_is_inside_plugin_dir() {
        assert_eq!(
            KUBELET_SOCKET,
            format!("{DEVICE_PLUGIN_PATH}{KUBELET_SOCKET_NAME}")
        );
    }

    #[test]
    fn test_default_options_need_no_pre_start() {
        let options = v1beta1::DevicePluginOptions::default();
        assert!(!options.pre_start_required);
        assert!(!options.get_preferred_allocation_available);
    }
}
