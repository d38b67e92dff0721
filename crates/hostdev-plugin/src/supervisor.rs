//! Owns every endpoint and fans lifecycle operations out to them.
//!
//! Startup is all-or-nothing: if one endpoint fails to start, the ones
//! already started are stopped again before the error is returned.
//! Registration is best-effort: every pending endpoint is attempted and a
//! failure on one does not hold back the others.

use std::os::unix::fs::FileTypeExt;

use hostdev_config::{DeviceConfig, PluginSettings, build_descriptors};
use tracing::{debug, info, warn};

use crate::endpoint::PluginEndpoint;
use crate::error::{PluginError, PluginResult};

/// The set of endpoints, one per configured device, in configuration order.
#[derive(Debug)]
pub struct PluginSupervisor {
    endpoints: Vec<PluginEndpoint>,
}

impl PluginSupervisor {
    /// Build one endpoint per device.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Config`] if a device name cannot be normalized
    /// or two devices map to the same identifiers.
    pub fn build_all(devices: &[DeviceConfig], settings: &PluginSettings) -> PluginResult<Self> {
        let endpoints = build_descriptors(devices, &settings.resource_prefix)?
            .into_iter()
            .map(|desc| PluginEndpoint::new(desc, settings))
            .collect();
        Ok(Self { endpoints })
    }

    /// The endpoints, in configuration order.
    #[must_use]
    pub fn endpoints(&self) -> &[PluginEndpoint] {
        &self.endpoints
    }

    /// Number of endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether there are no endpoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Number of endpoints currently registered with the kubelet.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.endpoints.iter().filter(|e| e.is_registered()).count()
    }

    /// Remove leftover sockets at our endpoint paths, e.g. after a crash.
    ///
    /// Only unix sockets are removed; anything else at the path is left alone
    /// and will make `start_all` fail.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::SocketCleanup`] if a stale socket cannot be removed.
    pub fn remove_stale_sockets(&self) -> PluginResult<()> {
        for ep in &self.endpoints {
            let path = ep.socket_path();
            let Ok(meta) = std::fs::symlink_metadata(path) else {
                continue;
            };
            if meta.file_type().is_socket() {
                std::fs::remove_file(path).map_err(|source| PluginError::SocketCleanup {
                    socket: path.to_path_buf(),
                    source,
                })?;
                info!(socket = %path.display(), "removed stale socket");
            }
        }
        Ok(())
    }

    /// Start every endpoint in order.
    ///
    /// # Errors
    ///
    /// Returns the first start failure after stopping the endpoints that had
    /// already started.
    pub async fn start_all(&mut self) -> PluginResult<()> {
        for idx in 0..self.endpoints.len() {
            if let Err(e) = self.endpoints[idx].start().await {
                warn!(
                    device = %self.endpoints[idx].device().device_name,
                    error = %e,
                    "startup failed, rolling back"
                );
                for started in &mut self.endpoints[..idx] {
                    if let Err(stop_err) = started.stop().await {
                        warn!(
                            device = %started.device().device_name,
                            error = %stop_err,
                            "rollback stop failed"
                        );
                    }
                }
                return Err(e);
            }
        }
        info!(endpoints = self.endpoints.len(), "all device plugins started");
        Ok(())
    }

    /// Register every endpoint that is not registered yet.
    ///
    /// Already registered endpoints are skipped, so a second call right after
    /// a fully successful one performs no handshakes.
    ///
    /// # Errors
    ///
    /// Returns the last registration error after all pending endpoints were
    /// attempted.
    pub async fn register_pending(&self) -> PluginResult<()> {
        let mut last_err = None;
        let mut attempted = 0_usize;

        for ep in self.endpoints.iter().filter(|e| !e.is_registered()) {
            attempted = attempted.saturating_add(1);
            if let Err(e) = ep.register().await {
                last_err = Some(e);
            }
        }

        if attempted > 0 {
            debug!(
                attempted,
                registered = self.registered_count(),
                total = self.endpoints.len(),
                "registration sweep finished"
            );
        }

        last_err.map_or(Ok(()), Err)
    }

    /// Clear every registered flag so the next sweep announces all endpoints.
    pub fn mark_all_unregistered(&self) {
        for ep in &self.endpoints {
            ep.mark_unregistered();
        }
    }

    /// Stop every endpoint, continuing past failures.
    pub async fn stop_all(&mut self) {
        for ep in &mut self.endpoints {
            if let Err(e) = ep.stop().await {
                warn!(device = %ep.device().device_name, error = %e, "failed to stop endpoint");
            }
        }
        info!("all device plugins stopped");
    }
}
