//! Post-load configuration validation.
//!
//! Device-file checks touch the filesystem and live in
//! [`Config::check_device_files`] so that they can be skipped in tests.

use std::path::Path;

use crate::device::{DeviceDescriptor, build_descriptors, check_device_file};
use crate::error::{ConfigError, ConfigResult};
use crate::types::{Config, PluginSettings};

impl Config {
    /// Validate the device list and plugin settings.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.devices.is_empty() {
            return Err(ConfigError::NoDevices);
        }
        validate_plugin(&self.plugin)?;
        build_descriptors(&self.devices, &self.plugin.resource_prefix)?;
        Ok(())
    }

    /// Check that every configured path is a character or block device.
    ///
    /// # Errors
    ///
    /// Returns the error for the first device that fails the check.
    pub fn check_device_files(&self) -> ConfigResult<()> {
        for dev in &self.devices {
            check_device_file(Path::new(&dev.name))?;
        }
        Ok(())
    }

    /// Derive descriptors for all configured devices, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if a name cannot be normalized or collides.
    pub fn descriptors(&self) -> ConfigResult<Vec<DeviceDescriptor>> {
        build_descriptors(&self.devices, &self.plugin.resource_prefix)
    }
}

fn positive(field: &str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::ValidationError {
            field: field.to_owned(),
            message: "must be greater than zero".to_owned(),
        });
    }
    Ok(())
}

fn validate_plugin(p: &PluginSettings) -> ConfigResult<()> {
    positive("plugin.register_interval_secs", p.register_interval_secs)?;
    positive("plugin.health_interval_secs", p.health_interval_secs)?;
    positive("plugin.dial_timeout_secs", p.dial_timeout_secs)?;
    positive("plugin.shutdown_grace_secs", p.shutdown_grace_secs)?;

    if p.resource_prefix.is_empty() || !p.resource_prefix.ends_with('/') {
        return Err(ConfigError::ValidationError {
            field: "plugin.resource_prefix".to_owned(),
            message: format!(
                "'{}' must be a non-empty domain ending in '/'",
                p.resource_prefix
            ),
        });
    }

    if p.socket_suffix.contains('/') {
        return Err(ConfigError::ValidationError {
            field: "plugin.socket_suffix".to_owned(),
            message: "must not contain '/'".to_owned(),
        });
    }

    if p.plugin_dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "plugin.plugin_dir".to_owned(),
            message: "must not be empty".to_owned(),
        });
    }

    Ok(())
}
