#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Configuration for the hostdev device plugin.
//!
//! Devices are given as `<path>:<permissions>` pairs, either on the command
//! line (`--devs /dev/mem:rwm,/dev/cuse:r`) or in a TOML file:
//!
//! ```toml
//! [[devices]]
//! name = "/dev/mem"
//! permissions = "rw"
//!
//! [plugin]
//! register_interval_secs = 5
//! ```
//!
//! ```rust
//! use hostdev_config::{Config, parse_device_list};
//!
//! let config = Config {
//!     devices: parse_device_list("/dev/mem:rw").unwrap(),
//!     ..Config::default()
//! };
//! config.validate().unwrap();
//! let descriptors = config.descriptors().unwrap();
//! assert_eq!(descriptors[0].normalized_name, "dev_mem");
//! ```

/// Device entries and derived identifiers.
pub mod device;
/// Configuration error types.
pub mod error;
/// Configuration file loading.
pub mod loader;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use device::{
    DeviceConfig, DeviceDescriptor, Permissions, build_descriptors, check_device_file,
    normalize_device_name, parse_device_list,
};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
