//! Device entries: parsing, permission checks and derived identifiers.
//!
//! A device is configured as `<path>:<permissions>`, e.g. `/dev/mem:rwm`.
//! From the path we derive a normalized name (`dev_mem`) that is used both
//! for the plugin socket file and the advertised resource name.

use std::collections::HashSet;
use std::fmt;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Letters allowed in a cgroup device permission string.
const PERMISSION_ALPHABET: &str = "rwm";

/// A validated cgroup device permission string.
///
/// Holds 1 to 3 distinct letters out of `r`, `w` and `m`, in the order they
/// were given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permissions(String);

impl Permissions {
    /// The permission string as configured.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Permissions {
    type Err = ConfigError;

    fn from_str(value: &str) -> ConfigResult<Self> {
        let invalid = |reason: String| ConfigError::InvalidPermissions {
            value: value.to_string(),
            reason,
        };

        let len = value.chars().count();
        if len == 0 || len > PERMISSION_ALPHABET.len() {
            return Err(invalid("length must be 1, 2 or 3".to_string()));
        }

        let mut seen = HashSet::new();
        for c in value.chars() {
            if !PERMISSION_ALPHABET.contains(c) {
                return Err(invalid("must be a subset of rwm".to_string()));
            }
            if !seen.insert(c) {
                return Err(invalid(format!("duplicate '{c}'")));
            }
        }

        Ok(Self(value.to_string()))
    }
}

impl TryFrom<String> for Permissions {
    type Error = ConfigError;

    fn try_from(value: String) -> ConfigResult<Self> {
        value.parse()
    }
}

impl From<Permissions> for String {
    fn from(p: Permissions) -> Self {
        p.0
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turn an absolute device path into a flat identifier.
///
/// The leading `/` is dropped and every remaining `/` becomes `_`:
/// `/dev/xx/yy` yields `dev_xx_yy`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidDeviceName`] if the name does not start
/// with `/` or has nothing after it.
pub fn normalize_device_name(name: &str) -> ConfigResult<String> {
    let Some(rest) = name.strip_prefix('/') else {
        return Err(ConfigError::InvalidDeviceName {
            name: name.to_string(),
            reason: "must start with '/'".to_string(),
        });
    };
    if rest.is_empty() {
        return Err(ConfigError::InvalidDeviceName {
            name: name.to_string(),
            reason: "must name a file below '/'".to_string(),
        });
    }
    Ok(rest.replace('/', "_"))
}

/// One configured device, before any identifiers are derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Absolute path of the device node on the host.
    pub name: String,
    /// Permissions granted to containers.
    pub permissions: Permissions,
}

impl DeviceConfig {
    /// Parse a single `<path>:<permissions>` entry.
    ///
    /// This only checks syntax; see [`check_device_file`] for the on-disk check.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry has no or several `:` separators, or if
    /// the permission string is invalid.
    pub fn parse(entry: &str) -> ConfigResult<Self> {
        let mut parts = entry.split(':');
        let (Some(name), Some(perms), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ConfigError::MalformedEntry {
                entry: entry.to_string(),
            });
        };
        if name.is_empty() {
            return Err(ConfigError::MalformedEntry {
                entry: entry.to_string(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            permissions: perms.parse()?,
        })
    }
}

/// Parse a comma separated device list such as `/dev/mem:rw,/dev/cuse:rwm`.
///
/// # Errors
///
/// Returns [`ConfigError::NoDevices`] for an empty list, or the first entry
/// error encountered.
pub fn parse_device_list(list: &str) -> ConfigResult<Vec<DeviceConfig>> {
    if list.trim().is_empty() {
        return Err(ConfigError::NoDevices);
    }
    list.split(',').map(|e| DeviceConfig::parse(e.trim())).collect()
}

/// Check that `path` exists and is a character or block special file.
///
/// # Errors
///
/// Returns [`ConfigError::DeviceStat`] if the path cannot be stat'ed and
/// [`ConfigError::NotADevice`] for regular files, directories and the like.
pub fn check_device_file(path: &Path) -> ConfigResult<()> {
    let meta = std::fs::metadata(path).map_err(|source| ConfigError::DeviceStat {
        path: path.to_path_buf(),
        source,
    })?;
    let ft = meta.file_type();
    if ft.is_char_device() || ft.is_block_device() {
        Ok(())
    } else {
        Err(ConfigError::NotADevice {
            path: path.to_path_buf(),
        })
    }
}

/// Validated identity of one exposed device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Absolute host path, e.g. `/dev/mem`.
    pub device_name: String,
    /// Permissions handed out with every allocation.
    pub permissions: Permissions,
    /// Flattened device name, e.g. `dev_mem`.
    pub normalized_name: String,
    /// Resource name advertised to the kubelet, e.g. `hostdev.k8s.io/dev_mem`.
    pub resource_name: String,
}

impl DeviceDescriptor {
    /// Derive identifiers for a configured device.
    ///
    /// # Errors
    ///
    /// Returns an error if the device name cannot be normalized.
    pub fn new(config: &DeviceConfig, resource_prefix: &str) -> ConfigResult<Self> {
        let normalized_name = normalize_device_name(&config.name)?;
        Ok(Self {
            device_name: config.name.clone(),
            permissions: config.permissions.clone(),
            resource_name: format!("{resource_prefix}{normalized_name}"),
            normalized_name,
        })
    }
}

/// Build descriptors for every configured device, preserving order.
///
/// # Errors
///
/// Fails on the first entry that cannot be normalized, or whose device name
/// or normalized name was already used by an earlier entry.
pub fn build_descriptors(
    configs: &[DeviceConfig],
    resource_prefix: &str,
) -> ConfigResult<Vec<DeviceDescriptor>> {
    let mut names = HashSet::new();
    let mut normalized = HashSet::new();
    let mut out = Vec::with_capacity(configs.len());

    for config in configs {
        let desc = DeviceDescriptor::new(config, resource_prefix)?;
        // `/dev/a_b` and `/dev/a/b` normalize to the same socket name.
        if !names.insert(desc.device_name.clone())
            || !normalized.insert(desc.normalized_name.clone())
        {
            return Err(ConfigError::DuplicateDevice {
                name: desc.device_name,
                normalized: desc.normalized_name,
            });
        }
        out.push(desc);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(name: &str, perms: &str) -> DeviceConfig {
        DeviceConfig {
            name: name.to_string(),
            permissions: perms.parse().unwrap(),
        }
    }

    #[test]
    fn test_permissions_accepted() {
        for ok in ["rwm", "rw", "r", "w", "m", "mwr", "wm"] {
            assert!(ok.parse::<Permissions>().is_ok(), "{ok} should be accepted");
        }
    }

    #[test]
    fn test_permissions_rejected() {
        for bad in ["", "rrw", "rwr", "rwx", "rwmr", "x", "RW", "r w"] {
            assert!(bad.parse::<Permissions>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_permissions_keep_given_order() {
        let p: Permissions = "mr".parse().unwrap();
        assert_eq!(p.as_str(), "mr");
        assert_eq!(p.to_string(), "mr");
    }

    #[test]
    fn test_normalize_device_name() {
        assert_eq!(normalize_device_name("/dev/mem").unwrap(), "dev_mem");
        assert_eq!(normalize_device_name("/dev/xx/yy").unwrap(), "dev_xx_yy");
        assert!(normalize_device_name("dev/mem").is_err());
        assert!(normalize_device_name("").is_err());
        assert!(normalize_device_name("/").is_err());
    }

    #[test]
    fn test_parse_entry() {
        let d = DeviceConfig::parse("/dev/mem:rwm").unwrap();
        assert_eq!(d, dev("/dev/mem", "rwm"));

        assert!(matches!(
            DeviceConfig::parse("/dev/mem"),
            Err(ConfigError::MalformedEntry { .. })
        ));
        assert!(matches!(
            DeviceConfig::parse("/dev/mem:rw:m"),
            Err(ConfigError::MalformedEntry { .. })
        ));
        assert!(matches!(
            DeviceConfig::parse(":rw"),
            Err(ConfigError::MalformedEntry { .. })
        ));
        assert!(matches!(
            DeviceConfig::parse("/dev/mem:rwx"),
            Err(ConfigError::InvalidPermissions { .. })
        ));
    }

    #[test]
    fn test_parse_device_list() {
        let devs = parse_device_list("/dev/mem:rw,/dev/cuse:rwm").unwrap();
        assert_eq!(devs, vec![dev("/dev/mem", "rw"), dev("/dev/cuse", "rwm")]);

        assert!(matches!(parse_device_list(""), Err(ConfigError::NoDevices)));
        assert!(parse_device_list("/dev/mem:rw,").is_err());
        assert!(parse_device_list("/dev/mem:rrw").is_err());
    }

    #[test]
    fn test_check_device_file() {
        // /dev/null is a character device on every unix we run on.
        assert!(check_device_file(Path::new("/dev/null")).is_ok());

        let tmp = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            check_device_file(tmp.path()),
            Err(ConfigError::NotADevice { .. })
        ));
        assert!(matches!(
            check_device_file(Path::new("/definitely/not/here")),
            Err(ConfigError::DeviceStat { .. })
        ));
    }

    #[test]
    fn test_descriptor_identifiers() {
        let d = DeviceDescriptor::new(&dev("/dev/mem", "rw"), "hostdev.k8s.io/").unwrap();
        assert_eq!(d.normalized_name, "dev_mem");
        assert_eq!(d.resource_name, "hostdev.k8s.io/dev_mem");
        assert_eq!(d.permissions.as_str(), "rw");
    }

    #[test]
    fn test_build_descriptors_one_per_entry() {
        let configs = [dev("/dev/mem", "rw"), dev("/dev/cuse", "rwm")];
        let descs = build_descriptors(&configs, "p/").unwrap();
        assert_eq!(descs.len(), 2);
        assert_eq!(descs[0].device_name, "/dev/mem");
        assert_eq!(descs[1].normalized_name, "dev_cuse");
    }

    #[test]
    fn test_build_descriptors_rejects_collisions() {
        let same = [dev("/dev/mem", "rw"), dev("/dev/mem", "r")];
        assert!(matches!(
            build_descriptors(&same, "p/"),
            Err(ConfigError::DuplicateDevice { .. })
        ));

        let clash = [dev("/dev/a/b", "rw"), dev("/dev/a_b", "r")];
        assert!(matches!(
            build_descriptors(&clash, "p/"),
            Err(ConfigError::DuplicateDevice { .. })
        ));
    }

    #[test]
    fn test_build_descriptors_rejects_relative_path() {
        assert!(matches!(
            build_descriptors(&[dev("dev/mem", "rw")], "p/"),
            Err(ConfigError::InvalidDeviceName { .. })
        ));
    }
}
