//! Config file loading.

use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

impl Config {
    /// Parse configuration from TOML text.
    ///
    /// `origin` only appears in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseError`] if the text is not valid TOML or
    /// does not match the schema, including invalid permission strings.
    pub fn from_toml_str(text: &str, origin: &str) -> ConfigResult<Self> {
        toml::from_str(text).map_err(|source| ConfigError::ParseError {
            path: origin.to_owned(),
            source,
        })
    }

    /// Load configuration from a TOML file.
    ///
    /// The result is not validated; call [`Config::validate`] afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let path_str = path.display().to_string();
        debug!(path = %path_str, "reading config file");
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path_str.clone(),
            source,
        })?;
        let config = Self::from_toml_str(&text, &path_str)?;
        info!(path = %path_str, devices = config.devices.len(), "loaded config file");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SAMPLE: &str = r#"
[[devices]]
name = "/dev/mem"
permissions = "rw"

[[devices]]
name = "/dev/cuse"
permissions = "rwm"

[plugin]
plugin_dir = "/tmp/plugins/"
register_interval_secs = 7

[log]
level = "debug"
"#;

    #[test]
    fn test_from_toml_str() {
        let config = Config::from_toml_str(SAMPLE, "<test>").unwrap();
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[1].permissions.as_str(), "rwm");
        assert_eq!(config.plugin.register_interval_secs, 7);
        // Unset fields keep their defaults.
        assert_eq!(config.plugin.health_interval_secs, 10);
        assert_eq!(config.plugin.resource_prefix, "hostdev.k8s.io/");
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "pretty");
    }

    #[test]
    fn test_bad_permissions_fail_to_parse() {
        let text = "[[devices]]\nname = \"/dev/mem\"\npermissions = \"rwx\"\n";
        let err = Config::from_toml_str(text, "<test>").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("<test>"));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.devices[0].name, "/dev/mem");
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/hostdev.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }
}
