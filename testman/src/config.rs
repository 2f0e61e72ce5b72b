// File: testman/src/config.rs
//
// Harness configuration, read from TESTMAN_* environment variables and/or a
// YAML file named by TESTMAN_CONFIG. Environment variables win over the file.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Path of an optional YAML config file
pub const ENV_CONFIG: &str = "TESTMAN_CONFIG";
/// Run timeout in seconds, reported through `deadline()`
pub const ENV_TIMEOUT: &str = "TESTMAN_TIMEOUT";
/// Echo `=== RUN` / `--- PASS` lines and log output while running
pub const ENV_VERBOSE: &str = "TESTMAN_VERBOSE";
/// Parent directory for per-test temporary directories
pub const ENV_TEMP_ROOT: &str = "TESTMAN_TEMP_ROOT";
/// Directory where JSON run reports are written
pub const ENV_REPORT_DIR: &str = "TESTMAN_REPORT_DIR";

/// Settings of the built-in harness
///
/// # Example
///
/// ```rust
/// use testman::HarnessConfig;
///
/// let config = HarnessConfig::from_yaml_str("verbose: true\ntimeout_secs: 30\n").unwrap();
/// assert!(config.verbose);
/// assert_eq!(config.timeout().map(|t| t.as_secs()), Some(30));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Whole-run timeout in seconds
    pub timeout_secs: Option<u64>,
    /// Print progress lines while running
    pub verbose: bool,
    /// Where per-test temporary directories are created (system default if unset)
    pub temp_root: Option<PathBuf>,
    /// Where run reports are saved (not saved if unset)
    pub report_dir: Option<PathBuf>,
}

impl HarnessConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(ENV_CONFIG) {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Overlay values found through `lookup` (environment variable reader)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_TIMEOUT) {
            let secs = value
                .trim()
                .trim_end_matches('s')
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidEnv {
                    key: ENV_TIMEOUT,
                    value: value.clone(),
                })?;
            self.timeout_secs = (secs > 0).then_some(secs);
        }

        if let Some(value) = lookup(ENV_VERBOSE) {
            self.verbose = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "" | "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        key: ENV_VERBOSE,
                        value,
                    })
                }
            };
        }

        if let Some(value) = lookup(ENV_TEMP_ROOT).filter(|v| !v.is_empty()) {
            self.temp_root = Some(PathBuf::from(value));
        }

        if let Some(value) = lookup(ENV_REPORT_DIR).filter(|v| !v.is_empty()) {
            self.report_dir = Some(PathBuf::from(value));
        }

        Ok(())
    }

    /// Timeout as a duration
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.timeout(), None);
        assert!(!config.verbose);
        assert!(config.temp_root.is_none());
        assert!(config.report_dir.is_none());
    }

    #[test]
    fn test_env_overlay() {
        let mut config = HarnessConfig::from_yaml_str("timeout_secs: 10\nverbose: true\n").unwrap();

        config
            .apply_env(lookup(&[
                (ENV_TIMEOUT, "90s"),
                (ENV_VERBOSE, "off"),
                (ENV_REPORT_DIR, "/tmp/reports"),
            ]))
            .unwrap();

        assert_eq!(config.timeout_secs, Some(90));
        assert!(!config.verbose);
        assert_eq!(config.report_dir, Some(PathBuf::from("/tmp/reports")));
        assert!(config.temp_root.is_none());
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let mut config = HarnessConfig::default();
        config.apply_env(lookup(&[(ENV_TIMEOUT, "0")])).unwrap();
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_invalid_env_values() {
        let mut config = HarnessConfig::default();

        let err = config
            .apply_env(lookup(&[(ENV_VERBOSE, "maybe")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv { key: ENV_VERBOSE, .. }
        ));

        let err = config
            .apply_env(lookup(&[(ENV_TIMEOUT, "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("soon"));
    }

    #[test]
    fn test_unknown_yaml_field_rejected() {
        assert!(HarnessConfig::from_yaml_str("verbos: true\n").is_err());
    }

    #[test]
    fn test_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testman.yaml");
        std::fs::write(&path, "temp_root: /var/tmp\n").unwrap();

        let config = HarnessConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.temp_root, Some(PathBuf::from("/var/tmp")));

        let missing = HarnessConfig::from_yaml_file(dir.path().join("missing.yaml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
