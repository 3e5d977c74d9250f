//! Configuration loading and CLI/file merging.
//!
//! The config file supplies defaults only; command-line flags always win.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timespec::parse_timespec;

/// Idle threshold applied when neither the CLI nor the config names one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(60_000);

/// On-disk configuration for xautolockd.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Idle threshold in the timespec grammar (e.g. "10m"); bare numbers
    /// are milliseconds.
    pub timeout: Option<String>,

    /// Stay in the foreground instead of detaching from the session.
    pub foreground: bool,

    /// Locker command and arguments.
    pub locker: Vec<String>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from the default path, or return defaults if not
    /// found.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            return Self::load(p);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let default_path = config_dir.join("xautolockd").join("config.toml");
            if default_path.exists() {
                return Self::load(&default_path);
            }
        }

        Ok(Self::default())
    }
}

/// Errors from merging CLI and file settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("no locker specified")]
    NoLocker,

    #[error(transparent)]
    InvalidTime(#[from] crate::timespec::TimeSpecError),
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub timeout: Duration,
    pub foreground: bool,
    pub locker: Vec<String>,
}

impl Settings {
    /// Merge CLI values over the config file over the built-in defaults.
    ///
    /// The locker command must come from somewhere; a config-file timeout is
    /// parsed with the same grammar as `-t`.
    pub fn resolve(
        cli_timeout: Option<Duration>,
        cli_foreground: bool,
        cli_locker: &[String],
        config: &Config,
    ) -> Result<Self, SettingsError> {
        let timeout = match (cli_timeout, config.timeout.as_deref()) {
            (Some(t), _) => t,
            (None, Some(spec)) => parse_timespec(spec)?,
            (None, None) => DEFAULT_TIMEOUT,
        };

        let locker = if cli_locker.is_empty() {
            config.locker.clone()
        } else {
            cli_locker.to_vec()
        };
        if locker.is_empty() {
            return Err(SettingsError::NoLocker);
        }

        Ok(Self {
            timeout,
            foreground: cli_foreground || config.foreground,
            locker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn locker(cmd: &[&str]) -> Vec<String> {
        cmd.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.timeout.is_none());
        assert!(!config.foreground);
        assert!(config.locker.is_empty());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            timeout = "10m"
            foreground = true
            locker = ["i3lock", "-n"]
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.timeout.as_deref(), Some("10m"));
        assert!(config.foreground);
        assert_eq!(config.locker, locker(&["i3lock", "-n"]));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout = \"30s\"").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.timeout.as_deref(), Some("30s"));
        assert!(config.locker.is_empty());
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout = [nonsense").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_resolve_defaults() {
        let settings =
            Settings::resolve(None, false, &locker(&["slock"]), &Config::default()).unwrap();
        assert_eq!(settings.timeout, DEFAULT_TIMEOUT);
        assert!(!settings.foreground);
        assert_eq!(settings.locker, locker(&["slock"]));
    }

    #[test]
    fn test_resolve_requires_a_locker() {
        match Settings::resolve(None, false, &[], &Config::default()) {
            Err(SettingsError::NoLocker) => {}
            other => panic!("expected NoLocker, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_overrides_config() {
        let config = Config {
            timeout: Some("10m".to_string()),
            foreground: false,
            locker: locker(&["xsecurelock"]),
        };

        let settings = Settings::resolve(
            Some(Duration::from_millis(5000)),
            true,
            &locker(&["i3lock", "-n"]),
            &config,
        )
        .unwrap();

        assert_eq!(settings.timeout, Duration::from_millis(5000));
        assert!(settings.foreground);
        assert_eq!(settings.locker, locker(&["i3lock", "-n"]));
    }

    #[test]
    fn test_config_fills_cli_gaps() {
        let config = Config {
            timeout: Some("2m".to_string()),
            foreground: true,
            locker: locker(&["xsecurelock"]),
        };

        let settings = Settings::resolve(None, false, &[], &config).unwrap();
        assert_eq!(settings.timeout, Duration::from_millis(120_000));
        assert!(settings.foreground);
        assert_eq!(settings.locker, locker(&["xsecurelock"]));
    }

    #[test]
    fn test_config_timeout_uses_timespec_grammar() {
        let config = Config {
            timeout: Some("banana".to_string()),
            ..Config::default()
        };
        assert!(Settings::resolve(None, false, &locker(&["slock"]), &config).is_err());
    }
}
