//! Configuration parsing and management.
//!
//! The DSA reads a TOML file whose sections are all optional. Values can be
//! overridden from the environment after the file has been parsed.
//!
//! ```toml
//! [bind]
//! min_sleep_in_milliseconds = 1000
//! sleep_range_in_milliseconds = 1000
//!
//! [idm]
//! buffer_size = 10000000
//!
//! [log]
//! level = "info"
//! ```
//!
//! # Environment Overrides
//!
//! | Variable                  | Field                              |
//! |---------------------------|------------------------------------|
//! | `DSA_BIND_MIN_SLEEP_MS`   | `bind.min_sleep_in_milliseconds`   |
//! | `DSA_BIND_SLEEP_RANGE_MS` | `bind.sleep_range_in_milliseconds` |
//! | `DSA_IDM_BUFFER_SIZE`     | `idm.buffer_size`                  |
//! | `DSA_LOG_LEVEL`           | `log.level`                        |
//! | `DSA_LOG_FILE`            | `log.file`                         |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default lower bound of the failed-bind response delay.
pub const DEFAULT_BIND_MIN_SLEEP_MS: u64 = 1000;

/// Default width of the random failed-bind response window.
pub const DEFAULT_BIND_SLEEP_RANGE_MS: u64 = 1000;

/// Default per-connection ceiling on buffered, incomplete request bytes.
pub const DEFAULT_IDM_BUFFER_SIZE: usize = 10_000_000;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be serialized.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range or otherwise invalid.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Top-level DSA configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DsaConfig {
    /// Bind handshake settings.
    #[serde(default)]
    pub bind: BindConfig,

    /// IDM transport settings.
    #[serde(default)]
    pub idm: IdmConfig,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

impl DsaConfig {
    /// Loads configuration from a TOML file and validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string and validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid, contains unknown keys, or
    /// fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the fragment ceiling is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idm.buffer_size == 0 {
            return Err(ConfigError::Validation(
                "idm.buffer_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if an override cannot be parsed or the result fails
    /// validation.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(std::env::vars())
    }

    /// Applies overrides from an iterator of `(name, value)` pairs.
    ///
    /// Unknown names are ignored so that the full environment can be passed.
    ///
    /// # Errors
    ///
    /// Returns an error if a recognised value cannot be parsed or the result
    /// fails validation.
    pub fn apply_overrides_from<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let value = value.as_ref();
            match key.as_ref() {
                "DSA_BIND_MIN_SLEEP_MS" => {
                    self.bind.min_sleep_in_milliseconds = parse_number(key.as_ref(), value)?;
                },
                "DSA_BIND_SLEEP_RANGE_MS" => {
                    self.bind.sleep_range_in_milliseconds = parse_number(key.as_ref(), value)?;
                },
                "DSA_IDM_BUFFER_SIZE" => {
                    self.idm.buffer_size = parse_number(key.as_ref(), value)?;
                },
                "DSA_LOG_LEVEL" => value.clone_into(&mut self.log.level),
                "DSA_LOG_FILE" => self.log.file = Some(PathBuf::from(value)),
                _ => {},
            }
        }
        self.validate()
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Validation(format!("{key}: '{value}' is not a valid number")))
}

/// Bind handshake settings.
///
/// A failed bind is answered no sooner than `min_sleep_in_milliseconds`
/// plus a uniformly random share of `sleep_range_in_milliseconds` after
/// the bind request arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindConfig {
    /// Lower bound of the failed-bind response delay.
    #[serde(default = "default_bind_min_sleep")]
    pub min_sleep_in_milliseconds: u64,

    /// Width of the random window added on top of the lower bound.
    #[serde(default = "default_bind_sleep_range")]
    pub sleep_range_in_milliseconds: u64,
}

impl BindConfig {
    /// Lower bound of the failed-bind response delay.
    #[must_use]
    pub const fn min_sleep(&self) -> Duration {
        Duration::from_millis(self.min_sleep_in_milliseconds)
    }

    /// Width of the random failed-bind response window.
    #[must_use]
    pub const fn sleep_range(&self) -> Duration {
        Duration::from_millis(self.sleep_range_in_milliseconds)
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            min_sleep_in_milliseconds: DEFAULT_BIND_MIN_SLEEP_MS,
            sleep_range_in_milliseconds: DEFAULT_BIND_SLEEP_RANGE_MS,
        }
    }
}

const fn default_bind_min_sleep() -> u64 {
    DEFAULT_BIND_MIN_SLEEP_MS
}

const fn default_bind_sleep_range() -> u64 {
    DEFAULT_BIND_SLEEP_RANGE_MS
}

/// IDM transport settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdmConfig {
    /// Maximum bytes of an incomplete request a connection may buffer.
    #[serde(default = "default_idm_buffer_size")]
    pub buffer_size: usize,
}

impl Default for IdmConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_IDM_BUFFER_SIZE,
        }
    }
}

const fn default_idm_buffer_size() -> usize {
    DEFAULT_IDM_BUFFER_SIZE
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `dsa_daemon=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file; logs go to stdout when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
