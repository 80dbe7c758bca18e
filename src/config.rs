//! Configuration system for licforge.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `licforge.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `LICFORGE_DATA_DIR` - Directory holding the signing key and the registry
//! - `LICFORGE_KEY_FILE` - File name of the sealed signing key
//! - `LICFORGE_REGISTRY_FILE` - File name of the license registry
//! - `LICFORGE_SEAL_WITH_MACHINE` - Bind the sealed signing key to this machine
//! - `LICFORGE_KEY_PREFIX` - Prefix of generated license key strings
//! - `LICFORGE_LOGGING_ENABLED` - Install the tracing subscriber
//! - `LICFORGE_LOG_LEVEL` - Log level (trace, debug, info, warn, error)

use config::Config;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::errors::{LicenseError, LicenseResult};

/// Global configuration singleton.
static CONFIG: OnceLock<ForgeConfig> = OnceLock::new();

/// Directory name used under the platform data directory.
const APP_DIR_NAME: &str = "licforge";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// Where key material and the registry live
    pub storage: StorageConfig,
    /// License key string configuration
    pub license: LicenseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Local storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory. Empty means the platform data directory
    /// (`%APPDATA%\licforge`, `~/Library/Application Support/licforge`,
    /// `~/.local/share/licforge`).
    pub data_dir: String,
    /// File name of the sealed signing key
    pub key_file: String,
    /// File name of the license registry
    pub registry_file: String,
    /// Derive the key-sealing key from the machine fingerprint. The key file
    /// then stops opening if the fingerprint changes, so this is off by default.
    pub seal_with_machine: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            key_file: "signing_key.enc".to_string(),
            registry_file: "licenses.json".to_string(),
            seal_with_machine: false,
        }
    }
}

/// License key string configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Prefix of generated license keys (e.g., "LIC" -> "LIC.<payload>.<signature>")
    pub key_prefix: String,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            key_prefix: "LIC".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "info".to_string(),
        }
    }
}

fn config_err(e: config::ConfigError) -> LicenseError {
    LicenseError::ConfigError(e.to_string())
}

impl ForgeConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `licforge.toml` file (optional)
    /// 3. Environment variables
    ///
    /// Not cached and not validated; most callers want [`get_config`].
    pub fn load() -> LicenseResult<Self> {
        let builder = Config::builder()
            .set_default("storage.data_dir", "")
            .map_err(config_err)?
            .set_default("storage.key_file", "signing_key.enc")
            .map_err(config_err)?
            .set_default("storage.registry_file", "licenses.json")
            .map_err(config_err)?
            .set_default("storage.seal_with_machine", false)
            .map_err(config_err)?
            .set_default("license.key_prefix", "LIC")
            .map_err(config_err)?
            .set_default("logging.enabled", false)
            .map_err(config_err)?
            .set_default("logging.level", "info")
            .map_err(config_err)?
            .add_source(config::File::with_name("licforge").required(false))
            .set_override_option("storage.data_dir", env::var("LICFORGE_DATA_DIR").ok())
            .map_err(config_err)?
            .set_override_option("storage.key_file", env::var("LICFORGE_KEY_FILE").ok())
            .map_err(config_err)?
            .set_override_option(
                "storage.registry_file",
                env::var("LICFORGE_REGISTRY_FILE").ok(),
            )
            .map_err(config_err)?
            .set_override_option(
                "storage.seal_with_machine",
                env::var("LICFORGE_SEAL_WITH_MACHINE")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(config_err)?
            .set_override_option("license.key_prefix", env::var("LICFORGE_KEY_PREFIX").ok())
            .map_err(config_err)?
            .set_override_option(
                "logging.enabled",
                env::var("LICFORGE_LOGGING_ENABLED")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(config_err)?
            .set_override_option("logging.level", env::var("LICFORGE_LOG_LEVEL").ok())
            .map_err(config_err)?;

        let settings = builder
            .build()
            .map_err(|e| LicenseError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| LicenseError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Configuration rooted at an explicit data directory, everything else default.
    pub fn with_data_dir(dir: impl AsRef<Path>) -> Self {
        let mut config = Self::default();
        config.storage.data_dir = dir.as_ref().to_string_lossy().into_owned();
        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.storage.key_file.trim().is_empty() {
            return Err(LicenseError::ConfigError(
                "storage.key_file cannot be empty".to_string(),
            ));
        }
        if self.storage.registry_file.trim().is_empty() {
            return Err(LicenseError::ConfigError(
                "storage.registry_file cannot be empty".to_string(),
            ));
        }
        if self.storage.key_file == self.storage.registry_file {
            return Err(LicenseError::ConfigError(
                "storage.key_file and storage.registry_file must differ".to_string(),
            ));
        }

        let prefix = &self.license.key_prefix;
        if prefix.is_empty() {
            return Err(LicenseError::ConfigError(
                "license.key_prefix cannot be empty".to_string(),
            ));
        }
        if !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(LicenseError::ConfigError(format!(
                "license.key_prefix must be ASCII alphanumeric, got '{prefix}'"
            )));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }

    /// Resolve the data directory.
    pub fn data_dir(&self) -> LicenseResult<PathBuf> {
        if !self.storage.data_dir.trim().is_empty() {
            return Ok(PathBuf::from(&self.storage.data_dir));
        }
        dirs::data_dir()
            .map(|p| p.join(APP_DIR_NAME))
            .ok_or_else(|| {
                LicenseError::ConfigError("could not determine app data directory".to_string())
            })
    }

    /// Full path of the sealed signing key.
    pub fn key_path(&self) -> LicenseResult<PathBuf> {
        Ok(self.data_dir()?.join(&self.storage.key_file))
    }

    /// Full path of the license registry.
    pub fn registry_path(&self) -> LicenseResult<PathBuf> {
        Ok(self.data_dir()?.join(&self.storage.registry_file))
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> LicenseResult<&'static ForgeConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = ForgeConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is equivalent.
    Ok(CONFIG.get_or_init(|| config))
}

/// Initialize configuration explicitly.
///
/// Call this early in your application to catch configuration errors.
pub fn init_config() -> LicenseResult<&'static ForgeConfig> {
    get_config()
}
