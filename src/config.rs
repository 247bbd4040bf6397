//! Application configuration.
//!
//! Supports YAML file and environment variable overrides.

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "TALLY_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "TALLY";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "TALLY_LOG";

/// Default storage backend.
pub const DEFAULT_STORAGE_BACKEND: &str = "sqlite";
/// Default SQLite database path.
pub const DEFAULT_STORAGE_PATH: &str = "./data/tally.db";
/// Default per-pin generation attempts before giving up.
pub const DEFAULT_PIN_MAX_ATTEMPTS: u32 = 5;

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend (sqlite or memory).
    #[serde(rename = "type")]
    pub backend: String,
    /// Path to database file (sqlite only).
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: DEFAULT_STORAGE_BACKEND.to_string(),
            path: DEFAULT_STORAGE_PATH.to_string(),
        }
    }
}

/// Pin allocation configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    /// Generation attempts per pin before surfacing exhaustion.
    pub max_attempts: u32,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_PIN_MAX_ATTEMPTS,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Pin allocation configuration.
    pub pins: PinConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.storage.backend, "sqlite");
        assert_eq!(config.storage.path, "./data/tally.db");
        assert_eq!(config.pins.max_attempts, 5);
    }

    #[test]
    fn test_config_for_test() {
        let config = Config::for_test();
        assert_eq!(config.storage.backend, DEFAULT_STORAGE_BACKEND);
    }

    #[test]
    fn test_config_file_and_env_layering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.yaml");
        std::fs::write(
            &path,
            "storage:\n  type: memory\n  path: /var/lib/tally/ledger.db\npins:\n  max_attempts: 9\n",
        )
        .unwrap();

        // Env vars override file values; file values override defaults.
        std::env::set_var("TALLY__STORAGE__TYPE", "sqlite");
        std::env::set_var("TALLY__PINS__MAX_ATTEMPTS", "2");
        let config = Config::load(path.to_str());
        std::env::remove_var("TALLY__STORAGE__TYPE");
        std::env::remove_var("TALLY__PINS__MAX_ATTEMPTS");

        let config = config.unwrap();
        assert_eq!(config.storage.backend, "sqlite");
        assert_eq!(config.pins.max_attempts, 2);
        assert_eq!(config.storage.path, "/var/lib/tally/ledger.db");
    }
}
