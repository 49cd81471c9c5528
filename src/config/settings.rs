use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::store::retry::{RetryConfig, TomlRetryConfig};
use crate::util::paths::config_path;

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

/// Default replay depth when neither the config nor the caller sets one
pub const DEFAULT_DEPTH: u32 = 10;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Retry policy applied to every store call
    pub retry: RetryConfig,
    /// Defaults for replay requests
    pub defaults: MimicDefaults,
}

/// Request defaults a caller can override per invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MimicDefaults {
    pub depth: u32,
    pub shadow: bool,
    pub memoize: bool,
    pub skip_prelude: bool,
}

impl Default for MimicDefaults {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            shadow: false,
            memoize: false,
            skip_prelude: false,
        }
    }
}

/// TOML representation of the `[defaults]` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlDefaults {
    pub depth: Option<u32>,
    pub shadow: Option<bool>,
    pub memoize: Option<bool>,
    pub skip_prelude: Option<bool>,
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Retry configuration
    pub retry: Option<TomlRetryConfig>,
    /// Request defaults
    pub defaults: Option<TomlDefaults>,
}

impl Config {
    /// Load configuration from the data directory, merging with defaults
    pub fn load() -> Self {
        let config_file = config_path();

        // Create example config on first run
        if !config_file.exists() {
            Self::create_default_config(&config_file);
        }

        Self::load_from(&config_file)
    }

    /// Load configuration from a specific file.
    ///
    /// Missing or malformed files leave the defaults untouched.
    pub fn load_from(path: &Path) -> Self {
        let mut config = Config::default();

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => return config,
        };

        match toml::from_str::<TomlConfig>(&contents) {
            Ok(toml_config) => config.merge(toml_config),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Ignoring malformed config file"
                );
            }
        }

        config
    }

    fn merge(&mut self, toml_config: TomlConfig) {
        if let Some(retry) = toml_config.retry {
            self.retry.merge(&retry);
        }

        if let Some(defaults) = toml_config.defaults {
            if let Some(depth) = defaults.depth {
                self.defaults.depth = depth;
            }
            if let Some(shadow) = defaults.shadow {
                self.defaults.shadow = shadow;
            }
            if let Some(memoize) = defaults.memoize {
                self.defaults.memoize = memoize;
            }
            if let Some(skip_prelude) = defaults.skip_prelude {
                self.defaults.skip_prelude = skip_prelude;
            }
        }
    }

    /// Create the default config file from the bundled example
    fn create_default_config(path: &Path) {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    tracing::warn!(error = %e, "Failed to create config directory");
                    return;
                }
            }
        }

        if let Err(e) = fs::write(path, EXAMPLE_CONFIG) {
            tracing::warn!(error = %e, "Failed to write default config");
        }
    }
}
