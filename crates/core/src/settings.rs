//! Layered settings loading.
//!
//! Settings structs are plain `serde` types implementing [`Settings`]. They are assembled by
//! [`SettingsLoader`] from an optional configuration file overlaid with environment variables,
//! then post-validated through [`Settings::validate`].
//!
//! Environment keys are matched lowercase, so a field named `log_level` is fed by `LOG_LEVEL`
//! (or `APP_LOG_LEVEL` when the loader has the `APP` prefix).
//!
//! ```rust
//! use yali_core::settings::{Settings, SettingsLoader};
//!
//! #[derive(Debug, serde::Deserialize)]
//! struct ServerSettings {
//!     #[serde(default = "default_port")]
//!     port: u16,
//! }
//!
//! fn default_port() -> u16 {
//!     8080
//! }
//!
//! impl Settings for ServerSettings {}
//!
//! let settings: ServerSettings = SettingsLoader::new()
//!     .vars([("PORT", "9090")])
//!     .load()
//!     .unwrap();
//! assert_eq!(settings.port, 9090);
//! ```

use crate::error::{CoreError, CoreErrorExt};
use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A settings struct that can be loaded from the environment.
pub trait Settings: DeserializeOwned + Sized {
    /// Post-initialization hook run after deserialization.
    ///
    /// Use it for cross-field checks and derived values.
    fn validate(&mut self) -> Result<(), CoreError> {
        Ok(())
    }

    /// Loads the settings from the process environment.
    fn from_env() -> Result<Self, CoreError> {
        SettingsLoader::new().load()
    }
}

/// A builder assembling the configuration sources of a [`Settings`] type.
#[must_use = "loaders do nothing unless you call .load()"]
#[derive(Debug, Default)]
pub struct SettingsLoader {
    file: Option<PathBuf>,
    prefix: Option<String>,
    vars: Option<HashMap<String, String>>,
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a required configuration file below the environment layer.
    ///
    /// The format is derived from the file extension (`toml`, `json`).
    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Only considers environment variables starting with `{prefix}_`.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Reads variables from `vars` instead of the process environment.
    pub fn vars<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// Builds the layered configuration, deserializes `T` and runs [`Settings::validate`].
    ///
    /// # Errors
    /// * [`CoreError::Config`] if a source is missing or a value does not fit `T`.
    /// * Whatever [`Settings::validate`] reports.
    pub fn load<T: Settings>(self) -> Result<T, CoreError> {
        let mut builder = Config::builder();

        if let Some(path) = &self.file {
            debug!(path = %path.display(), "Loading settings file");
            builder = builder.add_source(File::from(path.as_path()).required(true));
        }

        let env = self.prefix.as_deref().map_or_else(Environment::default, |prefix| {
            Environment::with_prefix(prefix).prefix_separator("_")
        });
        builder = builder.add_source(env.source(self.vars));

        let mut settings = builder
            .build()
            .context("Failed to build settings")?
            .try_deserialize::<T>()
            .context(std::any::type_name::<T>())?;

        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct PoolSettings {
        #[serde(default = "default_pool_size")]
        pool_size: u32,
        #[serde(default)]
        debug: bool,
        name: Option<String>,
    }

    const fn default_pool_size() -> u32 {
        25
    }

    impl Settings for PoolSettings {
        fn validate(&mut self) -> Result<(), CoreError> {
            if self.pool_size == 0 {
                return Err(CoreError::validation("pool_size must be positive"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_defaults_apply_without_variables() {
        let settings: PoolSettings =
            SettingsLoader::new().vars(Vec::<(String, String)>::new()).load().unwrap();
        assert_eq!(settings.pool_size, 25);
        assert!(!settings.debug);
        assert!(settings.name.is_none());
    }

    #[test]
    fn test_uppercase_variables_are_coerced() {
        let settings: PoolSettings = SettingsLoader::new()
            .vars([("POOL_SIZE", "7"), ("DEBUG", "true"), ("NAME", "pool")])
            .load()
            .unwrap();
        assert_eq!(settings.pool_size, 7);
        assert!(settings.debug);
        assert_eq!(settings.name.as_deref(), Some("pool"));
    }

    #[test]
    fn test_validate_hook_runs() {
        let err = SettingsLoader::new().vars([("POOL_SIZE", "0")]).load::<PoolSettings>();
        assert!(matches!(err, Err(CoreError::Validation { .. })));
    }

    #[test]
    fn test_prefix_filters_variables() {
        let settings: PoolSettings = SettingsLoader::new()
            .prefix("YALI")
            .vars([("YALI_POOL_SIZE", "3"), ("POOL_SIZE", "9")])
            .load()
            .unwrap();
        assert_eq!(settings.pool_size, 3);
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "pool_size = 11\nname = \"from-file\"").unwrap();

        let settings: PoolSettings =
            SettingsLoader::new().file(file.path()).vars([("POOL_SIZE", "12")]).load().unwrap();
        assert_eq!(settings.pool_size, 12);
        assert_eq!(settings.name.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_invalid_value_is_config_error() {
        let err = SettingsLoader::new().vars([("POOL_SIZE", "many")]).load::<PoolSettings>();
        assert!(matches!(err, Err(CoreError::Config { .. })));
    }
}
