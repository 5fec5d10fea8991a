use serde::Deserialize;
use std::time::Duration;
use url::Url;
use yali_core::error::CoreError;
use yali_core::settings::Settings;
use yali_core::types::Secret;

const MONGO_SCHEMES: [&str; 2] = ["mongodb", "mongodb+srv"];

/// Connection and repository settings of the document store, read from `DB_*` variables.
///
/// Either `DB_URL` or `DB_HOST` with `DB_PORT` must be given.
#[derive(Debug, Clone, Deserialize)]
pub struct DocDbSettings {
    #[serde(default)]
    pub db_url: Option<String>,
    #[serde(default)]
    pub db_host: Option<String>,
    #[serde(default)]
    pub db_port: Option<u16>,
    #[serde(rename = "db_user")]
    pub username: String,
    #[serde(rename = "db_passwd")]
    pub password: Secret,
    #[serde(rename = "db_pool_size", default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(rename = "db_cache_size", default = "default_cache_size")]
    pub cache_size: u64,
    #[serde(rename = "db_cache_ttl", default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(rename = "db_max_bulk_ops", default = "default_max_bulk_ops")]
    pub max_bulk_ops: usize,
    #[serde(skip)]
    docdb_url: String,
}

const fn default_pool_size() -> u32 {
    100
}

const fn default_cache_size() -> u64 {
    128
}

const fn default_cache_ttl() -> u64 {
    600
}

const fn default_max_bulk_ops() -> usize {
    100
}

impl DocDbSettings {
    /// The connection string derived during validation.
    #[must_use]
    pub fn docdb_url(&self) -> &str {
        &self.docdb_url
    }

    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Settings for DocDbSettings {
    fn validate(&mut self) -> Result<(), CoreError> {
        let url = self.db_url.as_deref().map(str::trim).filter(|url| !url.is_empty());
        self.docdb_url = match (url, self.db_host.as_deref().map(str::trim), self.db_port) {
            (Some(url), _, _) => {
                let parsed = Url::parse(url)
                    .map_err(|e| CoreError::validation(format!("Invalid DB_URL: {e}")))?;
                if !MONGO_SCHEMES.contains(&parsed.scheme()) {
                    return Err(CoreError::validation(format!(
                        "DB_URL must use one of {MONGO_SCHEMES:?}, got '{}'",
                        parsed.scheme()
                    )));
                }
                url.to_owned()
            },
            (None, Some(host), Some(port)) if !host.is_empty() && port > 0 => {
                format!("mongodb://{host}:{port}")
            },
            _ => {
                return Err(CoreError::validation(
                    "Either DB_URL or both DB_HOST and DB_PORT must be set",
                ));
            },
        };

        if self.username.trim().is_empty() {
            return Err(CoreError::validation("DB_USER must not be empty"));
        }
        if self.password.is_empty() {
            return Err(CoreError::validation("DB_PASSWD must not be empty"));
        }
        for (name, value) in [
            ("DB_POOL_SIZE", u64::from(self.pool_size)),
            ("DB_CACHE_SIZE", self.cache_size),
            ("DB_CACHE_TTL", self.cache_ttl_secs),
            ("DB_MAX_BULK_OPS", self.max_bulk_ops as u64),
        ] {
            if value == 0 {
                return Err(CoreError::validation(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}
