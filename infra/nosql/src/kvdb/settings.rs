use serde::Deserialize;
use std::time::Duration;
use url::Url;
use yali_core::error::CoreError;
use yali_core::settings::Settings;
use yali_core::types::{NonEmptyStr, Secret};

/// Key prefix used when `KV_PREFIX` is not set.
pub const DEFAULT_KV_PREFIX: &str = "yali|";

/// Connection settings of the key-value store, read from `KV_*` variables.
#[derive(Debug, Clone, Deserialize)]
pub struct KvStoreSettings {
    #[serde(rename = "kv_store_host", default = "default_host")]
    pub host: String,
    #[serde(rename = "kv_store_port", default = "default_port")]
    pub port: u16,
    #[serde(rename = "kv_store_password", default)]
    pub password: Option<Secret>,
    #[serde(rename = "kv_prefix", default = "default_prefix")]
    pub key_prefix: NonEmptyStr,
    #[serde(rename = "kv_id", default)]
    pub db_id: u32,
    #[serde(rename = "kv_resp_protocol", default = "default_resp_protocol")]
    pub resp_protocol: u8,
    #[serde(rename = "kv_retry_base_sec", default = "default_retry_base_sec")]
    pub retry_base_sec: f64,
    #[serde(rename = "kv_retry_cap_sec", default = "default_retry_cap_sec")]
    pub retry_cap_sec: f64,
    #[serde(rename = "kv_max_retries", default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_host() -> String {
    String::from("localhost")
}

const fn default_port() -> u16 {
    6379
}

fn default_prefix() -> NonEmptyStr {
    NonEmptyStr::or_default(DEFAULT_KV_PREFIX, DEFAULT_KV_PREFIX)
}

const fn default_resp_protocol() -> u8 {
    2
}

const fn default_retry_base_sec() -> f64 {
    5.0
}

const fn default_retry_cap_sec() -> f64 {
    30.0
}

const fn default_max_retries() -> u32 {
    3
}

impl Default for KvStoreSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: None,
            key_prefix: default_prefix(),
            db_id: 0,
            resp_protocol: default_resp_protocol(),
            retry_base_sec: default_retry_base_sec(),
            retry_cap_sec: default_retry_cap_sec(),
            max_retries: default_max_retries(),
        }
    }
}

/// Delays applied between connectivity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { base: Duration::from_secs(5), cap: Duration::from_secs(30), max_retries: 3 }
    }
}

impl KvStoreSettings {
    /// The `redis://` URL for these settings.
    ///
    /// The password is percent-encoded and RESP3 is requested through the `protocol`
    /// query parameter.
    ///
    /// # Errors
    /// Returns [`CoreError::Validation`] when the host cannot form a valid URL.
    pub fn connection_url(&self) -> Result<Url, CoreError> {
        let mut url = Url::parse(&format!("redis://{}:{}/{}", self.host, self.port, self.db_id))
            .map_err(|e| CoreError::validation(format!("Invalid KV store address: {e}")))?;

        if let Some(password) = self.password.as_ref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password.expose()))
                .map_err(|()| CoreError::validation("KV store URL cannot carry a password"))?;
        }
        if self.resp_protocol == 3 {
            url.query_pairs_mut().append_pair("protocol", "resp3");
        }
        Ok(url)
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        let fallback = RetryPolicy::default();
        RetryPolicy {
            base: Duration::try_from_secs_f64(self.retry_base_sec).unwrap_or(fallback.base),
            cap: Duration::try_from_secs_f64(self.retry_cap_sec).unwrap_or(fallback.cap),
            max_retries: self.max_retries,
        }
    }
}

impl Settings for KvStoreSettings {
    fn validate(&mut self) -> Result<(), CoreError> {
        self.host = self.host.trim().to_owned();
        if self.host.is_empty() {
            return Err(CoreError::validation("KV_STORE_HOST must not be empty"));
        }
        if self.port == 0 {
            return Err(CoreError::validation("KV_STORE_PORT must be positive"));
        }
        if !matches!(self.resp_protocol, 2 | 3) {
            return Err(CoreError::validation(format!(
                "KV_RESP_PROTOCOL must be 2 or 3, got {}",
                self.resp_protocol
            )));
        }
        for (name, value) in
            [("KV_RETRY_BASE_SEC", self.retry_base_sec), ("KV_RETRY_CAP_SEC", self.retry_cap_sec)]
        {
            if !value.is_finite() || value <= 0.0 {
                return Err(CoreError::validation(format!("{name} must be a positive number")));
            }
        }
        if self.retry_cap_sec < self.retry_base_sec {
            return Err(CoreError::validation("KV_RETRY_CAP_SEC must not be below KV_RETRY_BASE_SEC"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yali_core::settings::SettingsLoader;

    fn load(vars: &[(&str, &str)]) -> Result<KvStoreSettings, CoreError> {
        SettingsLoader::new().vars(vars.iter().copied()).load()
    }

    #[test]
    fn test_defaults() {
        let settings = load(&[]).unwrap();
        assert_eq!(settings.host, "localhost");
        assert_eq!(settings.port, 6379);
        assert_eq!(settings.key_prefix.as_str(), DEFAULT_KV_PREFIX);
        assert_eq!(settings.connection_url().unwrap().as_str(), "redis://localhost:6379/0");
        assert_eq!(settings.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_connection_url_with_password_and_resp3() {
        let settings = load(&[
            ("KV_STORE_HOST", "cache.internal"),
            ("KV_STORE_PORT", "6380"),
            ("KV_STORE_PASSWORD", "p@ss word"),
            ("KV_ID", "2"),
            ("KV_RESP_PROTOCOL", "3"),
        ])
        .unwrap();

        let url = settings.connection_url().unwrap();
        assert_eq!(url.host_str(), Some("cache.internal"));
        assert_eq!(url.port(), Some(6380));
        assert_eq!(url.path(), "/2");
        assert_eq!(url.password(), Some("p%40ss%20word"));
        assert_eq!(url.query(), Some("protocol=resp3"));
        assert!(!format!("{settings:?}").contains("p@ss"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(load(&[("KV_RESP_PROTOCOL", "4")]).is_err());
        assert!(load(&[("KV_PREFIX", "")]).is_err());
        assert!(load(&[("KV_RETRY_BASE_SEC", "0")]).is_err());
        assert!(load(&[("KV_RETRY_BASE_SEC", "10"), ("KV_RETRY_CAP_SEC", "5")]).is_err());
    }
}
