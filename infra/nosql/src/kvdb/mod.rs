//! Prefixed key-value storage.
//!
//! [`KvStore`] encodes values, prefixes keys and checks the connection before each
//! command. The commands themselves run on a [`KvBackend`]: [`RedisBackend`] in production,
//! [`MemoryBackend`] in tests.

mod backend;
mod redis_backend;
mod settings;

pub use backend::{KvBackend, MemoryBackend, RawEntry};
pub use redis_backend::RedisBackend;
pub use settings::{DEFAULT_KV_PREFIX, KvStoreSettings, RetryPolicy};

use crate::error::{NosqlError, NosqlErrorExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{error, instrument, warn};
use yali_core::datetimes::DateTimeConv;
use yali_core::types::{NonEmptyStr, PositiveInt};

/// A value to store under `key`, optionally expiring after `ttl` seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct KvEntry {
    pub key: NonEmptyStr,
    pub value: Value,
    pub ttl: Option<PositiveInt>,
}

impl KvEntry {
    /// # Errors
    /// Returns [`NosqlError::Validation`] for an empty key and [`NosqlError::Json`] when
    /// `value` cannot be represented as JSON.
    pub fn new(key: impl Into<String>, value: impl Serialize) -> Result<Self, NosqlError> {
        let key = NonEmptyStr::new(key).map_err(|_| NosqlError::validation("KV key must not be empty"))?;
        let value = serde_json::to_value(value).context("Encoding KV value")?;
        Ok(Self { key, value, ttl: None })
    }

    /// Expires the entry after `seconds`.
    ///
    /// # Errors
    /// Returns [`NosqlError::Validation`] when `seconds` is zero.
    pub fn with_ttl(mut self, seconds: u64) -> Result<Self, NosqlError> {
        self.ttl = Some(
            PositiveInt::new(seconds).map_err(|_| NosqlError::validation("KV TTL must be positive"))?,
        );
        Ok(self)
    }

    /// Strings are stored verbatim, anything else as compact JSON.
    #[must_use]
    pub fn encoded_value(&self) -> String {
        encode_value(&self.value)
    }
}

fn encode_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Reads a stored value as JSON, falling back to the raw text as a JSON string.
fn decode_value<T: DeserializeOwned>(raw: String) -> Result<T, NosqlError> {
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(_) => serde_json::from_value(Value::String(raw)).context("Decoding KV value"),
    }
}

/// A key-value store applying a common key prefix.
///
/// # Examples
/// ```rust
/// use yali_nosql::kvdb::{KvEntry, KvStore, KvStoreSettings, MemoryBackend};
///
/// # #[tokio::main(flavor = "current_thread")] async fn main() -> Result<(), yali_nosql::NosqlError> {
/// let store = KvStore::new(MemoryBackend::new(), &KvStoreSettings::default());
/// store.save(&KvEntry::new("session", serde_json::json!({"user": 7}))?).await?;
///
/// let session: Option<serde_json::Value> = store.fetch("session").await?;
/// assert_eq!(session.unwrap()["user"], 7);
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct KvStore<B = RedisBackend> {
    backend: B,
    prefix: String,
    retry: RetryPolicy,
}

impl KvStore<RedisBackend> {
    /// Connects to the Redis server described by `settings`.
    ///
    /// # Errors
    /// Returns [`NosqlError::Settings`] for an invalid address and [`NosqlError::Redis`]
    /// when the server cannot be reached.
    pub async fn connect(settings: &KvStoreSettings) -> Result<Self, NosqlError> {
        let url = settings.connection_url()?;
        let backend = RedisBackend::connect(&url).await?;
        Ok(Self::new(backend, settings))
    }
}

impl<B: KvBackend> KvStore<B> {
    pub fn new(backend: B, settings: &KvStoreSettings) -> Self {
        Self {
            backend,
            prefix: settings.key_prefix.as_str().to_owned(),
            retry: settings.retry_policy(),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The stored key for `key`.
    #[must_use]
    pub fn full_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    /// Pings the backend, retrying with exponential backoff.
    ///
    /// # Errors
    /// Returns [`NosqlError::Connection`] once every retry failed.
    #[instrument(skip(self))]
    pub async fn ensure_connection(&self) -> Result<(), NosqlError> {
        let mut last_error = match self.backend.ping().await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        let delays =
            DateTimeConv::exponential_backoff(self.retry.base, self.retry.max_retries, self.retry.cap);
        for (attempt, delay) in delays.enumerate() {
            warn!(attempt = attempt + 1, ?delay, error = %last_error, "KV store not ready, retrying...");
            tokio::time::sleep(delay).await;
            match self.backend.ping().await {
                Ok(()) => return Ok(()),
                Err(e) => last_error = e,
            }
        }

        error!(error = %last_error, "KV store is unreachable");
        Err(NosqlError::Connection {
            message: last_error.to_string().into(),
            context: Some(format!("Unreachable after {} retries", self.retry.max_retries).into()),
        })
    }

    /// Stores `entry`, replacing any previous value.
    pub async fn save(&self, entry: &KvEntry) -> Result<(), NosqlError> {
        self.ensure_connection().await?;
        let key = self.full_key(entry.key.as_str());
        self.backend
            .set(&key, &entry.encoded_value(), entry.ttl.map(PositiveInt::get))
            .await
            .inspect_err(|e| error!(%key, error = %e, "Failed to save KV entry"))
    }

    /// Stores `entry` inside a transaction.
    pub async fn safe_save(&self, entry: &KvEntry) -> Result<(), NosqlError> {
        self.ensure_connection().await?;
        let raw = self.raw_entry(entry);
        self.backend
            .set_many(std::slice::from_ref(&raw))
            .await
            .inspect_err(|e| error!(key = %raw.key, error = %e, "Failed to save KV entry"))
    }

    /// Fetches and decodes the value under `key`.
    ///
    /// Values that are not valid JSON decode as a JSON string holding the raw text.
    pub async fn fetch<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, NosqlError> {
        self.ensure_connection().await?;
        let key = self.full_key(key);
        let raw = self
            .backend
            .get(&key)
            .await
            .inspect_err(|e| error!(%key, error = %e, "Failed to fetch KV entry"))?;
        raw.map(decode_value).transpose()
    }

    /// Fetches the value under `key` as JSON, or as a JSON string when it is plain text.
    pub async fn fetch_value(&self, key: &str) -> Result<Option<Value>, NosqlError> {
        self.fetch(key).await
    }

    /// Atomically fetches and deletes the value under `key`.
    pub async fn fetch_and_remove<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, NosqlError> {
        self.ensure_connection().await?;
        let key = self.full_key(key);
        let raw = self
            .backend
            .get_and_delete(&key)
            .await
            .inspect_err(|e| error!(%key, error = %e, "Failed to fetch and remove KV entry"))?;
        raw.map(decode_value).transpose()
    }

    /// Deletes `key` and returns the number of removed keys.
    pub async fn remove(&self, key: &str) -> Result<u64, NosqlError> {
        self.ensure_connection().await?;
        let key = self.full_key(key);
        self.backend
            .delete(&key)
            .await
            .inspect_err(|e| error!(%key, error = %e, "Failed to remove KV entry"))
    }

    pub async fn key_exists(&self, key: &str) -> Result<bool, NosqlError> {
        self.ensure_connection().await?;
        self.backend.exists(&self.full_key(key)).await
    }

    /// Stores all `entries` in one transaction.
    pub async fn multi_save(&self, entries: &[KvEntry]) -> Result<(), NosqlError> {
        self.ensure_connection().await?;
        let raw: Vec<RawEntry> = entries.iter().map(|entry| self.raw_entry(entry)).collect();
        self.backend
            .set_many(&raw)
            .await
            .inspect_err(|e| error!(count = raw.len(), error = %e, "Failed to save KV entries"))
    }

    /// Fetches `keys` in one transaction, one slot per key.
    ///
    /// # Errors
    /// Returns [`NosqlError::Internal`] when the backend answers with a different number of
    /// values than requested.
    pub async fn multi_fetch<T: DeserializeOwned>(
        &self,
        keys: &[&str],
    ) -> Result<Vec<Option<T>>, NosqlError> {
        self.ensure_connection().await?;
        let full_keys: Vec<String> = keys.iter().map(|key| self.full_key(key)).collect();
        let values = self
            .backend
            .get_many(&full_keys)
            .await
            .inspect_err(|e| error!(count = keys.len(), error = %e, "Failed to fetch KV entries"))?;

        if values.len() != keys.len() {
            return Err(format!(
                "Expected {} KV values, the backend returned {}",
                keys.len(),
                values.len()
            )
            .into());
        }
        values.into_iter().map(|raw| raw.map(decode_value).transpose()).collect()
    }

    /// Releases the backend connection.
    pub async fn close(self) -> Result<(), NosqlError> {
        self.backend.close().await
    }

    fn raw_entry(&self, entry: &KvEntry) -> RawEntry {
        RawEntry {
            key: self.full_key(entry.key.as_str()),
            value: entry.encoded_value(),
            ttl: entry.ttl.map(PositiveInt::get),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strings_are_stored_verbatim() {
        assert_eq!(KvEntry::new("k", "plain text").unwrap().encoded_value(), "plain text");
        assert_eq!(KvEntry::new("k", json!({"a": [1, 2]})).unwrap().encoded_value(), r#"{"a":[1,2]}"#);
        assert_eq!(KvEntry::new("k", 42).unwrap().encoded_value(), "42");
    }

    #[test]
    fn test_entry_validation() {
        assert!(matches!(KvEntry::new("", 1), Err(NosqlError::Validation { .. })));
        assert!(KvEntry::new("k", 1).unwrap().with_ttl(0).is_err());
        assert_eq!(KvEntry::new("k", 1).unwrap().with_ttl(30).unwrap().ttl.map(PositiveInt::get), Some(30));
    }

    #[test]
    fn test_decode_falls_back_to_text() {
        assert_eq!(decode_value::<String>("123".into()).unwrap(), "123");
        assert_eq!(decode_value::<Value>("hello".into()).unwrap(), json!("hello"));
        assert_eq!(decode_value::<Value>("[1]".into()).unwrap(), json!([1]));
        assert!(decode_value::<u32>("hello".into()).is_err());
    }
}
