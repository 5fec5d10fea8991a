use super::backend::{KvBackend, RawEntry};
use crate::error::{NosqlError, NosqlErrorExt};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, info};
use url::Url;

/// A Redis backend over a multiplexed, auto-reconnecting connection.
#[derive(Clone)]
pub struct RedisBackend {
    manager: ConnectionManager,
    address: String,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend").field("address", &self.address).finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Opens the connection described by `url`.
    ///
    /// # Errors
    /// Returns [`NosqlError::Redis`] when the URL is rejected or the server is unreachable.
    pub async fn connect(url: &Url) -> Result<Self, NosqlError> {
        let address = format!(
            "{}:{}{}",
            url.host_str().unwrap_or_default(),
            url.port().unwrap_or(6379),
            url.path()
        );
        let client = Client::open(url.as_str()).context("Invalid KV store URL")?;
        let manager = ConnectionManager::new(client)
            .await
            .context(format!("Connecting to {address}"))?;

        info!(%address, "KV store connection established");
        Ok(Self { manager, address })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn ping(&self) -> Result<(), NosqlError> {
        let reply: String = redis::cmd("PING").query_async(&mut self.conn()).await?;
        if reply.eq_ignore_ascii_case("PONG") {
            Ok(())
        } else {
            Err(NosqlError::connection(format!("Unexpected PING reply '{reply}'")))
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, NosqlError> {
        Ok(self.conn().get(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<(), NosqlError> {
        let mut conn = self.conn();
        match ttl {
            Some(seconds) => conn.set_ex::<_, _, ()>(key, value, seconds).await?,
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<u64, NosqlError> {
        Ok(self.conn().del(key).await?)
    }

    async fn exists(&self, key: &str) -> Result<bool, NosqlError> {
        Ok(self.conn().exists(key).await?)
    }

    async fn get_and_delete(&self, key: &str) -> Result<Option<String>, NosqlError> {
        let (value,): (Option<String>,) = redis::pipe()
            .atomic()
            .get(key)
            .del(key)
            .ignore()
            .query_async(&mut self.conn())
            .await?;
        Ok(value)
    }

    async fn set_many(&self, entries: &[RawEntry]) -> Result<(), NosqlError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for entry in entries {
            match entry.ttl {
                Some(seconds) => pipe.set_ex(&entry.key, &entry.value, seconds).ignore(),
                None => pipe.set(&entry.key, &entry.value).ignore(),
            };
        }
        pipe.query_async::<()>(&mut self.conn()).await?;
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, NosqlError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for key in keys {
            pipe.get(key);
        }
        Ok(pipe.query_async(&mut self.conn()).await?)
    }

    async fn close(&self) -> Result<(), NosqlError> {
        debug!(address = %self.address, "KV store connection released");
        Ok(())
    }
}
