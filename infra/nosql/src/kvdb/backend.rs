use crate::error::NosqlError;
use async_trait::async_trait;
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// An encoded value ready to be written, with its optional expiry in seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub key: String,
    pub value: String,
    pub ttl: Option<u64>,
}

/// The storage commands a [`KvStore`](super::KvStore) needs.
///
/// Keys reaching a backend are already prefixed. The `*_many` and `get_and_delete`
/// commands must be atomic.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn ping(&self) -> Result<(), NosqlError>;

    async fn get(&self, key: &str) -> Result<Option<String>, NosqlError>;

    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<(), NosqlError>;

    /// Returns the number of removed keys.
    async fn delete(&self, key: &str) -> Result<u64, NosqlError>;

    async fn exists(&self, key: &str) -> Result<bool, NosqlError>;

    async fn get_and_delete(&self, key: &str) -> Result<Option<String>, NosqlError>;

    async fn set_many(&self, entries: &[RawEntry]) -> Result<(), NosqlError>;

    /// Returns one slot per key, in order.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, NosqlError>;

    async fn close(&self) -> Result<(), NosqlError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: &str, ttl: Option<u64>) -> Self {
        Self {
            value: value.to_owned(),
            expires_at: ttl.map(|secs| Instant::now() + Duration::from_secs(secs)),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// An in-process backend honouring TTLs, for tests and single-process tools.
///
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    slots: Arc<Mutex<FxHashMap<String, Slot>>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.slots.lock().values().filter(|slot| slot.is_live(now)).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every expired slot.
    fn sweep(slots: &mut FxHashMap<String, Slot>) {
        let now = Instant::now();
        slots.retain(|_, slot| slot.is_live(now));
    }

    fn live(slots: &mut FxHashMap<String, Slot>, key: &str) -> Option<String> {
        let now = Instant::now();
        match slots.get(key) {
            Some(slot) if slot.is_live(now) => Some(slot.value.clone()),
            Some(_) => {
                slots.remove(key);
                None
            },
            None => None,
        }
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn ping(&self) -> Result<(), NosqlError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, NosqlError> {
        Ok(Self::live(&mut self.slots.lock(), key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<(), NosqlError> {
        let mut slots = self.slots.lock();
        Self::sweep(&mut slots);
        slots.insert(key.to_owned(), Slot::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<u64, NosqlError> {
        let mut slots = self.slots.lock();
        let removed = Self::live(&mut slots, key).is_some();
        slots.remove(key);
        Ok(u64::from(removed))
    }

    async fn exists(&self, key: &str) -> Result<bool, NosqlError> {
        Ok(Self::live(&mut self.slots.lock(), key).is_some())
    }

    async fn get_and_delete(&self, key: &str) -> Result<Option<String>, NosqlError> {
        let mut slots = self.slots.lock();
        let value = Self::live(&mut slots, key);
        slots.remove(key);
        Ok(value)
    }

    async fn set_many(&self, entries: &[RawEntry]) -> Result<(), NosqlError> {
        let mut slots = self.slots.lock();
        Self::sweep(&mut slots);
        for entry in entries {
            slots.insert(entry.key.clone(), Slot::new(&entry.value, entry.ttl));
        }
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, NosqlError> {
        let mut slots = self.slots.lock();
        Ok(keys.iter().map(|key| Self::live(&mut slots, key)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_expires_entries() {
        let backend = MemoryBackend::new();
        backend.set("a", "1", None).await.unwrap();
        backend.set("b", "2", Some(0)).await.unwrap();

        assert_eq!(backend.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(backend.get("b").await.unwrap(), None);
        assert!(!backend.exists("b").await.unwrap());
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_backend_sweeps_expired_on_write() {
        let backend = MemoryBackend::new();
        backend.set("a", "1", Some(0)).await.unwrap();
        assert_eq!(backend.slots.lock().len(), 1);
        assert!(backend.is_empty());

        let entries = [RawEntry { key: "c".into(), value: "2".into(), ttl: Some(0) }];
        backend.set_many(&entries).await.unwrap();
        assert!(!backend.slots.lock().contains_key("a"));

        backend.set("keep", "3", Some(60)).await.unwrap();
        assert_eq!(backend.slots.lock().len(), 1);
        assert_eq!(backend.get("keep").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_memory_backend_delete_counts_live_keys() {
        let backend = MemoryBackend::new();
        backend.set("a", "1", None).await.unwrap();
        assert_eq!(backend.delete("a").await.unwrap(), 1);
        assert_eq!(backend.delete("a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_memory_backend_batches() {
        let backend = MemoryBackend::new();
        let entries = [
            RawEntry { key: "x".into(), value: "1".into(), ttl: None },
            RawEntry { key: "y".into(), value: "2".into(), ttl: Some(60) },
        ];
        backend.set_many(&entries).await.unwrap();

        let values = backend.get_many(&["x".into(), "missing".into(), "y".into()]).await.unwrap();
        assert_eq!(values, vec![Some("1".into()), None, Some("2".into())]);
        assert_eq!(backend.get_and_delete("x").await.unwrap().as_deref(), Some("1"));
        assert!(backend.get("x").await.unwrap().is_none());
    }
}
