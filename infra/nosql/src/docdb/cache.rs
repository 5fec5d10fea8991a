use super::record::DocId;
use crate::error::NosqlError;
use bson::Document;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Records read by id, misses included.
///
/// Every successful write through a repo must invalidate it.
#[derive(Debug)]
pub(crate) struct RecordCache {
    inner: Cache<DocId, Option<Document>>,
}

impl RecordCache {
    pub(crate) fn new(capacity: u64, ttl: Duration) -> Self {
        Self { inner: Cache::builder().max_capacity(capacity).time_to_live(ttl).build() }
    }

    /// The cached record for `id`, or the result of `load`. Load errors are not cached.
    pub(crate) async fn get_or_load<F>(&self, id: DocId, load: F) -> Result<Option<Document>, NosqlError>
    where
        F: Future<Output = Result<Option<Document>, NosqlError>>,
    {
        self.inner.try_get_with(id, load).await.map_err(|e: Arc<NosqlError>| {
            Arc::try_unwrap(e).unwrap_or_else(|arc| NosqlError::Internal {
                message: arc.to_string().into(),
                context: Some("Cache loader returned a shared error".into()),
            })
        })
    }

    pub(crate) async fn invalidate(&self, id: &DocId) {
        self.inner.invalidate(id).await;
    }

    pub(crate) fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> RecordCache {
        RecordCache::new(16, Duration::from_secs(600))
    }

    #[tokio::test]
    async fn test_misses_are_cached_until_invalidated() {
        let cache = cache();
        let loads = AtomicUsize::new(0);
        let load = |found: Option<Document>| {
            loads.fetch_add(1, Ordering::SeqCst);
            async move { Ok(found) }
        };

        assert_eq!(cache.get_or_load(DocId::from("u1"), load(None)).await.unwrap(), None);
        let created = doc! { "_id": "u1", "email": "a@example.com" };
        let stale = cache.get_or_load(DocId::from("u1"), load(Some(created.clone()))).await.unwrap();
        assert_eq!(stale, None);
        assert_eq!(loads.load(Ordering::SeqCst), 2);

        cache.invalidate_all();
        let fresh = cache.get_or_load(DocId::from("u1"), load(Some(created.clone()))).await.unwrap();
        assert_eq!(fresh, Some(created));
    }

    #[tokio::test]
    async fn test_invalidate_drops_one_id() {
        let cache = cache();
        let first = doc! { "_id": 1, "v": 1 };
        let second = doc! { "_id": 2, "v": 2 };
        cache.get_or_load(DocId::from(1_i64), async { Ok(Some(first.clone())) }).await.unwrap();
        cache.get_or_load(DocId::from(2_i64), async { Ok(Some(second.clone())) }).await.unwrap();

        cache.invalidate(&DocId::from(1_i64)).await;
        let reloaded =
            cache.get_or_load(DocId::from(1_i64), async { Ok(Some(doc! { "_id": 1, "v": 10 })) }).await.unwrap();
        assert_eq!(reloaded.unwrap().get_i32("v").unwrap(), 10);

        let kept = cache.get_or_load(DocId::from(2_i64), async { Ok(None) }).await.unwrap();
        assert_eq!(kept, Some(second));
    }

    #[tokio::test]
    async fn test_load_errors_pass_through_uncached() {
        let cache = cache();
        let err = cache
            .get_or_load(DocId::from("u1"), async { Err(NosqlError::validation("boom")) })
            .await
            .unwrap_err();
        assert!(matches!(err, NosqlError::Validation { .. }));

        let found = cache.get_or_load(DocId::from("u1"), async { Ok(Some(doc! { "_id": "u1" })) }).await;
        assert!(found.unwrap().is_some());
    }
}
