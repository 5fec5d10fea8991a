//! Tests against real servers.
//!
//! Run with `cargo test -- --ignored` and `YALI_TEST_REDIS_HOST` / `YALI_TEST_MONGO_*` set.
//! Bulk writes need MongoDB 8.0 or newer.

use bson::doc;
use serial_test::serial;
use yali_core::settings::SettingsLoader;
use yali_nosql::docdb::{
    DocClient, DocDbSettings, DocIndex, DocRecord, ReadQuery, SaveOutcome,
};
use yali_nosql::kvdb::{KvEntry, KvStore, KvStoreSettings};

fn env(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} must be set for live tests"))
}

#[tokio::test]
#[ignore = "needs a Redis server"]
async fn redis_round_trip() {
    let settings: KvStoreSettings = SettingsLoader::new()
        .vars([("KV_STORE_HOST", env("YALI_TEST_REDIS_HOST")), ("KV_PREFIX", "yali-test|".into())])
        .load()
        .unwrap();
    let store = KvStore::connect(&settings).await.unwrap();

    store.multi_save(&[KvEntry::new("x", 1).unwrap(), KvEntry::new("y", "two").unwrap()]).await.unwrap();
    let values = store.multi_fetch::<serde_json::Value>(&["x", "y"]).await.unwrap();
    assert_eq!(values, vec![Some(serde_json::json!(1)), Some(serde_json::json!("two"))]);
    assert_eq!(store.fetch_and_remove::<u32>("x").await.unwrap(), Some(1));
    assert_eq!(store.remove("y").await.unwrap(), 1);
    store.close().await.unwrap();
}

async fn mongo_client() -> DocClient {
    let settings: DocDbSettings = SettingsLoader::new()
        .vars([
            ("DB_URL", env("YALI_TEST_MONGO_URL")),
            ("DB_USER", env("YALI_TEST_MONGO_USER")),
            ("DB_PASSWD", env("YALI_TEST_MONGO_PASSWD")),
            ("DB_MAX_BULK_OPS", "2".into()),
        ])
        .load()
        .unwrap();
    DocClient::connect(&settings).await.unwrap()
}

#[tokio::test]
#[serial]
#[ignore = "needs a MongoDB server"]
async fn mongo_create_replaces_cached_miss() {
    let client = mongo_client().await;
    let repo = client.repo("yali_test", "cached_users", &DocRecord::FIELDS);
    repo.delete(doc! {}, false).await.unwrap();

    assert!(repo.record_by_id("c1").await.unwrap().is_none());
    repo.create(doc! { "_id": "c1", "email": "c1@example.com" }, "test").await.unwrap();
    let created = repo.record_by_id("c1").await.unwrap().expect("create must invalidate the cached miss");
    assert_eq!(created.get_str("email").unwrap(), "c1@example.com");

    repo.delete(doc! { "_id": "c1" }, true).await.unwrap();
    assert!(repo.record_by_id("c1").await.unwrap().is_none());
    client.shutdown().await;
}

#[tokio::test]
#[serial]
#[ignore = "needs a MongoDB server"]
async fn mongo_repository_flow() {
    let client = mongo_client().await;
    let fields: Vec<&str> = DocRecord::FIELDS.iter().copied().chain(["email"]).collect();
    let repo = client.repo("yali_test", "users", &fields);
    repo.delete(doc! {}, false).await.unwrap();
    repo.sync_indexes(&[DocIndex::ascending("email").unwrap(), DocIndex::ascending("unknown").unwrap()], true)
        .await;

    repo.create(doc! { "_id": "u1", "email": "a@example.com" }, "test").await.unwrap();
    let outcome = repo.save(doc! { "email": "b@example.com" }, Some(doc! { "_id": "u1" }), false, "test").await.unwrap();
    assert!(matches!(outcome, SaveOutcome::Updated(ref r) if r.modified_count == 1));

    let stored = repo.record_by_id("u1").await.unwrap().unwrap();
    assert_eq!(stored.get_str("email").unwrap(), "b@example.com");
    assert_eq!(stored.get_str("created_by").unwrap(), "test");

    assert!(repo.bulk_save(doc! { "_id": "u2", "email": "c@example.com" }, "bulk").await.unwrap().is_none());
    let summary = repo.bulk_save(doc! { "_id": "u1", "email": "d@example.com" }, "bulk").await.unwrap().unwrap();
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.modified, 1);
    assert!(repo.bulk_commit().await.unwrap().is_none());

    let all = repo.read(ReadQuery::new(doc! {})).await.unwrap().into_vec();
    assert_eq!(all.len(), 2);
    assert_eq!(repo.record_count(doc! { "updated_by": "bulk" }).await.unwrap(), 2);
    client.shutdown().await;
}
