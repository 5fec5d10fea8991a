use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use yali_core::settings::SettingsLoader;
use yali_nosql::NosqlError;
use yali_nosql::kvdb::{KvBackend, KvEntry, KvStore, KvStoreSettings, MemoryBackend};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Session {
    user: u32,
    roles: Vec<String>,
}

fn store() -> KvStore<MemoryBackend> {
    let settings: KvStoreSettings =
        SettingsLoader::new().vars([("KV_PREFIX", "test|")]).load().unwrap();
    KvStore::new(MemoryBackend::new(), &settings)
}

#[tokio::test]
async fn typed_values_round_trip_under_prefix() {
    let store = store();
    let session = Session { user: 7, roles: vec!["admin".into()] };
    store.save(&KvEntry::new("session:7", &session).unwrap()).await.unwrap();

    assert!(store.backend().exists("test|session:7").await.unwrap());
    assert!(store.key_exists("session:7").await.unwrap());
    assert_eq!(store.fetch::<Session>("session:7").await.unwrap(), Some(session));
    assert_eq!(store.fetch::<Session>("missing").await.unwrap(), None);
}

#[tokio::test]
async fn plain_text_is_stored_verbatim() {
    let store = store();
    store.safe_save(&KvEntry::new("motd", "hello world").unwrap()).await.unwrap();

    assert_eq!(store.backend().get("test|motd").await.unwrap().as_deref(), Some("hello world"));
    assert_eq!(store.fetch_value("motd").await.unwrap(), Some(json!("hello world")));
    assert_eq!(store.fetch::<String>("motd").await.unwrap().as_deref(), Some("hello world"));
}

#[tokio::test]
async fn fetch_and_remove_is_one_shot() {
    let store = store();
    store.save(&KvEntry::new("token", json!({"scope": "read"})).unwrap()).await.unwrap();

    let first = store.fetch_and_remove::<serde_json::Value>("token").await.unwrap();
    assert_eq!(first, Some(json!({"scope": "read"})));
    assert_eq!(store.fetch_and_remove::<serde_json::Value>("token").await.unwrap(), None);
    assert_eq!(store.remove("token").await.unwrap(), 0);
}

#[tokio::test]
async fn multi_save_and_fetch_keep_key_order() {
    let store = store();
    let entries = vec![
        KvEntry::new("a", 1).unwrap(),
        KvEntry::new("b", 2).unwrap().with_ttl(60).unwrap(),
    ];
    store.multi_save(&entries).await.unwrap();

    let values = store.multi_fetch::<u32>(&["b", "nope", "a"]).await.unwrap();
    assert_eq!(values, vec![Some(2), None, Some(1)]);
    assert_eq!(store.remove("a").await.unwrap(), 1);
}

#[tokio::test]
async fn decoding_into_the_wrong_type_fails() {
    let store = store();
    store.save(&KvEntry::new("name", "ann").unwrap()).await.unwrap();
    assert!(matches!(store.fetch::<u32>("name").await, Err(NosqlError::Json { .. })));
}

#[tokio::test]
async fn expired_entries_disappear() {
    let store = store();
    let mut entry = KvEntry::new("short", 1).unwrap().with_ttl(1).unwrap();
    store.save(&entry).await.unwrap();
    assert!(store.key_exists("short").await.unwrap());

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(!store.key_exists("short").await.unwrap());

    entry.ttl = None;
    store.save(&entry).await.unwrap();
    assert!(store.key_exists("short").await.unwrap());
    store.close().await.unwrap();
}
