//! # NoSQL Infrastructure
//!
//! Storage layers shared by yali services:
//!
//! - [`kvdb`]: a prefixed key-value store on Redis. Values are JSON encoded (plain strings
//!   verbatim) and every command is preceded by a connectivity check with exponential backoff.
//! - [`docdb`]: audited document repositories on MongoDB with index syncing, cached lookups
//!   by id and a buffered bulk writer.
//!
//! Both layers read their settings from the environment through
//! [`yali_core::settings::Settings`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use yali_core::settings::Settings;
//! use yali_nosql::docdb::{DocClient, DocDbSettings, DocRecord};
//! use yali_nosql::kvdb::{KvEntry, KvStore, KvStoreSettings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), yali_nosql::NosqlError> {
//!     let kv = KvStore::connect(&KvStoreSettings::from_env()?).await?;
//!     kv.save(&KvEntry::new("greeting", "hello")?.with_ttl(60)?).await?;
//!
//!     let db = DocClient::connect(&DocDbSettings::from_env()?).await?;
//!     let fields: Vec<&str> = DocRecord::FIELDS.iter().copied().chain(["email"]).collect();
//!     let users = db.repo("app", "users", &fields);
//!     users.create(bson::doc! { "email": "ann@example.com" }, "signup").await?;
//!
//!     kv.close().await?;
//!     db.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod docdb;
mod error;
pub mod kvdb;

pub use error::{NosqlError, NosqlErrorExt};
