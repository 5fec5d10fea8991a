//! Audited document repositories on MongoDB.
//!
//! A [`DocClient`] owns the pooled driver client. Each [`DocRepo`] works on one collection
//! and fills the [`DocRecord`] audit fields on every write.

mod bulk;
mod cache;
mod index;
mod ops;
mod record;
mod settings;

pub use index::{
    DEFAULT_LANGUAGE_OVERRIDE, DEFAULT_TEXT_LANGUAGE, DocIndex, Geo2DIndexConfig, IndexCommon,
    IndexConfig, IndexField, IndexQualifier, MAX_EXPIRE_AFTER_SECONDS, MAX_INDEX_FIELDS,
    TextIndexConfig,
};
pub use ops::*;
pub use record::{DocId, DocRecord, from_document, to_document};
pub use settings::DocDbSettings;

use crate::error::{NosqlError, NosqlErrorExt};
use bulk::BulkBuffer;
use cache::RecordCache;
use bson::{Document, doc};
use futures_util::TryStreamExt;
use mongodb::options::{
    AggregateOptions, ClientOptions, CountOptions, Credential, FindOneOptions, FindOptions, Hint,
    InsertOneModel, UpdateManyModel, UpdateOneModel, UpdateOptions, WriteModel,
};
use mongodb::results::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult};
use mongodb::{Client, Collection};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Credentials are always checked against this database.
pub const AUTH_SOURCE: &str = "admin";
const COUNT_LIMIT: u64 = 2;
const COUNT_MAX_TIME: Duration = Duration::from_secs(5);

/// A shared, pooled MongoDB client.
#[derive(Debug, Clone)]
pub struct DocClient {
    client: Client,
    settings: Arc<DocDbSettings>,
}

impl DocClient {
    /// Connects with the credentials and pool size of `settings`.
    ///
    /// The server is pinged up to 3 times, starting with a 500ms delay that doubles on
    /// each attempt.
    ///
    /// # Errors
    /// * [`NosqlError::Mongo`] if the connection string is rejected.
    /// * [`NosqlError::Connection`] if the server stays unreachable.
    #[instrument(skip(settings), fields(url = %settings.docdb_url()))]
    pub async fn connect(settings: &DocDbSettings) -> Result<Self, NosqlError> {
        let mut options =
            ClientOptions::parse(settings.docdb_url()).await.context("Parsing DB_URL")?;
        options.credential = Some(
            Credential::builder()
                .username(settings.username.clone())
                .password(settings.password.expose().to_owned())
                .source(AUTH_SOURCE.to_owned())
                .build(),
        );
        options.max_pool_size = Some(settings.pool_size);

        let client = Client::with_options(options).context("Creating MongoDB client")?;
        let this = Self { client, settings: Arc::new(settings.clone()) };

        let mut delay = Duration::from_millis(500);
        for attempt in 1..=3 {
            match this.ping().await {
                Ok(()) => break,
                Err(e) if attempt == 3 => {
                    error!(error = %e, "Document store unreachable");
                    return Err(NosqlError::Connection {
                        message: e.to_string().into(),
                        context: Some("Unhealthy after retries".into()),
                    });
                },
                Err(e) => {
                    warn!(attempt, ?delay, error = %e, "Document store not ready, retrying...");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                },
            }
        }

        info!(pool_size = settings.pool_size, "Document store connection established");
        Ok(this)
    }

    pub async fn ping(&self) -> Result<(), NosqlError> {
        self.client.database(AUTH_SOURCE).run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    #[must_use]
    pub fn settings(&self) -> &DocDbSettings {
        &self.settings
    }

    /// A repository on `db.collection`.
    ///
    /// `record_fields` lists the top-level fields of the stored records. It is used by
    /// strict index syncing.
    #[must_use]
    pub fn repo(&self, db: &str, collection: &str, record_fields: &[&str]) -> DocRepo {
        DocRepo {
            client: self.client.clone(),
            collection: self.client.database(db).collection(collection),
            record_fields: record_fields.iter().map(|field| (*field).to_owned()).collect(),
            cache: RecordCache::new(self.settings.cache_size, self.settings.cache_ttl()),
            bulk: BulkBuffer::new(self.settings.max_bulk_ops),
        }
    }

    /// Closes every pooled connection.
    pub async fn shutdown(self) {
        self.client.shutdown().await;
        info!("Document store connection closed");
    }
}

/// One or many documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Docs {
    One(Document),
    Many(Vec<Document>),
}

impl Docs {
    fn first(self) -> Option<Document> {
        match self {
            Self::One(doc) => Some(doc),
            Self::Many(docs) => docs.into_iter().next(),
        }
    }

    fn into_vec(self) -> Vec<Document> {
        match self {
            Self::One(doc) => vec![doc],
            Self::Many(docs) => docs,
        }
    }
}

impl From<Document> for Docs {
    fn from(doc: Document) -> Self {
        Self::One(doc)
    }
}

impl From<Vec<Document>> for Docs {
    fn from(docs: Vec<Document>) -> Self {
        Self::Many(docs)
    }
}

#[derive(Debug)]
pub enum InsertOutcome {
    One(InsertOneResult),
    Many(InsertManyResult),
}

#[derive(Debug)]
pub enum SaveOutcome {
    Created(InsertOutcome),
    Updated(UpdateResult),
}

/// Parameters of [`DocRepo::read`].
#[must_use]
#[derive(Debug, Clone, Default)]
pub struct ReadQuery {
    filters: Document,
    projection: Option<Document>,
    pipeline: Option<Vec<Document>>,
    find_one: bool,
    hint: Option<Document>,
    allow_disk_use: bool,
}

impl ReadQuery {
    pub fn new(filters: Document) -> Self {
        Self { filters, ..Self::default() }
    }

    /// Runs `pipeline` as an aggregation instead of a find. Filters are ignored.
    pub fn pipeline(mut self, pipeline: Vec<Document>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Returns at most one document.
    pub const fn one(mut self) -> Self {
        self.find_one = true;
        self
    }

    /// Forces the index with these keys.
    pub fn hint(mut self, keys: Document) -> Self {
        self.hint = Some(keys);
        self
    }

    pub const fn allow_disk_use(mut self, allow: bool) -> Self {
        self.allow_disk_use = allow;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadResult {
    One(Option<Document>),
    Many(Vec<Document>),
}

impl ReadResult {
    #[must_use]
    pub fn into_vec(self) -> Vec<Document> {
        match self {
            Self::One(doc) => doc.into_iter().collect(),
            Self::Many(docs) => docs,
        }
    }
}

/// Counters of a committed bulk write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkSummary {
    pub inserted: i64,
    pub matched: i64,
    pub modified: i64,
    pub upserted: i64,
    pub deleted: i64,
}

/// CRUD and buffered bulk writes on one collection.
#[derive(Debug)]
pub struct DocRepo {
    client: Client,
    collection: Collection<Document>,
    record_fields: Vec<String>,
    cache: RecordCache,
    bulk: BulkBuffer<WriteModel>,
}

impl DocRepo {
    #[must_use]
    pub const fn collection(&self) -> &Collection<Document> {
        &self.collection
    }

    #[must_use]
    pub fn record_fields(&self) -> &[String] {
        &self.record_fields
    }

    /// Creates `indexes`, logging the ones that fail.
    ///
    /// In `strict` mode indexes naming a field outside the record fields are skipped.
    #[instrument(skip(self, indexes), fields(collection = %self.collection.name()))]
    pub async fn sync_indexes(&self, indexes: &[DocIndex], strict: bool) {
        let known: Vec<&str> = self.record_fields.iter().map(String::as_str).collect();
        for index in indexes {
            if strict && !index.covers_known_fields(&known) {
                warn!(keys = %index.keys(), "Skipping index on unknown fields");
                continue;
            }
            match self.collection.create_index(index.model()).await {
                Ok(created) => debug!(name = %created.index_name, "Index synced"),
                Err(e) => error!(keys = %index.keys(), error = %e, "Failed to create index"),
            }
        }
    }

    /// Inserts `docs`, filling missing audit fields.
    pub async fn create(&self, docs: impl Into<Docs>, actor: &str) -> Result<InsertOutcome, NosqlError> {
        let outcome = match docs.into() {
            Docs::One(mut doc) => {
                fill_insert_audit(&mut doc, actor);
                let result = self.collection.insert_one(doc).await.context("Inserting document")?;
                InsertOutcome::One(result)
            },
            Docs::Many(mut docs) => {
                for doc in &mut docs {
                    fill_insert_audit(doc, actor);
                }
                let result =
                    self.collection.insert_many(docs).await.context("Inserting documents")?;
                InsertOutcome::Many(result)
            },
        };

        self.cache.invalidate_all();
        Ok(outcome)
    }

    /// Updates the documents matching `filters`.
    ///
    /// See [`compose_update`] for how `data` becomes the update document.
    pub async fn update(
        &self,
        filters: Document,
        data: Document,
        update_one: bool,
        upsert: bool,
        actor: &str,
    ) -> Result<UpdateResult, NosqlError> {
        let update = compose_update(data, actor);
        let options = UpdateOptions::builder().upsert(upsert).build();
        let result = if update_one {
            self.collection.update_one(filters, update).with_options(options).await
        } else {
            self.collection.update_many(filters, update).with_options(options).await
        }
        .context("Updating documents")?;

        self.cache.invalidate_all();
        Ok(result)
    }

    /// Inserts `data` without filters, otherwise updates the matching documents.
    ///
    /// Exactly one match updates that document only. For a list only the first document
    /// is used as update data.
    pub async fn save(
        &self,
        data: impl Into<Docs>,
        filters: Option<Document>,
        upsert: bool,
        actor: &str,
    ) -> Result<SaveOutcome, NosqlError> {
        let data = data.into();
        let Some(filters) = filters.filter(|f| !f.is_empty()) else {
            return self.create(data, actor).await.map(SaveOutcome::Created);
        };
        let Some(update) = data.first() else {
            return Err(NosqlError::validation("Nothing to save"));
        };

        let matches = self
            .collection
            .count_documents(filters.clone())
            .with_options(CountOptions::builder().limit(COUNT_LIMIT).max_time(COUNT_MAX_TIME).build())
            .await
            .context("Counting documents")?;
        self.update(filters, update, matches == 1, upsert, actor).await.map(SaveOutcome::Updated)
    }

    pub async fn delete(&self, filters: Document, delete_one: bool) -> Result<DeleteResult, NosqlError> {
        let result = if delete_one {
            self.collection.delete_one(filters).await
        } else {
            self.collection.delete_many(filters).await
        }
        .context("Deleting documents")?;

        self.cache.invalidate_all();
        Ok(result)
    }

    pub async fn read(&self, query: ReadQuery) -> Result<ReadResult, NosqlError> {
        let hint = query.hint.map(Hint::Keys);

        if let Some(pipeline) = query.pipeline {
            let options = AggregateOptions::builder()
                .hint(hint)
                .allow_disk_use(query.allow_disk_use)
                .build();
            let cursor = self
                .collection
                .aggregate(pipeline)
                .with_options(options)
                .await
                .context("Running aggregation")?;
            return Ok(ReadResult::Many(cursor.try_collect().await?));
        }

        if query.find_one {
            let options = FindOneOptions::builder().projection(query.projection).build();
            let doc = self
                .collection
                .find_one(query.filters)
                .with_options(options)
                .await
                .context("Reading document")?;
            return Ok(ReadResult::One(doc));
        }

        let options = FindOptions::builder()
            .projection(query.projection)
            .hint(hint)
            .allow_disk_use(query.allow_disk_use)
            .build();
        let cursor = self
            .collection
            .find(query.filters)
            .with_options(options)
            .await
            .context("Reading documents")?;
        Ok(ReadResult::Many(cursor.try_collect().await?))
    }

    pub async fn record_count(&self, filters: Document) -> Result<u64, NosqlError> {
        Ok(self.collection.count_documents(filters).await.context("Counting documents")?)
    }

    /// The document with `_id == id`, cached for `DB_CACHE_TTL`.
    pub async fn record_by_id(&self, id: impl Into<DocId>) -> Result<Option<Document>, NosqlError> {
        let id = id.into();
        let filter = doc! { FIELD_ID: id.to_bson() };
        self.cache
            .get_or_load(id, async move {
                self.collection.find_one(filter).await.context("Reading document by id")
            })
            .await
    }

    /// Number of buffered bulk operations.
    #[must_use]
    pub fn pending_bulk_ops(&self) -> usize {
        self.bulk.len()
    }

    /// Buffers inserts of `docs`.
    ///
    /// Returns the summary when the buffer reached `DB_MAX_BULK_OPS` and was committed.
    pub async fn bulk_create(
        &self,
        docs: impl Into<Docs>,
        actor: &str,
    ) -> Result<Option<BulkSummary>, NosqlError> {
        let namespace = self.collection.namespace();
        let models = docs.into().into_vec().into_iter().map(|mut doc| {
            fill_insert_audit(&mut doc, actor);
            WriteModel::InsertOne(
                InsertOneModel::builder().namespace(namespace.clone()).document(doc).build(),
            )
        });
        self.enqueue(models).await
    }

    /// Buffers an update of the documents matching `filters`.
    pub async fn bulk_update(
        &self,
        filters: Document,
        data: Document,
        update_one: bool,
        upsert: bool,
        actor: &str,
    ) -> Result<Option<BulkSummary>, NosqlError> {
        let model = update_model(&self.collection, filters, compose_bulk_update(data, actor), update_one, upsert);
        self.enqueue(std::iter::once(model)).await
    }

    /// Buffers a write of each doc by `_id`: known records are merged and updated, others
    /// inserted.
    ///
    /// # Errors
    /// Returns [`NosqlError::Validation`] when a document has no `_id`. Nothing is buffered
    /// in that case.
    pub async fn bulk_save(
        &self,
        docs: impl Into<Docs>,
        actor: &str,
    ) -> Result<Option<BulkSummary>, NosqlError> {
        let docs = docs.into().into_vec();
        let mut keyed = Vec::with_capacity(docs.len());
        for doc in docs {
            let id = doc_id(&doc)
                .ok_or_else(|| NosqlError::validation("Bulk save requires an _id on every document"))
                .and_then(DocId::try_from)?;
            keyed.push((id, doc));
        }

        let namespace = self.collection.namespace();
        let mut models = Vec::with_capacity(keyed.len());
        for (id, mut doc) in keyed {
            let stored = self.record_by_id(id.clone()).await?;
            self.cache.invalidate(&id).await;
            models.push(match stored {
                Some(stored) => {
                    let mut set = Document::new();
                    set.insert(OP_SET, merge_record(stored, doc, actor));
                    update_model(&self.collection, doc! { FIELD_ID: id.to_bson() }, set, true, false)
                },
                None => {
                    fill_insert_audit(&mut doc, actor);
                    WriteModel::InsertOne(
                        InsertOneModel::builder().namespace(namespace.clone()).document(doc).build(),
                    )
                },
            });
        }
        self.enqueue(models).await
    }

    /// Writes every buffered operation in one ordered bulk request.
    ///
    /// Returns `None` when nothing was buffered. The buffer is cleared even if the write
    /// fails.
    #[instrument(skip(self), fields(collection = %self.collection.name()))]
    pub async fn bulk_commit(&self) -> Result<Option<BulkSummary>, NosqlError> {
        let client = &self.client;
        let summary = self
            .bulk
            .drain_into(|models| async move {
                let count = models.len();
                let result = client
                    .bulk_write(models)
                    .await
                    .inspect_err(|e| error!(count, error = %e, "Bulk write failed"))
                    .context("Committing bulk operations")?;
                let summary = BulkSummary {
                    inserted: result.inserted_count,
                    matched: result.matched_count,
                    modified: result.modified_count,
                    upserted: result.upserted_count,
                    deleted: result.deleted_count,
                };
                debug!(count, ?summary, "Bulk operations committed");
                Ok::<_, NosqlError>(summary)
            })
            .await?;
        if summary.is_some() {
            self.cache.invalidate_all();
        }
        Ok(summary)
    }

    async fn enqueue(
        &self,
        models: impl IntoIterator<Item = WriteModel>,
    ) -> Result<Option<BulkSummary>, NosqlError> {
        if self.bulk.push(models) { self.bulk_commit().await } else { Ok(None) }
    }
}

fn fill_insert_audit(doc: &mut Document, actor: &str) {
    sync_created_audit(doc, actor);
    sync_updated_audit(doc, actor);
}

fn update_model(
    collection: &Collection<Document>,
    filter: Document,
    update: Document,
    update_one: bool,
    upsert: bool,
) -> WriteModel {
    let namespace = collection.namespace();
    if update_one {
        WriteModel::UpdateOne(
            UpdateOneModel::builder()
                .namespace(namespace)
                .filter(filter)
                .update(update)
                .upsert(upsert)
                .build(),
        )
    } else {
        WriteModel::UpdateMany(
            UpdateManyModel::builder()
                .namespace(namespace)
                .filter(filter)
                .update(update)
                .upsert(upsert)
                .build(),
        )
    }
}
