use super::ops::{FIELD_CREATED_AT, FIELD_CREATED_BY, FIELD_ID, FIELD_UPDATED_AT, FIELD_UPDATED_BY};
use crate::error::{NosqlError, NosqlErrorExt};
use bson::oid::ObjectId;
use bson::{Bson, DateTime, Document};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audit fields shared by stored records.
///
/// Embed it with `#[serde(flatten)]` in a record type to get the standard layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none", default)]
    pub id: Option<ObjectId>,
    pub created_at: Option<DateTime>,
    pub updated_at: Option<DateTime>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

impl DocRecord {
    pub const FIELDS: [&'static str; 5] =
        [FIELD_ID, FIELD_CREATED_AT, FIELD_UPDATED_AT, FIELD_CREATED_BY, FIELD_UPDATED_BY];

    /// A new record created by `actor` now.
    pub fn new(actor: impl Into<String>) -> Self {
        let actor = actor.into();
        let now = DateTime::now();
        Self {
            id: None,
            created_at: Some(now),
            updated_at: Some(now),
            created_by: Some(actor.clone()),
            updated_by: Some(actor),
        }
    }
}

/// Serializes `value` into a BSON document.
///
/// # Errors
/// Returns [`NosqlError::BsonEncode`] when `value` does not serialize to a document.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, NosqlError> {
    bson::to_document(value).context("Encoding record")
}

/// Deserializes a stored document into `T`.
///
/// # Errors
/// Returns [`NosqlError::BsonDecode`] when the document does not match `T`.
pub fn from_document<T: for<'de> Deserialize<'de>>(doc: Document) -> Result<T, NosqlError> {
    bson::from_document(doc).context("Decoding record")
}

/// A document `_id` usable as a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocId {
    Object(ObjectId),
    Text(String),
    Int(i64),
}

impl DocId {
    #[must_use]
    pub fn to_bson(&self) -> Bson {
        match self {
            Self::Object(id) => Bson::ObjectId(*id),
            Self::Text(id) => Bson::String(id.clone()),
            Self::Int(id) => Bson::Int64(*id),
        }
    }
}

impl From<ObjectId> for DocId {
    fn from(id: ObjectId) -> Self {
        Self::Object(id)
    }
}

impl From<&str> for DocId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_owned())
    }
}

impl From<i64> for DocId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl TryFrom<&Bson> for DocId {
    type Error = NosqlError;

    fn try_from(value: &Bson) -> Result<Self, Self::Error> {
        match value {
            Bson::ObjectId(id) => Ok(Self::Object(*id)),
            Bson::String(id) => Ok(Self::Text(id.clone())),
            Bson::Int32(id) => Ok(Self::Int(i64::from(*id))),
            Bson::Int64(id) => Ok(Self::Int(*id)),
            other => Err(NosqlError::validation(format!(
                "Unsupported _id type {:?}",
                other.element_type()
            ))),
        }
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
            Self::Int(id) => write!(f, "{id}"),
        }
    }
}
