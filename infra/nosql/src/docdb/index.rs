//! Index definitions synced by [`DocRepo::sync_indexes`](super::DocRepo::sync_indexes).

use crate::error::NosqlError;
use bson::{Bson, Document};
use mongodb::IndexModel;
use mongodb::options::{IndexOptions, TextIndexVersion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const MAX_INDEX_FIELDS: usize = 32;
pub const MAX_EXPIRE_AFTER_SECONDS: u32 = 2_147_483_647;
pub const DEFAULT_TEXT_LANGUAGE: &str = "english";
pub const DEFAULT_LANGUAGE_OVERRIDE: &str = "language";

/// How a field takes part in an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexQualifier {
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
    #[serde(rename = "hashed")]
    Hashed,
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "2d")]
    Geo2D,
    #[serde(rename = "2dsphere")]
    GeoSphere,
}

impl IndexQualifier {
    /// The value of this qualifier in an index key document.
    #[must_use]
    pub fn as_bson(self) -> Bson {
        match self {
            Self::Ascending => Bson::Int32(1),
            Self::Descending => Bson::Int32(-1),
            Self::Hashed => Bson::from("hashed"),
            Self::Text => Bson::from("text"),
            Self::Geo2D => Bson::from("2d"),
            Self::GeoSphere => Bson::from("2dsphere"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexField {
    pub name: String,
    pub qualifier: IndexQualifier,
}

impl IndexField {
    pub fn new(name: impl Into<String>, qualifier: IndexQualifier) -> Self {
        Self { name: name.into(), qualifier }
    }

    pub fn asc(name: impl Into<String>) -> Self {
        Self::new(name, IndexQualifier::Ascending)
    }

    pub fn desc(name: impl Into<String>) -> Self {
        Self::new(name, IndexQualifier::Descending)
    }

    /// The top-level record field this index field refers to.
    #[must_use]
    pub fn root(&self) -> &str {
        self.name.split('.').next().unwrap_or_default()
    }
}

/// Options shared by every index kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexCommon {
    pub name: Option<String>,
    pub unique: bool,
    pub sparse: bool,
    pub background: bool,
    pub expire_after_seconds: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextIndexConfig {
    #[serde(flatten)]
    pub common: IndexCommon,
    pub weights: Option<BTreeMap<String, i32>>,
    pub default_language: String,
    pub language_override: String,
    pub text_version: Option<u32>,
}

impl Default for TextIndexConfig {
    fn default() -> Self {
        Self {
            common: IndexCommon::default(),
            weights: None,
            default_language: DEFAULT_TEXT_LANGUAGE.to_owned(),
            language_override: DEFAULT_LANGUAGE_OVERRIDE.to_owned(),
            text_version: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Geo2DIndexConfig {
    #[serde(flatten)]
    pub common: IndexCommon,
    pub bits: u32,
    pub min: f64,
    pub max: f64,
}

impl Default for Geo2DIndexConfig {
    fn default() -> Self {
        Self { common: IndexCommon::default(), bits: 26, min: -180.0, max: 180.0 }
    }
}

/// Index kind and its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexConfig {
    Doc(IndexCommon),
    Text(TextIndexConfig),
    #[serde(rename = "geo2d")]
    Geo2D(Geo2DIndexConfig),
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::Doc(IndexCommon::default())
    }
}

impl IndexConfig {
    #[must_use]
    pub const fn common(&self) -> &IndexCommon {
        match self {
            Self::Doc(common) => common,
            Self::Text(text) => &text.common,
            Self::Geo2D(geo) => &geo.common,
        }
    }

    /// # Errors
    /// Returns [`NosqlError::Validation`] for an out-of-range TTL, bit precision or bound.
    pub fn validate(&self) -> Result<(), NosqlError> {
        if let Some(ttl) = self.common().expire_after_seconds
            && ttl > MAX_EXPIRE_AFTER_SECONDS
        {
            return Err(NosqlError::validation(format!(
                "expire_after_seconds must be within 0..={MAX_EXPIRE_AFTER_SECONDS}, got {ttl}"
            )));
        }
        if let Self::Geo2D(geo) = self {
            if !(1..=32).contains(&geo.bits) {
                return Err(NosqlError::validation(format!("bits must be within 1..=32, got {}", geo.bits)));
            }
            for (name, bound) in [("min", geo.min), ("max", geo.max)] {
                if !(-180.0..=180.0).contains(&bound) {
                    return Err(NosqlError::validation(format!(
                        "{name} must be within -180..=180, got {bound}"
                    )));
                }
            }
            if geo.min >= geo.max {
                return Err(NosqlError::validation("min must be below max"));
            }
        }
        Ok(())
    }

    fn options(&self) -> IndexOptions {
        let common = self.common();
        let base = IndexOptions::builder()
            .name(common.name.clone())
            .unique(common.unique.then_some(true))
            .sparse(common.sparse.then_some(true))
            .background(common.background.then_some(true))
            .expire_after(common.expire_after_seconds.map(|secs| Duration::from_secs(u64::from(secs))));

        match self {
            Self::Doc(_) => base.build(),
            Self::Text(text) => base
                .weights(text.weights.as_ref().map(|weights| {
                    weights.iter().map(|(field, weight)| (field.clone(), Bson::Int32(*weight))).collect::<Document>()
                }))
                .default_language(Some(text.default_language.clone()))
                .language_override(Some(text.language_override.clone()))
                .text_index_version(text.text_version.map(|version| match version {
                    1 => TextIndexVersion::V1,
                    2 => TextIndexVersion::V2,
                    3 => TextIndexVersion::V3,
                    other => TextIndexVersion::Custom(other),
                }))
                .build(),
            Self::Geo2D(geo) => {
                base.bits(Some(geo.bits)).min(Some(geo.min)).max(Some(geo.max)).build()
            },
        }
    }
}

/// An index over one to [`MAX_INDEX_FIELDS`] fields.
///
/// Deserializing validates the same way [`DocIndex::new`] does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDocIndex")]
pub struct DocIndex {
    fields: Vec<IndexField>,
    config: IndexConfig,
}

#[derive(Deserialize)]
struct RawDocIndex {
    fields: Vec<IndexField>,
    #[serde(default)]
    config: IndexConfig,
}

impl TryFrom<RawDocIndex> for DocIndex {
    type Error = NosqlError;

    fn try_from(raw: RawDocIndex) -> Result<Self, Self::Error> {
        Self::new(raw.fields, raw.config)
    }
}

impl DocIndex {
    /// # Errors
    /// Returns [`NosqlError::Validation`] for an empty or oversized field list, or an invalid
    /// `config`.
    pub fn new(fields: Vec<IndexField>, config: IndexConfig) -> Result<Self, NosqlError> {
        let index = Self { fields, config };
        index.validate()?;
        Ok(index)
    }

    /// A single-field ascending index with default options.
    pub fn ascending(field: impl Into<String>) -> Result<Self, NosqlError> {
        Self::new(vec![IndexField::asc(field)], IndexConfig::default())
    }

    /// # Errors
    /// See [`DocIndex::new`].
    pub fn validate(&self) -> Result<(), NosqlError> {
        if self.fields.is_empty() || self.fields.len() > MAX_INDEX_FIELDS {
            return Err(NosqlError::validation(format!(
                "An index needs 1..={MAX_INDEX_FIELDS} fields, got {}",
                self.fields.len()
            )));
        }
        self.config.validate()
    }

    #[must_use]
    pub fn fields(&self) -> &[IndexField] {
        &self.fields
    }

    #[must_use]
    pub const fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// The index key document, fields in declaration order.
    #[must_use]
    pub fn keys(&self) -> Document {
        self.fields.iter().map(|field| (field.name.clone(), field.qualifier.as_bson())).collect()
    }

    /// Whether every field refers to one of `record_fields`.
    #[must_use]
    pub fn covers_known_fields(&self, record_fields: &[&str]) -> bool {
        self.fields.iter().all(|field| record_fields.contains(&field.root()))
    }

    #[must_use]
    pub fn model(&self) -> IndexModel {
        IndexModel::builder().keys(self.keys()).options(self.config.options()).build()
    }
}
