use std::borrow::Cow;
use yali_core::error::format_context;

/// A specialized [`NosqlError`] enum of this crate.
#[derive(Debug, thiserror::Error)]
pub enum NosqlError {
    /// Validation errors.
    #[error("Validation error{}: {message}", format_context(.context))]
    Validation { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Occurs when connectivity or health checks fail.
    #[error("Connection failed{}: {message}", format_context(.context))]
    Connection { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A wrapper for Redis client errors.
    #[error("Redis error{}: {source}", format_context(.context))]
    Redis {
        #[source]
        source: redis::RedisError,
        context: Option<Cow<'static, str>>,
    },

    /// A wrapper for MongoDB driver errors.
    #[error("MongoDB error{}: {source}", format_context(.context))]
    Mongo {
        #[source]
        source: mongodb::error::Error,
        context: Option<Cow<'static, str>>,
    },

    /// A value could not be converted to BSON.
    #[error("BSON encoding error{}: {source}", format_context(.context))]
    BsonEncode {
        #[source]
        source: bson::ser::Error,
        context: Option<Cow<'static, str>>,
    },

    /// A BSON document could not be converted to the requested type.
    #[error("BSON decoding error{}: {source}", format_context(.context))]
    BsonDecode {
        #[source]
        source: bson::de::Error,
        context: Option<Cow<'static, str>>,
    },

    /// JSON encoding or decoding of stored values failed.
    #[error("JSON error{}: {source}", format_context(.context))]
    Json {
        #[source]
        source: serde_json::Error,
        context: Option<Cow<'static, str>>,
    },

    /// Settings could not be loaded or validated.
    #[error("Settings error{}: {source}", format_context(.context))]
    Settings {
        #[source]
        source: yali_core::CoreError,
        context: Option<Cow<'static, str>>,
    },

    /// Internal fallback for unexpected issues or logic errors.
    #[error("Internal nosql error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

yali_core::error_context! {
    NosqlError, NosqlErrorExt;
    variants: [Validation, Connection, Redis, Mongo, BsonEncode, BsonDecode, Json, Settings, Internal];
    sources: [
        Redis => redis::RedisError,
        Mongo => mongodb::error::Error,
        BsonEncode => bson::ser::Error,
        BsonDecode => bson::de::Error,
        Json => serde_json::Error,
        Settings => yali_core::CoreError,
    ];
}

impl NosqlError {
    pub(crate) fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Validation { message: message.into(), context: None }
    }

    pub(crate) fn connection(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Connection { message: message.into(), context: None }
    }
}
