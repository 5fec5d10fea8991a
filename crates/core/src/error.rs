use std::borrow::Cow;

/// Renders an optional error context as a ` (context)` suffix.
#[must_use]
pub fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}

/// Wires an error enum into the workspace error conventions.
///
/// Every variant must carry a `context: Option<Cow<'static, str>>` field and the enum must
/// have an `Internal { message, context }` variant. The macro generates:
///
/// * an `<Ext>` trait adding `.context(...)` to `Result<T, Error>`;
/// * `From<Source>` plus `<Ext>` impls for every listed source variant;
/// * `From<&'static str>` and `From<String>` mapping into `Internal`.
///
/// ```rust,ignore
/// yali_core::error_context! {
///     NosqlError, NosqlErrorExt;
///     variants: [Validation, Redis, Internal];
///     sources: [Redis => redis::RedisError];
/// }
/// ```
#[macro_export]
macro_rules! error_context {
    (
        $error:ident, $ext:ident;
        variants: [$($variant:ident),* $(,)?];
        sources: [$($src_variant:ident => $src_ty:ty),* $(,)?] $(;)?
    ) => {
        /// Adds a human readable context to a failed result.
        pub trait $ext<T> {
            fn context(
                self,
                context: impl Into<::std::borrow::Cow<'static, str>>,
            ) -> ::std::result::Result<T, $error>;
        }

        #[automatically_derived]
        impl<T> $ext<T> for ::std::result::Result<T, $error> {
            #[inline]
            fn context(self, context: impl Into<::std::borrow::Cow<'static, str>>) -> Self {
                self.map_err(|mut e| {
                    #[allow(unreachable_patterns)]
                    match &mut e {
                        $( $error::$variant { context: c, .. } => *c = Some(context.into()), )*
                        _ => {}
                    }
                    e
                })
            }
        }

        $(
            #[automatically_derived]
            impl From<$src_ty> for $error {
                #[inline]
                fn from(source: $src_ty) -> Self {
                    Self::$src_variant { source, context: None }
                }
            }

            impl<T> $ext<T> for ::std::result::Result<T, $src_ty> {
                #[inline]
                fn context(
                    self,
                    context: impl Into<::std::borrow::Cow<'static, str>>,
                ) -> ::std::result::Result<T, $error> {
                    self.map_err(|source| $error::$src_variant { source, context: Some(context.into()) })
                }
            }
        )*

        impl From<&'static str> for $error {
            #[inline]
            fn from(s: &'static str) -> Self {
                Self::Internal { message: ::std::borrow::Cow::Borrowed(s), context: None }
            }
        }

        impl From<String> for $error {
            #[inline]
            fn from(s: String) -> Self {
                Self::Internal { message: ::std::borrow::Cow::Owned(s), context: None }
            }
        }
    };
}

/// A specialized [`CoreError`] enum of this crate.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Input rejected by a constructor or a settings validator.
    #[error("Validation error{}: {message}", format_context(.context))]
    Validation { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Filesystem or stream failures.
    #[error("IO error{}: {source}", format_context(.context))]
    Io {
        #[source]
        source: std::io::Error,
        context: Option<Cow<'static, str>>,
    },

    /// JSON encoding or decoding failures.
    #[error("JSON error{}: {source}", format_context(.context))]
    Json {
        #[source]
        source: serde_json::Error,
        context: Option<Cow<'static, str>>,
    },

    /// TOML decoding failures.
    #[error("TOML error{}: {source}", format_context(.context))]
    Toml {
        #[source]
        source: toml::de::Error,
        context: Option<Cow<'static, str>>,
    },

    /// Settings could not be assembled or deserialized.
    #[error("Config error{}: {source}", format_context(.context))]
    Config {
        #[source]
        source: config::ConfigError,
        context: Option<Cow<'static, str>>,
    },

    /// Compression codec failures.
    #[error("Compression error{}: {message}", format_context(.context))]
    Compression { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Payload could not be decoded (base64, UTF-8, codec frame).
    #[error("Decode error{}: {message}", format_context(.context))]
    Decode { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Internal fallback for unexpected issues or logic errors.
    #[error("Internal error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

crate::error_context! {
    CoreError, CoreErrorExt;
    variants: [Validation, Io, Json, Toml, Config, Compression, Decode, Internal];
    sources: [
        Io => std::io::Error,
        Json => serde_json::Error,
        Toml => toml::de::Error,
        Config => config::ConfigError,
    ];
}

impl CoreError {
    /// Shorthand used by [`crate::settings::Settings::validate`] implementations.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Validation { message: message.into(), context: None }
    }

    pub(crate) fn compression(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Compression { message: message.into(), context: None }
    }

    pub(crate) fn decode(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Decode { message: message.into(), context: None }
    }
}
