use std::borrow::Cow;
use yali_core::error::format_context;

/// Errors that can occur while setting up logging or telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failure when configuring the rolling file appender (e.g., invalid path).
    #[error("Rolling file appender error{}: {source}", format_context(.context))]
    Appender {
        #[source]
        source: tracing_appender::rolling::InitError,
        context: Option<Cow<'static, str>>,
    },

    /// Occurs if a global tracing subscriber has already been initialized in the current process.
    #[error("Tracing subscriber error{}: {source}", format_context(.context))]
    Subscriber {
        #[source]
        source: tracing_subscriber::util::TryInitError,
        context: Option<Cow<'static, str>>,
    },

    /// Log files or certificates could not be created or read.
    #[error("IO error{}: {source}", format_context(.context))]
    Io {
        #[source]
        source: std::io::Error,
        context: Option<Cow<'static, str>>,
    },

    /// Settings could not be loaded from the environment.
    #[error("Settings error{}: {source}", format_context(.context))]
    Settings {
        #[source]
        source: yali_core::CoreError,
        context: Option<Cow<'static, str>>,
    },

    /// Invalid configuration supplied to the logger builder.
    #[error("Invalid logger configuration{}: {message}", format_context(.context))]
    InvalidConfiguration { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The OTLP exporters could not be built.
    #[cfg(feature = "otlp")]
    #[error("OpenTelemetry error{}: {source}", format_context(.context))]
    OpenTelemetry {
        #[source]
        source: opentelemetry_otlp::ExporterBuildError,
        context: Option<Cow<'static, str>>,
    },

    /// Internal logic errors.
    #[error("Internal telemetry error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

#[cfg(feature = "otlp")]
yali_core::error_context! {
    TelemetryError, TelemetryErrorExt;
    variants: [Appender, Subscriber, Io, Settings, InvalidConfiguration, OpenTelemetry, Internal];
    sources: [
        Appender => tracing_appender::rolling::InitError,
        Subscriber => tracing_subscriber::util::TryInitError,
        Io => std::io::Error,
        Settings => yali_core::CoreError,
        OpenTelemetry => opentelemetry_otlp::ExporterBuildError,
    ];
}

#[cfg(not(feature = "otlp"))]
yali_core::error_context! {
    TelemetryError, TelemetryErrorExt;
    variants: [Appender, Subscriber, Io, Settings, InvalidConfiguration, Internal];
    sources: [
        Appender => tracing_appender::rolling::InitError,
        Subscriber => tracing_subscriber::util::TryInitError,
        Io => std::io::Error,
        Settings => yali_core::CoreError,
    ];
}

impl TelemetryError {
    pub(crate) fn invalid(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidConfiguration { message: message.into(), context: None }
    }
}
