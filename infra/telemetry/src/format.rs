//! JSON line formatting for log events.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::{self, Write as _};
use std::sync::LazyLock;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Timestamp layout of `asctime` and `utctime`.
pub const LOG_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f%z";

#[cfg(feature = "otlp")]
const OTEL_TRACE_ID: &str = "otelTraceID";
#[cfg(feature = "otlp")]
const OTEL_SPAN_ID: &str = "otelSpanID";

static PROCESS_NAME: LazyLock<String> = LazyLock::new(|| {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
        .unwrap_or_else(|| String::from("main"))
});

/// Formats each event as one JSON object per line.
///
/// Event fields are kept as extras next to `message`, `levelname`, `name`, `processName`,
/// `asctime` and `utctime`. With `verbose` set, source location and process details are
/// added as well.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLogFormatter {
    verbose: bool,
}

impl JsonLogFormatter {
    #[must_use]
    pub const fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn record(&self, event: &Event<'_>) -> Map<String, Value> {
        let meta = event.metadata();
        let mut record = Map::new();
        event.record(&mut FieldCollector(&mut record));

        let message = record.remove("message").unwrap_or_else(|| Value::String(String::new()));
        record.insert("message".into(), message);
        record.insert("levelname".into(), level_name(*meta.level()).into());
        record.insert("name".into(), meta.target().into());
        record.insert("processName".into(), PROCESS_NAME.as_str().into());

        if self.verbose {
            let pathname = meta.file().unwrap_or_default();
            let filename = std::path::Path::new(pathname)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            record.insert("module".into(), meta.module_path().unwrap_or_default().into());
            record.insert("pathname".into(), pathname.into());
            record.insert("filename".into(), filename.into());
            record.insert("lineno".into(), meta.line().unwrap_or_default().into());
            record.insert("process".into(), std::process::id().into());
            record.insert(
                "threadName".into(),
                std::thread::current().name().unwrap_or("unnamed").into(),
            );
        }

        let now = Utc::now();
        if !record.contains_key("asctime") {
            let local: DateTime<Local> = now.with_timezone(&Local);
            record.insert("asctime".into(), local.format(LOG_DATETIME_FORMAT).to_string().into());
        }
        if !record.contains_key("utctime") {
            record.insert("utctime".into(), now.format(LOG_DATETIME_FORMAT).to_string().into());
        }

        #[cfg(feature = "otlp")]
        if let Some((trace_id, span_id)) = current_otel_ids() {
            record.entry(OTEL_TRACE_ID).or_insert_with(|| trace_id.into());
            record.entry(OTEL_SPAN_ID).or_insert_with(|| span_id.into());
        }

        record
    }
}

impl<S, N> FormatEvent<S, N> for JsonLogFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let line = serde_json::to_string(&self.record(event)).map_err(|_| fmt::Error)?;
        writeln!(writer, "{line}")
    }
}

const fn level_name(level: Level) -> &'static str {
    match level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

#[cfg(feature = "otlp")]
fn current_otel_ids() -> Option<(String, String)> {
    use opentelemetry::trace::TraceContextExt;
    use tracing_opentelemetry::OpenTelemetrySpanExt;

    let context = tracing::Span::current().context();
    let span = context.span();
    let span_context = span.span_context();
    span_context
        .is_valid()
        .then(|| (span_context.trace_id().to_string(), span_context.span_id().to_string()))
}

/// Scalars keep their JSON type, everything else is stringified through `Debug`.
struct FieldCollector<'a>(&'a mut Map<String, Value>);

impl Visit for FieldCollector<'_> {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().into(), value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().into(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().into(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().into(), value.into());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().into(), value.into());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.0.insert(field.name().into(), value.to_string().into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().into(), format!("{value:?}").into());
    }
}

/// Access log fields derived from a request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessLogFields {
    pub client_addr: String,
    pub request_line: String,
    pub status_code: String,
}

/// Builds `request_line` (`GET /path HTTP/1.1`) and `status_code` (`404 Not Found`).
///
/// Unknown status codes keep an empty phrase (`"799 "`).
#[must_use]
pub fn access_log_fields(
    client_addr: &str,
    method: &str,
    full_path: &str,
    http_version: &str,
    status: u16,
) -> AccessLogFields {
    let phrase = http::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or_default();

    AccessLogFields {
        client_addr: client_addr.to_owned(),
        request_line: format!("{method} {full_path} HTTP/{http_version}"),
        status_code: format!("{status} {phrase}"),
    }
}
