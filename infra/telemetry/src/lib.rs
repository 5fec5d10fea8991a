//! # Telemetry
//!
//! Logging and OpenTelemetry setup for yali services.
//! It provides a unified way to configure console and file logging with
//! size or time based rotation, non-blocking I/O, JSON lines and
//! environment-based filtering.
//!
//! * [`LogSettings`] and [`TelemetrySettings`] read the usual `LOG_*` and `OTEL_*` variables.
//! * [`Logger::from_settings`] installs the default setup in one call.
//! * With the `otlp` feature (default), [`Telemetry`] installs OTLP tracer and meter
//!   providers, and [`LoggerBuilder::opentelemetry`] bridges `tracing` spans to them.
//! * Use [`LoggerBuilder::env_filter`] to set module-directed filters
//!   (e.g., `"myapp=debug,hyper=info"`), in addition to `RUST_LOG`.
//!
//! ## Example
//!
//! ```rust
//! # use yali_telemetry::{Logger, LevelFilter};
//!
//! let _logger = Logger::builder()
//!     .name("my-app")
//!     .console(true)
//!     .json(true)
//!     .level(LevelFilter::DEBUG)
//!     .init()
//!     .unwrap();
//! ```

mod error;
pub mod filters;
pub mod format;
mod logger;
#[cfg(feature = "otlp")]
mod otlp;
pub mod rotation;
pub mod settings;

pub use crate::error::{TelemetryError, TelemetryErrorExt};
pub use crate::format::{AccessLogFields, JsonLogFormatter, access_log_fields};
pub use crate::logger::{
    FileRotation, LevelFilter, Logger, LoggerBuilder, LoggerConfig, NoFile, NoName, WithFile,
    WithName,
};
#[cfg(feature = "otlp")]
pub use crate::otlp::Telemetry;
pub use crate::rotation::SizeRotatingFile;
pub use crate::settings::{LogLevelName, LogSettings, TelemetrySettings};
pub use tracing_appender::rolling::Rotation;
