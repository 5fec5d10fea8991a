use crate::error::{TelemetryError, TelemetryErrorExt};
use crate::format::JsonLogFormatter;
use crate::rotation::SizeRotatingFile;
use crate::settings::LogSettings;
#[cfg(feature = "otlp")]
use crate::otlp::Telemetry;
use private::Sealed;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::{MakeWriter, layer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use yali_core::osfiles::FilesConv;
use yali_core::strings::lower_with_hyphens;
use yali_core::sysinfo::filename_by_sysinfo;

pub use tracing::level_filters::LevelFilter;

const DEFAULT_MAX_FILES: usize = 10;
const DEFAULT_QUEUE_SIZE: usize = 1_000_000;
const LOG_FILE_SUFFIX: &str = "log";
const WRITER_THREAD_NAME: &str = "yali-log-writer";

/// How log files roll over.
#[derive(Debug, Clone)]
pub enum FileRotation {
    /// Roll when the file would grow past `max_bytes`, keeping `max_backups` old files.
    Size { max_bytes: u64, max_backups: usize },
    /// Roll on a time schedule, keeping at most `max_files` files.
    Time(Rotation),
}

impl Default for FileRotation {
    fn default() -> Self {
        Self::Time(Rotation::DAILY)
    }
}

#[derive(Debug)]
pub struct LoggerConfig {
    console: bool,
    path: Option<PathBuf>,
    file_name: Option<String>,
    level: LevelFilter,
    rotation: FileRotation,
    max_files: usize,
    json: bool,
    queue_size: usize,
    blocking: bool,
    env_filter: Option<String>,
    #[cfg(feature = "otlp")]
    telemetry: Option<Telemetry>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            console: true,
            path: None,
            file_name: None,
            level: LevelFilter::INFO,
            rotation: FileRotation::default(),
            max_files: DEFAULT_MAX_FILES,
            json: false,
            queue_size: DEFAULT_QUEUE_SIZE,
            blocking: false,
            env_filter: None,
            #[cfg(feature = "otlp")]
            telemetry: None,
        }
    }
}

#[derive(Debug)]
pub struct NoName;
#[derive(Debug)]
pub struct WithName(String);
#[derive(Debug)]
pub struct NoFile;
#[derive(Debug)]
pub struct WithFile;

mod private {
    pub trait Sealed {}
}
impl Sealed for NoName {}
impl Sealed for WithName {}
impl Sealed for NoFile {}
impl Sealed for WithFile {}

/// A builder for configuring and initializing the global tracing subscriber.
#[derive(Debug)]
pub struct LoggerBuilder<N: Sealed = NoName, F: Sealed = NoFile> {
    config: LoggerConfig,
    name: N,
    file_state: std::marker::PhantomData<F>,
}

impl<F: Sealed> LoggerBuilder<NoName, F> {
    /// Sets the name of the logger, normalised to lower case with hyphens.
    pub fn name(self, name: impl AsRef<str>) -> LoggerBuilder<WithName, F> {
        LoggerBuilder {
            name: WithName(lower_with_hyphens(name.as_ref().trim())),
            config: self.config,
            file_state: std::marker::PhantomData,
        }
    }
}

impl LoggerBuilder<WithName, WithFile> {
    /// Configures maximum number of log files to keep for time based rotation.
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub const fn max_files(mut self, max: usize) -> Self {
        self.config.max_files = max;
        self
    }

    /// Configures the log file rotation strategy.
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub fn rotation(mut self, rotation: FileRotation) -> Self {
        self.config.rotation = rotation;
        self
    }

    /// Overrides the log file name. Defaults to `<name>.log`.
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.config.file_name = Some(file_name.into());
        self
    }

    /// Bounds the number of lines buffered for the background writer.
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub const fn queue_size(mut self, size: usize) -> Self {
        self.config.queue_size = size;
        self
    }

    /// Writes file output on the logging thread instead of the background writer.
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub const fn blocking(mut self, enabled: bool) -> Self {
        self.config.blocking = enabled;
        self
    }
}

impl<F: Sealed> LoggerBuilder<WithName, F> {
    /// Configures the minimum log level to be emitted.
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub const fn level(mut self, level: LevelFilter) -> Self {
        self.config.level = level;
        self
    }

    /// Adds an explicit env filter (e.g., `myapp=debug,hyper=info`).
    ///
    /// Without it, `RUST_LOG` is honoured. Invalid filters will cause
    /// [`LoggerBuilder::init`] to return an error.
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub fn env_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.env_filter = Some(filter.into());
        self
    }

    /// Enables console logging.
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub const fn console(mut self, enabled: bool) -> Self {
        self.config.console = enabled;
        self
    }

    /// Emits one JSON object per line, see [`JsonLogFormatter`].
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub const fn json(mut self, enabled: bool) -> Self {
        self.config.json = enabled;
        self
    }

    /// Attaches a `tracing-opentelemetry` layer backed by the global tracer that
    /// `telemetry` installed. [`Logger::flush`] then flushes its providers too.
    #[cfg(feature = "otlp")]
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub fn opentelemetry(mut self, telemetry: &Telemetry) -> Self {
        self.config.telemetry = Some(telemetry.clone());
        self
    }

    /// Sets the directory of log files.
    pub fn path(self, path: impl Into<PathBuf>) -> LoggerBuilder<WithName, WithFile> {
        let mut config = self.config;
        config.path = Some(path.into());
        LoggerBuilder { config, name: self.name, file_state: std::marker::PhantomData }
    }

    /// Consumes the builder and initializes the global tracing subscriber.
    ///
    /// # Returns
    /// A [`Logger`] handle. **Note:** This handle contains a [`WorkerGuard`]
    /// that must be kept alive for the duration of the program to ensure
    /// that non-blocking logs are flushed correctly.
    ///
    /// # Errors
    /// Returns [`TelemetryError::Subscriber`] if a global subscriber has already been set.
    /// Returns [`TelemetryError::InvalidConfiguration`] for invalid builder settings.
    pub fn init(self) -> Result<Logger, TelemetryError> {
        validate_config(&self.config, &self.name.0)?;

        let env_filter = build_env_filter(&self.config)?;
        let verbose = self.config.level >= LevelFilter::DEBUG;

        let mut layers = Vec::new();

        if self.config.console {
            layers.push(fmt_layer(std::io::stdout, self.config.json, verbose, true));
        }

        #[cfg(feature = "otlp")]
        if self.config.telemetry.is_some() {
            let tracer = opentelemetry::global::tracer(self.name.0.clone());
            layers.push(tracing_opentelemetry::layer().with_tracer(tracer).boxed());
        }

        let guard = if let Some(dir) = &self.config.path {
            let (writer, guard) = file_writer(&self.config, dir, &self.name.0)?;
            layers.push(fmt_layer(writer, self.config.json, verbose, false));
            guard
        } else {
            None
        };

        if layers.is_empty() {
            return Err(TelemetryError::invalid(
                "No logging layers enabled. Enable console, file output, or OpenTelemetry.",
            ));
        }

        tracing_subscriber::registry().with(env_filter).with(layers).try_init()?;

        Ok(Logger {
            name: self.name.0,
            level: self.config.level,
            guard,
            #[cfg(feature = "otlp")]
            telemetry: self.config.telemetry,
        })
    }
}

fn fmt_layer<S, W>(writer: W, json: bool, verbose: bool, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let base = layer().with_writer(writer);
    if json {
        base.with_ansi(false).event_format(JsonLogFormatter::new(verbose)).boxed()
    } else {
        base.with_ansi(ansi).compact().boxed()
    }
}

fn file_writer(
    config: &LoggerConfig,
    dir: &Path,
    name: &str,
) -> Result<(BoxMakeWriter, Option<WorkerGuard>), TelemetryError> {
    std::fs::create_dir_all(dir).context(format!("Failed to create path: {}", dir.display()))?;

    let file_name = config.file_name.clone().unwrap_or_else(|| format!("{name}.{LOG_FILE_SUFFIX}"));

    match &config.rotation {
        FileRotation::Size { max_bytes, max_backups } => {
            let file = SizeRotatingFile::new(dir.join(&file_name), *max_bytes, *max_backups)
                .context(format!("Failed to open log file {file_name}"))?;
            Ok(into_make_writer(file, config))
        },
        FileRotation::Time(rotation) => {
            let prefix = Path::new(&file_name)
                .file_stem()
                .map_or_else(|| name.to_owned(), |stem| stem.to_string_lossy().into_owned());
            let appender = RollingFileAppender::builder()
                .rotation(rotation.clone())
                .filename_prefix(prefix)
                .filename_suffix(LOG_FILE_SUFFIX)
                .max_log_files(config.max_files)
                .build(dir)?;
            Ok(into_make_writer(appender, config))
        },
    }
}

fn into_make_writer<W>(writer: W, config: &LoggerConfig) -> (BoxMakeWriter, Option<WorkerGuard>)
where
    W: Write + Send + 'static,
{
    if config.blocking {
        return (BoxMakeWriter::new(Mutex::new(writer)), None);
    }
    let (non_blocking, guard) = NonBlockingBuilder::default()
        .buffered_lines_limit(config.queue_size)
        .lossy(false)
        .thread_name(WRITER_THREAD_NAME)
        .finish(writer);
    (BoxMakeWriter::new(non_blocking), Some(guard))
}

/// A handle to the initialized logging system.
///
/// This struct holds the background worker guards. Drop this struct only
/// when the application is shutting down.
#[must_use = "Dropping this handle will stop background logging threads."]
#[derive(Debug)]
pub struct Logger {
    name: String,
    level: LevelFilter,
    guard: Option<WorkerGuard>,
    #[cfg(feature = "otlp")]
    telemetry: Option<Telemetry>,
}

impl Logger {
    /// Returns a new [`LoggerBuilder`] to configure the global tracing subscriber.
    ///
    /// The `name` serves as the primary identifier for your logs and is used
    /// as the default log file name (e.g., `my-app.log`).
    ///
    /// # Example
    ///
    /// ```rust
    /// use yali_telemetry::{LevelFilter, Logger};
    ///
    /// let _logger = Logger::builder()
    ///     .name("my-app")
    ///     .level(LevelFilter::DEBUG)
    ///     .init()
    ///     .unwrap();
    /// ```
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder {
            config: LoggerConfig::default(),
            name: NoName,
            file_state: std::marker::PhantomData,
        }
    }

    /// Installs the default setup described by `settings`.
    ///
    /// Console output is always on. With `LOG_TO_FILE`, a size rotated file named after the
    /// host fingerprint is written to `LOGS_ROOT_DIR`, or to the working directory when that
    /// one is not writable.
    pub fn from_settings(name: &str, settings: &LogSettings) -> Result<Self, TelemetryError> {
        let builder = Self::builder()
            .name(name)
            .console(true)
            .json(settings.log_json)
            .level(settings.effective_level().level_filter());

        if !settings.log_to_file {
            return builder.init();
        }

        let dir = logs_dir(&settings.logs_root_dir)?;
        let file_name = filename_by_sysinfo(&builder.name.0, ".log");
        builder
            .path(dir)
            .file_name(file_name)
            .rotation(FileRotation::Size {
                max_bytes: settings.max_log_file_bytes,
                max_backups: settings.max_log_rotations,
            })
            .queue_size(settings.log_queue_size)
            .blocking(!settings.enable_mproc_logging)
            .init()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn level(&self) -> LevelFilter {
        self.level
    }

    /// Exports the spans and metrics pending in the attached [`Telemetry`], if any.
    ///
    /// The non-blocking file worker has no flush of its own: it drains when this
    /// handle is dropped. Blocking file output is unbuffered.
    pub fn flush(&self) {
        #[cfg(feature = "otlp")]
        if let Some(telemetry) = &self.telemetry {
            telemetry.force_flush();
        }
        tracing::debug!(logger = %self.name, "Logger flushed");
    }

    /// The telemetry handle given to [`LoggerBuilder::opentelemetry`].
    #[cfg(feature = "otlp")]
    #[must_use]
    pub const fn telemetry(&self) -> Option<&Telemetry> {
        self.telemetry.as_ref()
    }

    /// Returns a reference to the underlying worker guard, if present.
    #[must_use]
    pub const fn guard(&self) -> Option<&WorkerGuard> {
        self.guard.as_ref()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        if self.guard.is_some() {
            tracing::info!("Logging system shutting down, flushing buffers...");
        }
    }
}

fn logs_dir(root: &Path) -> Result<PathBuf, TelemetryError> {
    if FilesConv::is_dir_writable(root, true) {
        return Ok(root.to_path_buf());
    }
    tracing::warn!(dir = %root.display(), "Logs directory is not writable, using the working directory");
    std::env::current_dir().context("Failed to resolve the working directory")
}

fn validate_config(config: &LoggerConfig, name: &str) -> Result<(), TelemetryError> {
    if name.is_empty() {
        return Err(TelemetryError::invalid("Logger name cannot be empty"));
    }

    if config.max_files == 0 {
        return Err(TelemetryError::invalid("max_files must be greater than zero"));
    }

    if config.queue_size == 0 {
        return Err(TelemetryError::invalid("queue_size must be greater than zero"));
    }

    Ok(())
}

fn build_env_filter(config: &LoggerConfig) -> Result<EnvFilter, TelemetryError> {
    let builder = EnvFilter::builder().with_default_directive(config.level.into());
    config.env_filter.as_ref().map_or_else(
        || Ok(builder.from_env_lossy()),
        |filter| {
            builder.parse(filter).map_err(|e| {
                TelemetryError::invalid(format!("Invalid env filter '{filter}': {e}"))
            })
        },
    )
}
