//! Environment driven settings for logging and the OTLP exporters.

use regex::Regex;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::level_filters::LevelFilter;
use yali_core::CoreError;
use yali_core::consts::SERVICE_INST_ID_KEY;
use yali_core::hashes::HashAlgo;
use yali_core::settings::Settings;
use yali_core::sysinfo::id_by_sysinfo;
use yali_core::types::Secret;

const MIN_QUEUE_SIZE: usize = 1_000;
const MIN_LOG_FILE_BYTES: u64 = 1_048_576;
const LOG_ROTATIONS_RANGE: std::ops::RangeInclusive<usize> = 2..=100;
const MIN_EXPORT_INTERVAL_MILLIS: u64 = 1_000;

static RESOURCE_ATTRS_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(concat!(
        r"^service\.name=[a-zA-Z0-9_.-]+",
        r",service\.version=[a-zA-Z0-9_.-]+",
        r",deployment\.environment=[a-zA-Z0-9_.-]+",
        r#"(,[a-zA-Z0-9_.]+=[a-zA-Z0-9_.,%&@'"\[\]-]+)*$"#,
    ))
    .unwrap()
});

/// Log level names as they appear in `LOG_LEVEL`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevelName {
    Critical,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevelName {
    /// The classic numeric severity (`CRITICAL` is 50, `TRACE` is 5).
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Critical => 50,
            Self::Error => 40,
            Self::Warning => 30,
            Self::Info => 20,
            Self::Debug => 10,
            Self::Trace => 5,
        }
    }

    #[must_use]
    pub const fn from_number(number: u64) -> Option<Self> {
        match number {
            50 => Some(Self::Critical),
            40 => Some(Self::Error),
            30 => Some(Self::Warning),
            20 => Some(Self::Info),
            10 => Some(Self::Debug),
            5 => Some(Self::Trace),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    /// `tracing` has no critical level, so `CRITICAL` shares `ERROR`.
    #[must_use]
    pub const fn level_filter(self) -> LevelFilter {
        match self {
            Self::Critical | Self::Error => LevelFilter::ERROR,
            Self::Warning => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }

    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Debug | Self::Trace)
    }
}

impl fmt::Display for LogLevelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevelName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" | "FATAL" => Ok(Self::Critical),
            "ERROR" => Ok(Self::Error),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "INFO" => Ok(Self::Info),
            "DEBUG" => Ok(Self::Debug),
            "TRACE" => Ok(Self::Trace),
            other => Err(CoreError::validation(format!("Unknown log level: {other}"))),
        }
    }
}

impl<'de> Deserialize<'de> for LogLevelName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LevelVisitor;

        impl Visitor<'_> for LevelVisitor {
            type Value = LogLevelName;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a log level name or number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                if let Ok(number) = v.trim().parse::<u64>() {
                    return self.visit_u64(number);
                }
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                LogLevelName::from_number(v)
                    .ok_or_else(|| E::custom(format!("Unknown log level number: {v}")))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v).map_err(E::custom).and_then(|v| self.visit_u64(v))
            }
        }

        deserializer.deserialize_any(LevelVisitor)
    }
}

/// Logging setup read from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    #[serde(rename = "debug", default)]
    pub debug_enabled: bool,
    #[serde(default = "default_logs_root_dir")]
    pub logs_root_dir: PathBuf,
    #[serde(default)]
    pub log_level: LogLevelName,
    /// Hands log lines to a background writer thread instead of writing inline.
    #[serde(default = "default_true")]
    pub enable_mproc_logging: bool,
    #[serde(default = "default_log_queue_size")]
    pub log_queue_size: usize,
    #[serde(default)]
    pub log_to_file: bool,
    #[serde(default = "default_max_log_file_bytes")]
    pub max_log_file_bytes: u64,
    #[serde(default = "default_max_log_rotations")]
    pub max_log_rotations: usize,
    #[serde(default = "default_true")]
    pub log_json: bool,
}

fn default_logs_root_dir() -> PathBuf {
    PathBuf::from("/tmp/logs")
}

const fn default_true() -> bool {
    true
}

const fn default_log_queue_size() -> usize {
    1_000_000
}

const fn default_max_log_file_bytes() -> u64 {
    10_485_760
}

const fn default_max_log_rotations() -> usize {
    10
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            debug_enabled: false,
            logs_root_dir: default_logs_root_dir(),
            log_level: LogLevelName::default(),
            enable_mproc_logging: true,
            log_queue_size: default_log_queue_size(),
            log_to_file: false,
            max_log_file_bytes: default_max_log_file_bytes(),
            max_log_rotations: default_max_log_rotations(),
            log_json: true,
        }
    }
}

impl LogSettings {
    /// `DEBUG`/`TRACE` stay as configured; other levels drop to `DEBUG` when debugging is on.
    #[must_use]
    pub const fn effective_level(&self) -> LogLevelName {
        if self.log_level.is_verbose() {
            self.log_level
        } else if self.debug_enabled {
            LogLevelName::Debug
        } else {
            self.log_level
        }
    }
}

impl Settings for LogSettings {
    fn validate(&mut self) -> Result<(), CoreError> {
        if self.log_queue_size < MIN_QUEUE_SIZE {
            return Err(CoreError::validation(format!(
                "LOG_QUEUE_SIZE must be at least {MIN_QUEUE_SIZE}"
            )));
        }
        if self.max_log_file_bytes < MIN_LOG_FILE_BYTES {
            return Err(CoreError::validation(format!(
                "MAX_LOG_FILE_BYTES must be at least {MIN_LOG_FILE_BYTES}"
            )));
        }
        if !LOG_ROTATIONS_RANGE.contains(&self.max_log_rotations) {
            return Err(CoreError::validation(format!(
                "MAX_LOG_ROTATIONS must be within {LOG_ROTATIONS_RANGE:?}"
            )));
        }
        if self.log_level == LogLevelName::Debug {
            self.debug_enabled = true;
        }
        Ok(())
    }
}

/// OTLP exporter setup read from the standard `OTEL_*` variables.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    /// `key=value` pairs separated by commas, sent as gRPC metadata.
    #[serde(rename = "otel_exporter_otlp_headers")]
    pub headers: Secret,
    #[serde(rename = "otel_exporter_otlp_endpoint")]
    pub endpoint: String,
    #[serde(rename = "otel_resource_attributes")]
    pub resource_attrs: String,
    #[serde(rename = "otel_export_interval_millis", default = "default_export_interval_millis")]
    pub export_interval_millis: u64,
    /// Root certificate (PEM). Enables TLS when set.
    #[serde(rename = "otel_exporter_otlp_certificate", default)]
    pub certificate: Option<PathBuf>,
    #[serde(rename = "otel_exporter_certchain", default)]
    pub certchain: Option<PathBuf>,
    #[serde(rename = "otel_exporter_privkey", default)]
    pub privkey: Option<PathBuf>,
}

const fn default_export_interval_millis() -> u64 {
    5_000
}

impl Settings for TelemetrySettings {
    fn validate(&mut self) -> Result<(), CoreError> {
        match (&self.certchain, &self.privkey) {
            (Some(_), None) => {
                return Err(CoreError::validation(
                    "If OTEL_EXPORTER_CERTCHAIN is set, OTEL_EXPORTER_PRIVKEY must be set as well",
                ));
            },
            (None, Some(_)) => {
                return Err(CoreError::validation(
                    "If OTEL_EXPORTER_PRIVKEY is set, OTEL_EXPORTER_CERTCHAIN must be set as well",
                ));
            },
            _ => {},
        }

        if self.export_interval_millis < MIN_EXPORT_INTERVAL_MILLIS {
            return Err(CoreError::validation(format!(
                "OTEL_EXPORT_INTERVAL_MILLIS must be at least {MIN_EXPORT_INTERVAL_MILLIS}"
            )));
        }

        if self.endpoint.trim().is_empty() {
            return Err(CoreError::validation("OTEL_EXPORTER_OTLP_ENDPOINT cannot be empty"));
        }

        self.resource_attrs = self.resource_attrs.trim().to_lowercase();
        if !RESOURCE_ATTRS_RE.is_match(&self.resource_attrs) {
            return Err(CoreError::validation(format!(
                "Malformed OTEL_RESOURCE_ATTRIBUTES: {}",
                self.resource_attrs
            )));
        }
        Ok(())
    }
}

impl TelemetrySettings {
    /// Resource attributes as a map, with `service.instance.id` filled in from the host.
    ///
    /// Values may contain commas; a segment without `=` continues the previous value.
    #[must_use]
    pub fn resource_attributes(&self) -> BTreeMap<String, String> {
        let mut attrs = BTreeMap::new();
        let mut last_key: Option<String> = None;

        for segment in self.resource_attrs.split(',') {
            match segment.split_once('=') {
                Some((key, value)) => {
                    attrs.insert(key.to_owned(), value.to_owned());
                    last_key = Some(key.to_owned());
                },
                None => {
                    if let Some(value) = last_key.as_ref().and_then(|key| attrs.get_mut(key)) {
                        value.push(',');
                        value.push_str(segment);
                    }
                },
            }
        }

        attrs
            .entry(SERVICE_INST_ID_KEY.to_owned())
            .or_insert_with(|| id_by_sysinfo("", false, HashAlgo::default()));
        attrs
    }

    /// Header pairs for the exporter metadata. Malformed pairs are skipped.
    #[must_use]
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        self.headers
            .expose()
            .split(',')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_owned()))
            .filter(|(k, _)| !k.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yali_core::settings::SettingsLoader;

    const ATTRS: &str = "service.name=Billing,service.version=1.2.0,deployment.environment=prod";

    fn otel_vars(attrs: &str) -> Vec<(&'static str, String)> {
        vec![
            ("OTEL_EXPORTER_OTLP_HEADERS", "Authorization=Bearer abc, x-tenant = t1".to_owned()),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://collector:4317".to_owned()),
            ("OTEL_RESOURCE_ATTRIBUTES", attrs.to_owned()),
        ]
    }

    #[test]
    fn test_level_names_and_aliases() {
        assert_eq!("warn".parse::<LogLevelName>().unwrap(), LogLevelName::Warning);
        assert_eq!("FATAL".parse::<LogLevelName>().unwrap(), LogLevelName::Critical);
        assert_eq!(LogLevelName::from_number(5), Some(LogLevelName::Trace));
        assert_eq!(LogLevelName::Critical.level_filter(), LevelFilter::ERROR);
        assert!("loud".parse::<LogLevelName>().is_err());
    }

    #[test]
    fn test_log_settings_defaults() {
        let settings: LogSettings =
            SettingsLoader::new().vars(Vec::<(String, String)>::new()).load().unwrap();
        assert!(!settings.debug_enabled);
        assert_eq!(settings.logs_root_dir, PathBuf::from("/tmp/logs"));
        assert_eq!(settings.log_level, LogLevelName::Info);
        assert_eq!(settings.log_queue_size, 1_000_000);
        assert_eq!(settings.max_log_file_bytes, 10_485_760);
        assert_eq!(settings.max_log_rotations, 10);
        assert!(settings.enable_mproc_logging);
        assert!(settings.log_json);
        assert_eq!(settings.effective_level(), LogLevelName::Info);
    }

    #[test]
    fn test_debug_level_enables_debugging() {
        let settings: LogSettings =
            SettingsLoader::new().vars([("LOG_LEVEL", "debug")]).load().unwrap();
        assert!(settings.debug_enabled);

        let settings: LogSettings = SettingsLoader::new()
            .vars([("LOG_LEVEL", "WARNING"), ("DEBUG", "true")])
            .load()
            .unwrap();
        assert_eq!(settings.effective_level(), LogLevelName::Debug);

        let settings: LogSettings = SettingsLoader::new()
            .vars([("LOG_LEVEL", "TRACE"), ("DEBUG", "true")])
            .load()
            .unwrap();
        assert_eq!(settings.effective_level(), LogLevelName::Trace);
    }

    #[test]
    fn test_log_settings_bounds() {
        for (key, value) in
            [("LOG_QUEUE_SIZE", "999"), ("MAX_LOG_FILE_BYTES", "1024"), ("MAX_LOG_ROTATIONS", "1")]
        {
            let result = SettingsLoader::new().vars([(key, value)]).load::<LogSettings>();
            assert!(matches!(result, Err(CoreError::Validation { .. })), "{key}={value}");
        }
    }

    #[test]
    fn test_telemetry_settings_parse_attributes() {
        let settings: TelemetrySettings = SettingsLoader::new()
            .vars(otel_vars(&format!("  {ATTRS},team=core,regions=eu,us  ")))
            .load()
            .unwrap();

        assert_eq!(settings.export_interval_millis, 5_000);
        let attrs = settings.resource_attributes();
        assert_eq!(attrs["service.name"], "billing");
        assert_eq!(attrs["team"], "core");
        assert_eq!(attrs["regions"], "eu,us");
        assert!(attrs.contains_key(SERVICE_INST_ID_KEY));

        assert_eq!(
            settings.header_pairs(),
            vec![
                ("authorization".to_owned(), "Bearer abc".to_owned()),
                ("x-tenant".to_owned(), "t1".to_owned())
            ]
        );
    }

    #[test]
    fn test_telemetry_settings_rejects_bad_input() {
        let result = SettingsLoader::new()
            .vars(otel_vars("service.name=billing"))
            .load::<TelemetrySettings>();
        assert!(matches!(result, Err(CoreError::Validation { .. })));

        let mut vars = otel_vars(ATTRS);
        vars.push(("OTEL_EXPORTER_CERTCHAIN", "/etc/certs/chain.pem".to_owned()));
        let result = SettingsLoader::new().vars(vars).load::<TelemetrySettings>();
        assert!(matches!(result, Err(CoreError::Validation { .. })));

        let result =
            SettingsLoader::new().vars([("OTEL_EXPORTER_OTLP_ENDPOINT", "x")]).load::<TelemetrySettings>();
        assert!(matches!(result, Err(CoreError::Config { .. })));
    }
}
