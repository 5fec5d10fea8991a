use crate::error::{TelemetryError, TelemetryErrorExt};
use crate::settings::TelemetrySettings;
use fxhash::FxHashMap;
use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{InstrumentationScope, KeyValue, global};
use opentelemetry_otlp::{WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tonic::metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue};
use tonic::transport::{Certificate, ClientTlsConfig, Identity};
use tracing::{debug, warn};

/// Owns the OTLP tracer and meter providers installed as the global providers.
///
/// Both providers are flushed and shut down on [`Telemetry::shutdown`] or when the last
/// clone is dropped.
#[derive(Debug, Clone)]
pub struct Telemetry {
    inner: Arc<Inner>,
}

struct Inner {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
    tracers: Mutex<FxHashMap<String, SdkTracer>>,
    meters: Mutex<FxHashMap<String, Meter>>,
    stopped: AtomicBool,
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("tracers", &self.tracers.lock().len())
            .field("meters", &self.meters.lock().len())
            .field("stopped", &self.stopped.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Telemetry {
    /// Builds the gRPC span and metric exporters and installs both providers globally.
    ///
    /// Must be called from within a Tokio runtime. The exporters use TLS when a root
    /// certificate is configured, with a client identity when the cert chain and key are set.
    ///
    /// # Examples
    /// ```rust,no_run
    /// use yali_core::settings::Settings;
    /// use yali_telemetry::{Telemetry, TelemetrySettings};
    ///
    /// # #[tokio::main] async fn main() -> Result<(), yali_telemetry::TelemetryError> {
    /// let settings = TelemetrySettings::from_env()?;
    /// let telemetry = Telemetry::init(&settings)?;
    /// let _tracer = telemetry.tracer("billing", Some("1.0.0"));
    /// # Ok(()) }
    /// ```
    pub fn init(settings: &TelemetrySettings) -> Result<Self, TelemetryError> {
        let metadata = metadata_from(settings)?;
        let tls = tls_config(settings)?;
        let resource = Resource::builder_empty()
            .with_attributes(
                settings.resource_attributes().into_iter().map(|(k, v)| KeyValue::new(k, v)),
            )
            .build();

        let mut span_exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(settings.endpoint.clone())
            .with_metadata(metadata.clone());
        if let Some(tls) = tls.clone() {
            span_exporter = span_exporter.with_tls_config(tls);
        }
        let span_exporter = span_exporter.build().context("Failed to build OTLP span exporter")?;

        let mut metric_exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(settings.endpoint.clone())
            .with_metadata(metadata);
        if let Some(tls) = tls {
            metric_exporter = metric_exporter.with_tls_config(tls);
        }
        let metric_exporter =
            metric_exporter.build().context("Failed to build OTLP metric exporter")?;

        let tracer_provider = SdkTracerProvider::builder()
            .with_batch_exporter(span_exporter)
            .with_resource(resource.clone())
            .build();

        let reader = PeriodicReader::builder(metric_exporter)
            .with_interval(Duration::from_millis(settings.export_interval_millis))
            .build();
        let meter_provider =
            SdkMeterProvider::builder().with_reader(reader).with_resource(resource).build();

        global::set_tracer_provider(tracer_provider.clone());
        global::set_meter_provider(meter_provider.clone());
        debug!(endpoint = %settings.endpoint, "OpenTelemetry providers installed");

        Ok(Self {
            inner: Arc::new(Inner {
                tracer_provider,
                meter_provider,
                tracers: Mutex::new(FxHashMap::default()),
                meters: Mutex::new(FxHashMap::default()),
                stopped: AtomicBool::new(false),
            }),
        })
    }

    /// A tracer for `module`, cached per `module|version`.
    #[must_use]
    pub fn tracer(&self, module: &str, version: Option<&str>) -> SdkTracer {
        let key = cache_key(module, version);
        self.inner
            .tracers
            .lock()
            .entry(key)
            .or_insert_with(|| self.inner.tracer_provider.tracer_with_scope(scope(module, version)))
            .clone()
    }

    /// A meter for `name`, cached per `name|version`.
    #[must_use]
    pub fn meter(&self, name: &str, version: Option<&str>) -> Meter {
        let key = cache_key(name, version);
        self.inner
            .meters
            .lock()
            .entry(key)
            .or_insert_with(|| self.inner.meter_provider.meter_with_scope(scope(name, version)))
            .clone()
    }

    /// Exports pending spans and metrics, keeping both providers running.
    pub fn force_flush(&self) {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.inner.tracer_provider.force_flush() {
            warn!(error = %e, "Failed to flush the tracer provider");
        }
        if let Err(e) = self.inner.meter_provider.force_flush() {
            warn!(error = %e, "Failed to flush the meter provider");
        }
    }

    /// Flushes pending spans and metrics and stops both providers.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl Inner {
    fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.tracer_provider.shutdown() {
            warn!(error = %e, "Failed to shut down the tracer provider");
        }
        if let Err(e) = self.meter_provider.shutdown() {
            warn!(error = %e, "Failed to shut down the meter provider");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn cache_key(name: &str, version: Option<&str>) -> String {
    match version.filter(|v| !v.is_empty()) {
        Some(version) => format!("{name}|{version}"),
        None => name.to_owned(),
    }
}

fn scope(name: &str, version: Option<&str>) -> InstrumentationScope {
    let builder = InstrumentationScope::builder(name.to_owned());
    match version.filter(|v| !v.is_empty()) {
        Some(version) => builder.with_version(version.to_owned()).build(),
        None => builder.build(),
    }
}

fn metadata_from(settings: &TelemetrySettings) -> Result<MetadataMap, TelemetryError> {
    let mut metadata = MetadataMap::new();
    for (key, value) in settings.header_pairs() {
        let name: MetadataKey<Ascii> = MetadataKey::from_bytes(key.as_bytes())
            .map_err(|e| TelemetryError::invalid(format!("Invalid OTLP header '{key}': {e}")))?;
        let value: MetadataValue<Ascii> = MetadataValue::try_from(value.as_str())
            .map_err(|e| TelemetryError::invalid(format!("Invalid OTLP header '{key}' value: {e}")))?;
        metadata.insert(name, value);
    }
    Ok(metadata)
}

fn tls_config(settings: &TelemetrySettings) -> Result<Option<ClientTlsConfig>, TelemetryError> {
    let Some(ca_path) = &settings.certificate else {
        return Ok(None);
    };
    let ca = std::fs::read(ca_path).context(format!("Failed to read {}", ca_path.display()))?;
    let mut tls = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(ca));

    if let (Some(chain_path), Some(key_path)) = (&settings.certchain, &settings.privkey) {
        let chain =
            std::fs::read(chain_path).context(format!("Failed to read {}", chain_path.display()))?;
        let key = std::fs::read(key_path).context(format!("Failed to read {}", key_path.display()))?;
        tls = tls.identity(Identity::from_pem(chain, key));
    }
    Ok(Some(tls))
}
