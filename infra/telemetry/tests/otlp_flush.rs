#![cfg(feature = "otlp")]

use yali_core::settings::SettingsLoader;
use yali_telemetry::{LevelFilter, Logger, Telemetry, TelemetrySettings};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn logger_flush_reaches_attached_telemetry() -> Result<(), Box<dyn std::error::Error>> {
    let settings: TelemetrySettings = SettingsLoader::new()
        .vars([
            ("OTEL_EXPORTER_OTLP_HEADERS", "x-team=orders"),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://127.0.0.1:4317"),
            ("OTEL_RESOURCE_ATTRIBUTES", "service.name=orders,deployment.environment=test"),
        ])
        .load()?;
    let telemetry = Telemetry::init(&settings)?;

    let logger = Logger::builder()
        .name("orders")
        .console(false)
        .opentelemetry(&telemetry)
        .level(LevelFilter::INFO)
        .init()?;
    assert!(logger.telemetry().is_some());

    {
        let span = tracing::info_span!("checkout", order_id = 7);
        let _entered = span.enter();
        tracing::info!("inside span");
    }
    logger.flush();
    assert!(!telemetry.is_stopped());

    telemetry.shutdown();
    logger.flush();
    assert!(logger.telemetry().is_some_and(Telemetry::is_stopped));
    Ok(())
}
