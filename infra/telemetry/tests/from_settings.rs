use std::fs;
use std::time::Duration;
use tempfile::tempdir;
use yali_core::settings::SettingsLoader;
use yali_core::sysinfo::filename_by_sysinfo;
use yali_telemetry::{LevelFilter, LogSettings, Logger};

#[test]
fn from_settings_writes_rotating_file_under_logs_root() -> Result<(), Box<dyn std::error::Error>> {
    let tmp_dir = tempdir()?;
    let logs_root = tmp_dir.path().join("logs");

    let settings: LogSettings = SettingsLoader::new()
        .vars([
            ("LOG_TO_FILE", "true"),
            ("LOG_LEVEL", "WARN"),
            ("DEBUG", "true"),
            ("LOG_QUEUE_SIZE", "5000"),
            ("ENABLE_MPROC_LOGGING", "false"),
            ("LOGS_ROOT_DIR", logs_root.to_str().expect("utf-8 temp path")),
        ])
        .load()?;

    let logger = Logger::from_settings("Billing Service", &settings)?;
    assert_eq!(logger.name(), "billing-service");
    assert_eq!(logger.level(), LevelFilter::DEBUG);
    assert!(logger.guard().is_none(), "blocking mode has no background writer");

    tracing::debug!("written inline");
    std::thread::sleep(Duration::from_millis(10));

    let log_file = logs_root.join(filename_by_sysinfo("billing-service", ".log"));
    let content = fs::read_to_string(&log_file)?;
    assert!(content.contains("written inline"), "{content}");
    assert!(content.contains("\"lineno\""), "debug level adds source location");

    Ok(())
}
