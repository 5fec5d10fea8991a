use std::fs;
use tempfile::tempdir;
use yali_core::settings::SettingsLoader;
use yali_core::sysinfo::filename_by_sysinfo;
use yali_telemetry::{LogSettings, Logger, TelemetryError};

fn file_settings(root: &std::path::Path) -> Result<LogSettings, Box<dyn std::error::Error>> {
    Ok(SettingsLoader::new()
        .vars([
            ("LOG_TO_FILE", "true"),
            ("LOG_LEVEL", "INFO"),
            ("ENABLE_MPROC_LOGGING", "false"),
            ("LOGS_ROOT_DIR", root.to_str().expect("utf-8 temp path")),
        ])
        .load()?)
}

#[test]
fn second_settings_init_fails_and_keeps_first_file() -> Result<(), Box<dyn std::error::Error>> {
    let tmp_dir = tempdir()?;
    let first_root = tmp_dir.path().join("first");
    let second_root = tmp_dir.path().join("second");

    let logger = Logger::from_settings("Orders", &file_settings(&first_root)?)?;

    let err = Logger::from_settings("Orders Replica", &file_settings(&second_root)?)
        .expect_err("a global subscriber is already installed");
    assert!(matches!(err, TelemetryError::Subscriber { .. }), "{err}");

    tracing::info!(batch = 3, "still routed to the first logger");
    logger.flush();

    let first = fs::read_to_string(first_root.join(filename_by_sysinfo("orders", ".log")))?;
    assert!(first.contains("still routed to the first logger"), "{first}");
    assert!(!second_root.join(filename_by_sysinfo("orders-replica", ".log")).exists());

    Ok(())
}
