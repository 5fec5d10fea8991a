use serde_json::Value;
use std::fs;
use std::time::Duration;
use tempfile::tempdir;
use yali_telemetry::{FileRotation, LevelFilter, Logger};

#[test]
fn file_logging_writes_json_lines() -> Result<(), Box<dyn std::error::Error>> {
    let tmp_dir = tempdir()?;
    let log_dir = tmp_dir.path().join("logs");

    let logger = Logger::builder()
        .name("integration-file-logging")
        .console(false)
        .json(true)
        .path(&log_dir)
        .rotation(FileRotation::Size { max_bytes: 1_048_576, max_backups: 3 })
        .queue_size(1_000)
        .level(LevelFilter::INFO)
        .init()?;

    tracing::info!(order_id = 42, "hello from integration test");

    std::thread::sleep(Duration::from_millis(30));
    drop(logger);

    let content = fs::read_to_string(log_dir.join("integration-file-logging.log"))?;
    let line: Value = serde_json::from_str(content.lines().next().expect("one log line"))?;
    assert_eq!(line["message"], "hello from integration test");
    assert_eq!(line["levelname"], "INFO");
    assert_eq!(line["order_id"], 42);

    Ok(())
}
