//! Integration tests for logging format initialization.

use realm_assets::core::logging::{self, LogFormat, LogLevel, LogSettings};

#[test]
fn test_log_format_human() {
    logging::init(&LogSettings {
        level: LogLevel::Debug,
        format: LogFormat::Human,
        file: None,
    });
}

#[test]
fn test_log_format_json() {
    logging::init(&LogSettings {
        level: LogLevel::Debug,
        format: LogFormat::Json,
        file: None,
    });
}

#[test]
fn test_log_to_file() {
    let dir = tempfile::tempdir().unwrap();
    logging::init(&LogSettings {
        level: LogLevel::Info,
        format: LogFormat::Compact,
        file: Some(dir.path().join("scan.log")),
    });
}
