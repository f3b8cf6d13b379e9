//! Test logging infrastructure for structured test output and debugging.
#![allow(dead_code)]
//!
//! Provides a `TestLogger` that prints phase-tagged progress lines to stderr
//! with per-test durations. Output is shown by `cargo test -- --nocapture`.
//!
//! # Environment Variables
//!
//! - `TEST_LOG_LEVEL` - Set log level: trace, debug, info, warn, error (default: info)
//! - `TEST_LOG_JSON` - Set to "1" or "true" for JSON lines

use std::env;
use std::fmt::Display;
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::log_capture::TestLogCapture;

/// Log severity levels matching standard conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "err" => Some(Self::Error),
            _ => None,
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

/// Structured log entry for JSON output mode.
#[derive(Debug, Serialize)]
struct LogEntry<'a> {
    timestamp: DateTime<Utc>,
    level: LogLevel,
    test: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phase: Option<&'a str>,
    elapsed_ms: u64,
}

struct Settings {
    min_level: LogLevel,
    json: bool,
}

fn settings() -> &'static Settings {
    static SETTINGS: OnceLock<Settings> = OnceLock::new();
    SETTINGS.get_or_init(|| Settings {
        min_level: env::var("TEST_LOG_LEVEL")
            .ok()
            .and_then(|s| LogLevel::parse(&s))
            .unwrap_or(LogLevel::Info),
        json: env::var("TEST_LOG_JSON").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
    })
}

/// Per-test logger with phase tracking.
pub struct TestLogger {
    name: String,
    started: Instant,
    phase: Mutex<Option<String>>,
}

impl TestLogger {
    #[must_use]
    pub fn new(test_name: &str) -> Self {
        let logger = Self {
            name: test_name.to_string(),
            started: Instant::now(),
            phase: Mutex::new(None),
        };
        logger.info("start");
        logger
    }

    /// Logger plus a tracing capture scoped to the current thread.
    #[must_use]
    pub fn with_capture(test_name: &str) -> (Self, TestLogCapture) {
        (Self::new(test_name), TestLogCapture::start())
    }

    pub fn phase(&self, phase: &str) {
        *self.phase.lock().unwrap() = Some(phase.to_string());
        self.debug(&format!("phase: {phase}"));
    }

    pub fn rpc_batch(&self, method: &str, count: usize) {
        self.debug(&format!("rpc batch: {method} x{count}"));
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn finish_ok(&self) {
        self.info(&format!("ok in {}ms", self.elapsed_ms()));
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn log(&self, level: LogLevel, message: &str) {
        let settings = settings();
        if level < settings.min_level {
            return;
        }
        let phase = self.phase.lock().unwrap().clone();
        if settings.json {
            let entry = LogEntry {
                timestamp: Utc::now(),
                level,
                test: &self.name,
                message,
                phase: phase.as_deref(),
                elapsed_ms: self.elapsed_ms(),
            };
            if let Ok(line) = serde_json::to_string(&entry) {
                eprintln!("{line}");
            }
        } else {
            let phase = phase.map(|p| format!("[{p}] ")).unwrap_or_default();
            eprintln!("{level:<5} {} {phase}{message}", self.name);
        }
    }
}
