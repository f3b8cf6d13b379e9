//! Common test utilities and fixtures for integration tests.
//!
//! # Modules
//!
//! - `fixtures`: Realm fixtures over the in-memory cluster
//! - `log_capture`: Tracing event capture for log assertions
//! - `logger`: Structured test logging infrastructure

pub mod fixtures;
pub mod log_capture;
pub mod logger;
