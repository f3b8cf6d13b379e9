//! realm-assets - governed-asset discovery for SPL Governance realms.
//!
//! Discovers every account a realm's governances control (token holdings,
//! NFTs, native treasury balances, stake accounts, mints, upgradeable
//! programs), classifies them, and publishes progressive snapshots through
//! an observable store. A CLI scans a realm from the command line.

// Note: deny (not forbid) to allow #[allow(unsafe_code)] in test helpers for env var manipulation
#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod core;
pub mod error;
pub mod render;
pub mod storage;

/// Test utilities module - included in test builds or when test-utils feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{AssetError, ExitCode, Result};

// Re-export test utilities for external test crates
#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::*;
