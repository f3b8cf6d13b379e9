//! Error types for realm-assets.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Errors are categorized into six main categories:
//! - **Authentication**: The RPC provider rejected the credentials (401/403)
//! - **Network**: Connection, timeout, or transient HTTP failures
//! - **Configuration**: Config file parsing, validation, or missing values
//! - **Rpc**: Rate limits and JSON-RPC level errors returned by the node
//! - **Data**: Account data that is missing or does not match its layout
//! - **Internal**: Unexpected errors, bugs, or unclassified issues
//!
//! Each error has a stable error code (e.g., `RA-A001`) for programmatic handling.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Credential failures reported by the RPC provider.
    Authentication,
    /// Network issues (timeout, connection refused, 5xx).
    Network,
    /// Configuration issues (parse errors, invalid values).
    Configuration,
    /// JSON-RPC errors and rate limiting.
    Rpc,
    /// Missing or malformed on-chain account data.
    Data,
    /// Internal errors (bugs, unexpected state, unclassified).
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Authentication => "Authentication error",
            Self::Network => "Network error",
            Self::Configuration => "Configuration error",
            Self::Rpc => "RPC error",
            Self::Data => "Account data error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Authentication => "A",
            Self::Network => "N",
            Self::Configuration => "C",
            Self::Rpc => "R",
            Self::Data => "D",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// Credentials rejected by the RPC endpoint
    AuthFailure = 2,
    /// Parse/config errors, invalid addresses
    ParseError = 3,
    /// Timeout
    Timeout = 4,
    /// Scan finished but some data could not be loaded
    PartialResult = 5,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

/// Main error type for realm-assets operations.
#[derive(Error, Debug)]
pub enum AssetError {
    // ==========================================================================
    // Authentication errors
    // ==========================================================================
    /// The RPC endpoint rejected the request credentials.
    #[error("authentication failed with status {status}; check the API key configured on {endpoint}")]
    AuthFailed { status: u16, endpoint: String },

    // ==========================================================================
    // Network errors
    // ==========================================================================
    /// Request timed out after specified duration.
    #[error("request timeout after {0}s")]
    Timeout(u64),

    /// Non-success HTTP status other than auth and rate limiting.
    #[error("HTTP {status} from RPC endpoint: {message}")]
    HttpStatus { status: u16, message: String },

    /// Generic transport failure.
    #[error("network error: {0}")]
    Network(String),

    // ==========================================================================
    // RPC errors
    // ==========================================================================
    /// Provider answered with HTTP 429.
    #[error("rate limited by RPC endpoint: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    /// JSON-RPC error object returned by the node.
    #[error("RPC error {code} in {method}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    /// Response body did not have the expected JSON-RPC shape.
    #[error("failed to parse RPC response: {0}")]
    ParseResponse(String),

    // ==========================================================================
    // Data errors
    // ==========================================================================
    /// An account that must exist was returned as null.
    #[error("missing account data for {address}")]
    MissingAccount { address: String },

    /// Account data does not match the expected layout.
    #[error("invalid account data for {address}: {reason}")]
    InvalidAccountData { address: String, reason: String },

    /// Text that is not a valid base58 32-byte address.
    #[error("invalid address '{0}'")]
    InvalidPubkey(String),

    // ==========================================================================
    // Configuration errors
    // ==========================================================================
    /// Error parsing configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// Invalid value in configuration.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid {
        key: String,
        value: String,
        message: String,
    },

    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    // ==========================================================================
    // Partial failure
    // ==========================================================================
    /// The scan finished but some steps or chunks were dropped.
    #[error("partial result: {failed} step(s) failed, {dropped} chunk(s) dropped")]
    PartialResult { failed: usize, dropped: usize },

    // ==========================================================================
    // Internal errors
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AssetError {
    /// Map error to a process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::AuthFailed { .. } => ExitCode::AuthFailure,

            Self::Config(_)
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::InvalidPubkey(_)
            | Self::ParseResponse(_) => ExitCode::ParseError,

            Self::Timeout(_) => ExitCode::Timeout,

            Self::PartialResult { .. } => ExitCode::PartialResult,

            Self::HttpStatus { .. }
            | Self::Network(_)
            | Self::RateLimited { .. }
            | Self::Rpc { .. }
            | Self::MissingAccount { .. }
            | Self::InvalidAccountData { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthFailed { .. } => ErrorCategory::Authentication,

            Self::Timeout(_) | Self::HttpStatus { .. } | Self::Network(_) => {
                ErrorCategory::Network
            }

            Self::Config(_) | Self::ConfigParse { .. } | Self::ConfigInvalid { .. } => {
                ErrorCategory::Configuration
            }

            Self::RateLimited { .. }
            | Self::Rpc { .. }
            | Self::ParseResponse(_)
            | Self::PartialResult { .. } => ErrorCategory::Rpc,

            Self::MissingAccount { .. }
            | Self::InvalidAccountData { .. }
            | Self::InvalidPubkey(_) => ErrorCategory::Data,

            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `RA-{category}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::AuthFailed { .. } => "RA-A001",

            Self::Timeout(_) => "RA-N001",
            Self::HttpStatus { .. } => "RA-N002",
            Self::Network(_) => "RA-N099",

            Self::ConfigParse { .. } => "RA-C001",
            Self::ConfigInvalid { .. } => "RA-C002",
            Self::Config(_) => "RA-C003",

            Self::RateLimited { .. } => "RA-R001",
            Self::Rpc { .. } => "RA-R002",
            Self::ParseResponse(_) => "RA-R003",
            Self::PartialResult { .. } => "RA-R030",

            Self::MissingAccount { .. } => "RA-D001",
            Self::InvalidAccountData { .. } => "RA-D002",
            Self::InvalidPubkey(_) => "RA-D003",

            Self::Io(_) => "RA-X001",
            Self::Json(_) => "RA-X002",
            Self::Other(_) => "RA-X099",
        }
    }

    /// Whether the provider asked us to slow down (HTTP 429).
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Whether the provider rejected our credentials. These are never retried.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthFailed { .. })
    }

    /// Returns whether the error is potentially recoverable by retrying later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) | Self::RateLimited { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns the retry-after duration if the provider specified one.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Result type alias for realm-assets operations.
pub type Result<T> = std::result::Result<T, AssetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failure_is_not_retryable() {
        let err = AssetError::AuthFailed {
            status: 401,
            endpoint: "https://rpc.example".to_string(),
        };
        assert!(err.is_auth_failure());
        assert!(!err.is_retryable());
        assert_eq!(err.category(), ErrorCategory::Authentication);
        assert_eq!(err.exit_code(), ExitCode::AuthFailure);
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn rate_limited_is_retryable() {
        let err = AssetError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
            message: "slow down".to_string(),
        };
        assert!(err.is_rate_limited());
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
        assert_eq!(err.error_code(), "RA-R001");
    }

    #[test]
    fn server_errors_are_retryable_client_errors_are_not() {
        let server = AssetError::HttpStatus {
            status: 503,
            message: "unavailable".to_string(),
        };
        let client = AssetError::HttpStatus {
            status: 400,
            message: "bad request".to_string(),
        };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(!server.is_rate_limited());
    }

    #[test]
    fn missing_account_names_the_address() {
        let err = AssetError::MissingAccount {
            address: "So11111111111111111111111111111111111111112".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Data);
        assert!(err.to_string().contains("So1111"));
    }

    #[test]
    fn error_codes_carry_category_prefix() {
        let errors = [
            AssetError::Timeout(30),
            AssetError::Config("x".to_string()),
            AssetError::InvalidPubkey("x".to_string()),
            AssetError::PartialResult {
                failed: 1,
                dropped: 0,
            },
        ];
        for err in &errors {
            let prefix = err.category().code_prefix();
            assert!(
                err.error_code().starts_with(&format!("RA-{prefix}")),
                "{} should start with RA-{prefix}",
                err.error_code()
            );
        }
    }
}
