//! Error rendering for human and robot modes.

use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::error::AssetError;

/// Render an error for stderr in the requested format.
#[must_use]
pub fn render_error(error: &AssetError, format: OutputFormat, pretty: bool) -> String {
    match format {
        OutputFormat::Json => render_error_json(error, pretty),
        OutputFormat::Human => render_simple(error),
    }
}

/// Render error as structured JSON for machine consumption.
#[must_use]
pub fn render_error_json(error: &AssetError, pretty: bool) -> String {
    let error_json = ErrorJson::from_error(error);
    let rendered = if pretty {
        serde_json::to_string_pretty(&error_json)
    } else {
        serde_json::to_string(&error_json)
    };
    rendered.unwrap_or_else(|_| render_simple(error))
}

fn render_simple(error: &AssetError) -> String {
    let mut lines = vec![format!("Error [{}]: {}", error.error_code(), error)];
    if let Some(hint) = hint(error) {
        lines.push(format!("Hint: {hint}"));
    }
    lines.join("\n")
}

/// One-line remedy for errors a user can fix locally.
const fn hint(error: &AssetError) -> Option<&'static str> {
    match error {
        AssetError::AuthFailed { .. } => Some("check the API key in the RPC URL or pass --rpc-url"),
        AssetError::RateLimited { .. } => Some("lower --rps or use a dedicated RPC endpoint"),
        AssetError::Timeout(_) => Some("raise --timeout or try another endpoint"),
        AssetError::ConfigParse { .. } | AssetError::ConfigInvalid { .. } => {
            Some("fix the config file or unset REALM_ASSETS_CONFIG")
        }
        _ => None,
    }
}

// =============================================================================
// JSON Rendering
// =============================================================================

/// JSON representation of an error for machine consumption.
#[derive(Serialize)]
struct ErrorJson {
    error_code: &'static str,
    category: String,
    message: String,
    is_retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'static str>,
}

impl ErrorJson {
    fn from_error(error: &AssetError) -> Self {
        Self {
            error_code: error.error_code(),
            category: error.category().to_string(),
            message: error.to_string(),
            is_retryable: error.is_retryable(),
            retry_after_seconds: error.retry_after().map(|d| d.as_secs()),
            hint: hint(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_contains;

    #[test]
    fn human_error_has_code_and_hint() {
        let err = AssetError::AuthFailed {
            status: 401,
            endpoint: "https://rpc.example.com".to_string(),
        };
        let output = render_error(&err, OutputFormat::Human, false);
        assert_contains!(&output, "Error [RA-A001]");
        assert_contains!(&output, "Hint:");
    }

    #[test]
    fn json_error_is_structured() {
        let err = AssetError::MissingAccount {
            address: "abc".to_string(),
        };
        let output = render_error(&err, OutputFormat::Json, false);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["error_code"], "RA-D001");
        assert_eq!(value["is_retryable"], false);
        assert!(value.get("hint").is_none());
    }
}
