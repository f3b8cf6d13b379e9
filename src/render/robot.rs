//! Robot-mode output (JSON).
//!
//! Provides a stable envelope for scripts and agents.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::aggregator::AggregationReport;
use crate::core::models::{Governance, RealmInfo};
use crate::core::pubkey::Pubkey;
use crate::error::Result;

/// Schema identifier of every envelope.
pub const SCHEMA_VERSION: &str = "realm-assets.v1";

/// Top-level JSON envelope for robot mode output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotOutput<T> {
    pub schema_version: &'static str,
    pub generated_at: DateTime<Utc>,
    pub command: String,
    pub data: T,
    pub errors: Vec<String>,
}

impl<T> RobotOutput<T> {
    /// Create a new robot output envelope.
    pub fn new(command: impl Into<String>, data: T) -> Self {
        Self::with_errors(command, data, Vec::new())
    }

    /// Create with errors.
    pub fn with_errors(command: impl Into<String>, data: T, errors: Vec<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            generated_at: Utc::now(),
            command: command.into(),
            data,
            errors,
        }
    }
}

/// Payload of `scan` and `refresh`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanData<'a> {
    pub realm: &'a RealmInfo,
    pub governances: &'a [Governance],
    #[serde(flatten)]
    pub report: &'a AggregationReport,
}

/// Payload of `treasury-address`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreasuryData {
    pub governance: Pubkey,
    pub program_id: Pubkey,
    pub native_treasury: Pubkey,
}

/// One line per dropped chunk and failed step.
#[must_use]
pub fn report_errors(report: &AggregationReport) -> Vec<String> {
    let failures = report
        .failures
        .iter()
        .map(|f| format!("[{}] {} step failed: {}", f.code, f.step, f.error));
    let warnings = report.warnings.iter().map(|w| {
        format!(
            "{} chunk {} ({} addresses) dropped: {}",
            w.stage,
            w.chunk_index + 1,
            w.addresses.len(),
            w.error
        )
    });
    failures.chain(warnings).collect()
}

/// Render any serializable output as JSON.
pub fn render_json<T: Serialize>(output: &T, pretty: bool) -> Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(output)?)
    } else {
        Ok(serde_json::to_string(output)?)
    }
}

/// Render a scan result.
pub fn render_scan_json(
    command: &str,
    realm: &RealmInfo,
    governances: &[Governance],
    report: &AggregationReport,
    pretty: bool,
) -> Result<String> {
    let data = ScanData {
        realm,
        governances,
        report,
    };
    render_json(&RobotOutput::with_errors(command, data, report_errors(report)), pretty)
}

/// Render a derived treasury address.
pub fn render_treasury_json(data: TreasuryData, pretty: bool) -> Result<String> {
    render_json(&RobotOutput::new("treasury-address", data), pretty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregator::{AggregationStep, StepFailure};
    use crate::core::models::{GovernedAccount, SolBalance};
    use crate::core::resolver::FetchWarning;
    use serde_json::Value;

    fn key(byte: u8) -> Pubkey {
        Pubkey::new_from_array([byte; 32])
    }

    fn realm() -> RealmInfo {
        RealmInfo {
            address: key(1),
            program_id: key(2),
            community_mint: key(3),
            council_mint: None,
        }
    }

    fn report() -> AggregationReport {
        AggregationReport {
            accounts: vec![GovernedAccount::Sol(SolBalance {
                address: key(4),
                governance: key(5),
                lamports: 1_148_400,
                raw_lamports: 2_039_280,
                rent_exempt_minimum: 890_880,
            })],
            warnings: vec![FetchWarning {
                stage: "token_accounts".to_string(),
                chunk_index: 1,
                addresses: vec![key(6), key(7)],
                error: "HTTP 500".to_string(),
            }],
            failures: vec![StepFailure {
                step: AggregationStep::Mints,
                code: "RA-D001",
                error: "account not found".to_string(),
                started_at: Utc::now(),
                duration_ms: 3,
            }],
            prices: Vec::new(),
        }
    }

    #[test]
    fn scan_envelope_has_schema_and_flattened_report() {
        let json = render_scan_json("scan", &realm(), &[], &report(), false).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["schemaVersion"], SCHEMA_VERSION);
        assert_eq!(value["command"], "scan");
        assert_eq!(value["data"]["accounts"][0]["kind"], "sol");
        assert_eq!(value["data"]["accounts"][0]["lamports"], 1_148_400);
        assert_eq!(value["data"]["realm"]["address"], key(1).to_string());
        assert_eq!(value["errors"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn error_lines_are_one_based() {
        let errors = report_errors(&report());
        assert!(errors[0].starts_with("[RA-D001] mints step failed"));
        assert!(errors[1].contains("token_accounts chunk 2 (2 addresses)"));
    }

    #[test]
    fn pretty_output_spans_lines() {
        let data = TreasuryData {
            governance: key(1),
            program_id: key(2),
            native_treasury: key(3),
        };
        let json = render_treasury_json(data, true).unwrap();
        assert!(json.contains('\n'));
        assert!(json.contains("nativeTreasury"));
    }
}
