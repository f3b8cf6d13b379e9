//! Output rendering for human and robot modes.

pub mod error;
pub mod human;
pub mod robot;

use crate::cli::args::OutputFormat;
use crate::core::aggregator::AggregationReport;
use crate::core::models::{AccountKind, Governance, RealmInfo};
use crate::core::pubkey::Pubkey;
use crate::error::Result;

/// Render a scan or refresh result.
pub fn render_scan(
    command: &str,
    realm: &RealmInfo,
    governances: &[Governance],
    report: &AggregationReport,
    kind: Option<AccountKind>,
    format: OutputFormat,
    pretty: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => human::render_scan(realm, governances, report, kind),
        OutputFormat::Json => {
            if let Some(kind) = kind {
                let filtered = AggregationReport {
                    accounts: report.accounts.iter().filter(|a| a.kind() == kind).cloned().collect(),
                    ..report.clone()
                };
                robot::render_scan_json(command, realm, governances, &filtered, pretty)
            } else {
                robot::render_scan_json(command, realm, governances, report, pretty)
            }
        }
    }
}

/// Render a derived treasury address.
pub fn render_treasury(
    governance: Pubkey,
    program_id: Pubkey,
    treasury: Pubkey,
    format: OutputFormat,
    pretty: bool,
) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(human::render_treasury(&governance, &treasury)),
        OutputFormat::Json => robot::render_treasury_json(
            robot::TreasuryData {
                governance,
                program_id,
                native_treasury: treasury,
            },
            pretty,
        ),
    }
}
