//! Human-readable output.

use crate::core::aggregator::AggregationReport;
use crate::core::models::{AccountKind, Governance, GovernedAccount, NATIVE_DECIMALS, RealmInfo};
use crate::core::pubkey::Pubkey;
use crate::error::Result;

/// Render a scan result as an aligned table grouped by governance.
pub fn render_scan(
    realm: &RealmInfo,
    governances: &[Governance],
    report: &AggregationReport,
    kind: Option<AccountKind>,
) -> Result<String> {
    let mut output = format!("Realm {} ({} governances)\n", realm.address, governances.len());

    let accounts: Vec<&GovernedAccount> = report
        .accounts
        .iter()
        .filter(|a| kind.is_none_or(|k| a.kind() == k))
        .collect();

    for governance in governances {
        let owned: Vec<&&GovernedAccount> = accounts
            .iter()
            .filter(|a| a.governance() == Some(&governance.address))
            .collect();
        if owned.is_empty() {
            continue;
        }
        output.push_str(&format!("\nGovernance {} ({:?})\n", governance.address, governance.kind));
        for account in owned {
            output.push_str(&render_row(account, report));
        }
    }

    let auxiliary: Vec<&&GovernedAccount> = accounts.iter().filter(|a| a.governance().is_none()).collect();
    if !auxiliary.is_empty() {
        output.push_str("\nAuxiliary\n");
        for account in auxiliary {
            output.push_str(&render_row(account, report));
        }
    }

    output.push_str(&format!("\n{} accounts\n", accounts.len()));
    for failure in &report.failures {
        output.push_str(&format!(
            "Warning: {} step failed [{}]: {}\n",
            failure.step, failure.code, failure.error
        ));
    }
    for warning in &report.warnings {
        output.push_str(&format!(
            "Warning: {} chunk {} dropped ({} addresses): {}\n",
            warning.stage,
            warning.chunk_index + 1,
            warning.addresses.len(),
            warning.error
        ));
    }
    Ok(output)
}

/// Render a derived treasury address.
#[must_use]
pub fn render_treasury(governance: &Pubkey, treasury: &Pubkey) -> String {
    format!("Governance:      {governance}\nNative treasury: {treasury}\n")
}

fn render_row(account: &GovernedAccount, report: &AggregationReport) -> String {
    let detail = match account {
        GovernedAccount::Token(h) | GovernedAccount::Nft(h) => {
            let amount = format_amount(h.token.amount, h.mint.state.decimals);
            match report.price_of(&h.mint.address) {
                Some(usd) => format!(
                    "{amount} of {} (${:.2})",
                    h.mint.address,
                    usd_value(h.token.amount, h.mint.state.decimals, usd)
                ),
                None => format!("{amount} of {}", h.mint.address),
            }
        }
        GovernedAccount::AuxiliaryToken(h) => format!(
            "{} of {} (owner {})",
            format_amount(h.token.amount, h.mint.state.decimals),
            h.mint.address,
            h.token.owner
        ),
        GovernedAccount::Mint(m) => format!(
            "supply {}",
            format_amount(m.mint.supply, m.mint.decimals)
        ),
        GovernedAccount::Program(p) => format!("program data {}", p.program_data),
        GovernedAccount::Sol(s) => format!("{} SOL", format_amount(s.lamports, NATIVE_DECIMALS)),
        GovernedAccount::Stake(s) => format!(
            "{} SOL staked ({:?})",
            format_amount(s.lamports, NATIVE_DECIMALS),
            s.state
        ),
        GovernedAccount::Generic(_) => String::new(),
    };
    let line = format!(
        "  {:<16} {:<44} {}",
        account.kind().label(),
        account.address().to_string(),
        detail
    );
    format!("{}\n", line.trim_end())
}

fn usd_value(amount: u64, decimals: u8, usd: f64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let units = amount as f64 / 10f64.powi(i32::from(decimals));
    units * usd
}

/// Format a raw amount with its decimals and thousand separators.
fn format_amount(amount: u64, decimals: u8) -> String {
    let divisor = 10u128.pow(u32::from(decimals));
    let whole = u128::from(amount) / divisor;
    let fraction = u128::from(amount) % divisor;

    let mut text = group_thousands(whole);
    if fraction > 0 {
        let digits = format!("{fraction:0width$}", width = usize::from(decimals));
        text.push('.');
        text.push_str(digits.trim_end_matches('0'));
    }
    text
}

fn group_thousands(n: u128) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();
    let chunks: Vec<_> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();
    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}
