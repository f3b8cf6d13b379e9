//! `scan`, `refresh`, and `treasury-address` command implementations.

use std::sync::Arc;

use crate::cli::args::{OutputFormat, RefreshArgs, ScanArgs, TreasuryArgs};
use crate::core::aggregator::{AggregationReport, AssetAggregator};
use crate::core::clock::TokioClock;
use crate::core::http::HttpTransport;
use crate::core::models::{AccountKind, Governance, RealmInfo};
use crate::core::pricing::PriceService;
use crate::core::pubkey::{Pubkey, native_treasury_address, programs};
use crate::core::rate_limiter::RateLimiter;
use crate::core::realm::{load_governances, load_realm};
use crate::core::resolver::BatchResolver;
use crate::core::rpc::RpcClient;
use crate::core::store::AssetStore;
use crate::error::{AssetError, Result};
use crate::render;
use crate::storage::ResolvedConfig;

/// Execute the scan command.
pub async fn execute_scan(args: &ScanArgs, format: OutputFormat, pretty: bool) -> Result<()> {
    let kind = parse_kind(args.kind.as_deref())?;
    let session = Session::connect(args).await?;
    let report = session
        .aggregator
        .load_realm_assets(&session.realm, &session.governances)
        .await?;
    session.finish("scan", &report, kind, format, pretty)
}

/// Execute the refresh command.
pub async fn execute_refresh(args: &RefreshArgs, format: OutputFormat, pretty: bool) -> Result<()> {
    let kind = parse_kind(args.scan.kind.as_deref())?;
    let governance: Pubkey = args.governance.parse()?;
    let session = Session::connect(&args.scan).await?;
    let report = session
        .aggregator
        .refresh_governance(&session.realm, &session.governances, &governance)
        .await?;
    session.finish("refresh", &report, kind, format, pretty)
}

/// Execute the treasury-address command. Purely local.
pub fn execute_treasury(args: &TreasuryArgs, format: OutputFormat, pretty: bool) -> Result<()> {
    let governance: Pubkey = args.governance.parse()?;
    let program_id = program_id(args.program.as_deref())?;
    let treasury = native_treasury_address(&program_id, &governance)?;
    let output = render::render_treasury(governance, program_id, treasury, format, pretty)?;
    print!("{output}");
    Ok(())
}

fn program_id(arg: Option<&str>) -> Result<Pubkey> {
    arg.unwrap_or(programs::GOVERNANCE_PROGRAM).parse()
}

fn parse_kind(arg: Option<&str>) -> Result<Option<AccountKind>> {
    arg.map(|s| {
        AccountKind::from_arg(s).ok_or_else(|| AssetError::Config(format!("Unknown account kind '{s}'")))
    })
    .transpose()
}

/// A connected aggregator with the realm already loaded.
struct Session {
    aggregator: AssetAggregator,
    realm: RealmInfo,
    governances: Vec<Governance>,
}

impl Session {
    async fn connect(args: &ScanArgs) -> Result<Self> {
        let realm_address: Pubkey = args.realm.parse()?;
        let program_id = program_id(args.program.as_deref())?;
        let config = ResolvedConfig::resolve(&args.connection)?;

        let clock = Arc::new(TokioClock::new());
        let transport = Arc::new(HttpTransport::new(&config.endpoint, config.timeout)?);
        tracing::info!(
            cluster = %config.cluster,
            endpoint = transport.endpoint().redacted(),
            rps = config.requests_per_second,
            "Connecting"
        );
        let limiter = Arc::new(RateLimiter::new(config.requests_per_second, clock.clone()));
        let client = Arc::new(RpcClient::new(transport, limiter, config.commitment));

        let realm = load_realm(&client, &program_id, &realm_address).await?;
        let governances = load_governances(&client, &realm).await?;

        let resolver = Arc::new(BatchResolver::new(client, clock, config.batch)?);
        let store = Arc::new(AssetStore::new(config.classifier.hidden_governances.clone()));
        let mut aggregator = AssetAggregator::new(resolver, store, config.classifier);
        if let Some(endpoint) = config.price_endpoint {
            aggregator = aggregator.with_prices(Arc::new(PriceService::new(endpoint)?));
        }

        Ok(Self {
            aggregator,
            realm,
            governances,
        })
    }

    /// Print the report; an incomplete report still prints but fails the command.
    fn finish(
        &self,
        command: &str,
        report: &AggregationReport,
        kind: Option<AccountKind>,
        format: OutputFormat,
        pretty: bool,
    ) -> Result<()> {
        let output = render::render_scan(command, &self.realm, &self.governances, report, kind, format, pretty)?;
        print!("{output}");
        if format == OutputFormat::Json {
            println!();
        }

        if !report.is_complete() {
            return Err(AssetError::PartialResult {
                failed: report.failures.len(),
                dropped: report.warnings.len(),
            });
        }
        Ok(())
    }
}
