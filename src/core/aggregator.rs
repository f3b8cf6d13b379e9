//! Governed-asset discovery pass.
//!
//! Runs the discovery steps in order and publishes the merged, deduplicated
//! account set to the [`AssetStore`] after each one, so subscribers can
//! render partial results while later steps are still running.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::classifier::{self, ClassifierConfig};
use super::layout::{TOKEN_ACCOUNT_LEN, TokenAccountState};
use super::models::{Governance, GovernanceContext, GovernedAccount, RealmInfo};
use super::pricing::{PRICE_STAGE, PriceService, TokenPrice};
use super::pubkey::{Pubkey, programs};
use super::resolver::{BatchResolver, FetchWarning, Partial, RawTokenAccount};
use super::store::AssetStore;
use crate::error::{AssetError, Result};

/// Discovery steps, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStep {
    TokenAccounts,
    NativeBalances,
    StakeAccounts,
    Prices,
    Mints,
    Programs,
    Generic,
}

impl AggregationStep {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::TokenAccounts => "token accounts",
            Self::NativeBalances => "native balances",
            Self::StakeAccounts => "stake accounts",
            Self::Prices => "prices",
            Self::Mints => "mints",
            Self::Programs => "programs",
            Self::Generic => "generic accounts",
        }
    }
}

impl fmt::Display for AggregationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A sub-step that was aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    pub step: AggregationStep,
    pub code: &'static str,
    pub error: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Outcome of one discovery pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregationReport {
    /// Final, deduplicated, visible accounts.
    pub accounts: Vec<GovernedAccount>,
    /// Chunks dropped along the way.
    pub warnings: Vec<FetchWarning>,
    /// Sub-steps that were aborted.
    pub failures: Vec<StepFailure>,
    pub prices: Vec<TokenPrice>,
}

impl AggregationReport {
    /// No account data is missing. Unpriced mints do not count.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.warnings.iter().all(|w| w.stage == PRICE_STAGE) && self.failures.is_empty()
    }

    /// USD price of `mint`, if one was found.
    #[must_use]
    pub fn price_of(&self, mint: &Pubkey) -> Option<f64> {
        self.prices.iter().find(|p| p.mint == *mint).map(|p| p.usd)
    }

    fn record(
        &mut self,
        step: AggregationStep,
        started: (DateTime<Utc>, Instant),
        error: AssetError,
    ) -> Result<()> {
        if error.is_auth_failure() {
            return Err(error);
        }
        tracing::warn!(step = %step, error = %error, "Discovery step aborted");
        self.failures.push(StepFailure {
            step,
            code: error.error_code(),
            error: error.to_string(),
            started_at: started.0,
            duration_ms: started.1.elapsed().as_millis() as u64,
        });
        Ok(())
    }

    fn absorb<T>(&mut self, partial: Partial<T>) -> Vec<T> {
        self.warnings.extend(partial.warnings);
        partial.items
    }
}

fn start() -> (DateTime<Utc>, Instant) {
    (Utc::now(), Instant::now())
}

/// Drives discovery for a realm and feeds the store.
pub struct AssetAggregator {
    resolver: Arc<BatchResolver>,
    store: Arc<AssetStore>,
    config: ClassifierConfig,
    prices: Option<Arc<PriceService>>,
}

impl fmt::Debug for AssetAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetAggregator")
            .field("resolver", &self.resolver)
            .field("prices", &self.prices.is_some())
            .finish_non_exhaustive()
    }
}

/// One pass over a set of governances, publishing as it goes.
struct Pass<'a> {
    realm: &'a RealmInfo,
    contexts: Vec<GovernanceContext>,
    /// Accounts kept from before the pass; they lose to fresh results on dedup.
    retained: Vec<GovernedAccount>,
    include_auxiliary: bool,
    accounts: Vec<GovernedAccount>,
    report: AggregationReport,
}

impl AssetAggregator {
    #[must_use]
    pub fn new(resolver: Arc<BatchResolver>, store: Arc<AssetStore>, config: ClassifierConfig) -> Self {
        Self {
            resolver,
            store,
            config,
            prices: None,
        }
    }

    /// Also look up token prices after the holdings step.
    #[must_use]
    pub fn with_prices(mut self, prices: Arc<PriceService>) -> Self {
        self.prices = Some(prices);
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<AssetStore> {
        &self.store
    }

    /// Full discovery pass for `realm`.
    ///
    /// # Errors
    ///
    /// Only authentication failures and treasury derivation errors abort the
    /// pass; everything else is recorded in the report.
    pub async fn load_realm_assets(&self, realm: &RealmInfo, governances: &[Governance]) -> Result<AggregationReport> {
        tracing::info!(realm = %realm.address, governances = governances.len(), "Starting discovery pass");
        self.store.set_governances(governances.to_vec());
        self.store.begin_pass(realm.address);

        let contexts = match self.contexts(realm, &self.store.governances()) {
            Ok(contexts) => contexts,
            Err(e) => {
                self.store.finish_pass(&realm.address);
                return Err(e);
            }
        };
        let pass = Pass {
            realm,
            contexts,
            retained: Vec::new(),
            include_auxiliary: true,
            accounts: Vec::new(),
            report: AggregationReport::default(),
        };
        self.run(pass).await
    }

    /// Rediscover one governance and splice its accounts into the store.
    ///
    /// Previously published accounts of that governance are replaced.
    ///
    /// # Errors
    ///
    /// Returns a config error if `governance` is not in `governances`, and
    /// authentication failures.
    pub async fn refresh_governance(
        &self,
        realm: &RealmInfo,
        governances: &[Governance],
        governance: &Pubkey,
    ) -> Result<AggregationReport> {
        let target = governances
            .iter()
            .find(|g| g.address == *governance)
            .cloned()
            .ok_or_else(|| AssetError::Config(format!("governance {governance} is not part of realm {}", realm.address)))?;
        tracing::info!(realm = %realm.address, governance = %governance, "Refreshing governance");

        let previous = self.store.snapshot();
        let retained: Vec<GovernedAccount> = if previous.realm == Some(realm.address) {
            previous
                .asset_accounts
                .iter()
                .filter(|account| account.governance() != Some(governance))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        self.store.begin_pass(realm.address);
        let contexts = match self.contexts(realm, std::slice::from_ref(&target)) {
            Ok(contexts) => contexts,
            Err(e) => {
                self.store.finish_pass(&realm.address);
                return Err(e);
            }
        };
        let pass = Pass {
            realm,
            contexts,
            retained,
            include_auxiliary: false,
            accounts: Vec::new(),
            report: AggregationReport::default(),
        };
        self.run(pass).await
    }

    fn contexts(&self, realm: &RealmInfo, governances: &[Governance]) -> Result<Vec<GovernanceContext>> {
        governances
            .iter()
            .filter(|g| !self.config.hidden_governances.contains(&g.address))
            .map(|g| GovernanceContext::derive(g.clone(), &realm.program_id))
            .collect()
    }

    async fn run(&self, mut pass: Pass<'_>) -> Result<AggregationReport> {
        let realm = pass.realm.address;
        match self.steps(&mut pass).await {
            Ok(()) => {
                let accounts = self.merged(&pass);
                self.store.publish(&realm, accounts.clone(), false);
                pass.report.accounts = accounts;
                tracing::info!(
                    realm = %realm,
                    accounts = pass.report.accounts.len(),
                    dropped_chunks = pass.report.warnings.len(),
                    failed_steps = pass.report.failures.len(),
                    "Discovery pass finished"
                );
                Ok(pass.report)
            }
            Err(e) => {
                tracing::error!(realm = %realm, error = %e, "Discovery pass aborted");
                self.store.finish_pass(&realm);
                Err(e)
            }
        }
    }

    async fn steps(&self, pass: &mut Pass<'_>) -> Result<()> {
        self.discover_holdings(pass).await?;
        self.publish(pass);
        self.discover_mints(pass).await?;
        self.publish(pass);
        self.discover_programs(pass).await?;
        self.publish(pass);
        self.add_generic_placeholders(pass).await
    }

    fn merged(&self, pass: &Pass<'_>) -> Vec<GovernedAccount> {
        let combined = pass.accounts.iter().chain(&pass.retained).cloned().collect();
        classifier::finalize(combined, &self.config.hidden_accounts)
    }

    fn publish(&self, pass: &Pass<'_>) {
        self.store.publish(&pass.realm.address, self.merged(pass), true);
    }

    // -------------------------------------------------------------------------
    // Step 2: token, NFT, auxiliary, native, and stake accounts
    // -------------------------------------------------------------------------

    async fn discover_holdings(&self, pass: &mut Pass<'_>) -> Result<()> {
        let treasuries: Vec<Pubkey> = pass.contexts.iter().map(|c| c.native_treasury).collect();

        // Native balances first so each treasury's Sol entry leads its holdings.
        let started = start();
        match self.native_balances(pass, &treasuries).await {
            Ok(accounts) => pass.accounts.extend(accounts),
            Err(e) => pass.report.record(AggregationStep::NativeBalances, started, e)?,
        }

        let started = start();
        match self.token_holdings(pass, &treasuries).await {
            Ok(accounts) => pass.accounts.extend(accounts),
            Err(e) => pass.report.record(AggregationStep::TokenAccounts, started, e)?,
        }

        let started = start();
        match self.resolver.stake_accounts(&treasuries).await {
            Ok(stakes) => {
                let stakes = pass.report.absorb(stakes);
                pass.accounts.extend(
                    stakes
                        .iter()
                        .filter_map(|raw| classifier::stake_account(raw, &pass.contexts)),
                );
            }
            Err(e) => pass.report.record(AggregationStep::StakeAccounts, started, e)?,
        }

        self.fetch_prices(pass).await;
        Ok(())
    }

    async fn native_balances(&self, pass: &mut Pass<'_>, treasuries: &[Pubkey]) -> Result<Vec<GovernedAccount>> {
        if treasuries.is_empty() {
            return Ok(Vec::new());
        }
        let rent = self.resolver.rent_exempt_minimum().await?;
        let balances = self.resolver.balances(treasuries).await?;
        let balances: HashMap<Pubkey, Option<u64>> = pass.report.absorb(balances).into_iter().collect();
        // Treasuries that were never funded do not exist on chain and get no entry.
        Ok(pass
            .contexts
            .iter()
            .filter_map(|ctx| {
                let raw = balances.get(&ctx.native_treasury).copied().flatten()?;
                Some(classifier::sol_account(ctx, raw, rent))
            })
            .collect())
    }

    async fn token_holdings(&self, pass: &mut Pass<'_>, treasuries: &[Pubkey]) -> Result<Vec<GovernedAccount>> {
        let mut owners: Vec<Pubkey> = pass
            .contexts
            .iter()
            .flat_map(|ctx| [ctx.governance.address, ctx.native_treasury])
            .collect();
        if pass.include_auxiliary {
            let mut auxiliary: Vec<Pubkey> = self.config.auxiliary_owners.iter().copied().collect();
            auxiliary.sort();
            owners.extend(auxiliary);
        }

        let by_owner = self.resolver.token_accounts_by_owner(&owners).await?;
        let mut raws = pass.report.absorb(by_owner);
        // Treasury-held accounts discovered through the token-owner index as well.
        let by_treasury = self.resolver.token_accounts_owned_by(treasuries).await?;
        raws.extend(pass.report.absorb(by_treasury));
        let raws = dedup_raw(raws);

        let mints: Vec<Pubkey> = raws
            .iter()
            .map(|raw| raw.state.mint)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let resolved = self.resolver.mint_accounts(&mints).await?;
        let resolved: HashMap<Pubkey, _> = pass.report.absorb(resolved).into_iter().collect();

        classifier::classify_token_accounts(&raws, &resolved, &pass.contexts, &self.config)
    }

    async fn fetch_prices(&self, pass: &mut Pass<'_>) {
        let Some(prices) = &self.prices else {
            return;
        };
        let mints: Vec<Pubkey> = pass
            .accounts
            .iter()
            .filter_map(|account| account.token_mint().map(|m| m.address))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if mints.is_empty() {
            return;
        }
        let found = prices.fetch_prices(&mints).await;
        let found = pass.report.absorb(found);
        pass.report.prices.extend(found);
    }

    // -------------------------------------------------------------------------
    // Step 3: mints whose authority is a governance or its treasury
    // -------------------------------------------------------------------------

    async fn discover_mints(&self, pass: &mut Pass<'_>) -> Result<()> {
        let started = start();
        let candidates = pass.realm.candidate_mints();
        let outcome = async {
            let resolved = self.resolver.mint_accounts(&candidates).await?;
            let resolved = pass.report.absorb(resolved);
            let mut accounts = Vec::new();
            for (address, mint) in resolved {
                let mint = mint.ok_or_else(|| AssetError::MissingAccount {
                    address: address.to_string(),
                })?;
                accounts.extend(classifier::mint_account(address, &mint, &pass.contexts));
            }
            Ok::<_, AssetError>(accounts)
        }
        .await;

        match outcome {
            Ok(accounts) => pass.accounts.extend(accounts),
            Err(e) => pass.report.record(AggregationStep::Mints, started, e)?,
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Step 4: upgradeable programs
    // -------------------------------------------------------------------------

    async fn discover_programs(&self, pass: &mut Pass<'_>) -> Result<()> {
        let started = start();
        let authorities: Vec<Pubkey> = pass
            .contexts
            .iter()
            .flat_map(|ctx| [ctx.governance.address, ctx.native_treasury])
            .collect();
        match self.resolver.programs_by_authority(&authorities).await {
            Ok(programs) => {
                let programs = pass.report.absorb(programs);
                pass.accounts.extend(
                    programs
                        .iter()
                        .filter_map(|raw| classifier::program_account(raw, &pass.contexts)),
                );
            }
            Err(e) => pass.report.record(AggregationStep::Programs, started, e)?,
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Step 5: placeholders for governances with nothing classified
    // -------------------------------------------------------------------------

    async fn add_generic_placeholders(&self, pass: &mut Pass<'_>) -> Result<()> {
        let started = start();
        let classified: Vec<GovernedAccount> = pass.accounts.iter().chain(&pass.retained).cloned().collect();
        let missing: Vec<GovernanceContext> = classifier::unrepresented(&pass.contexts, &classified)
            .into_iter()
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        // Governed accounts that are token accounts keep their state, so frozen
        // ones can be filtered out.
        let addresses: Vec<Pubkey> = missing.iter().map(|ctx| ctx.governance.governed_account).collect();
        let token_program = programs::TOKEN_PROGRAM.to_string();
        let tokens: HashMap<Pubkey, TokenAccountState> = match self.resolver.accounts("governed_accounts", &addresses).await {
            Ok(resolved) => pass
                .report
                .absorb(resolved)
                .into_iter()
                .filter_map(|(address, account)| {
                    let account = account.filter(|a| a.owner == token_program)?;
                    let data = account.decode_data().ok().filter(|d| d.len() == TOKEN_ACCOUNT_LEN)?;
                    Some((address, TokenAccountState::unpack(&address, &data).ok()?))
                })
                .collect(),
            Err(e) => {
                pass.report.record(AggregationStep::Generic, started, e)?;
                HashMap::new()
            }
        };

        pass.accounts.extend(
            missing
                .iter()
                .map(|ctx| classifier::generic_account(ctx, tokens.get(&ctx.governance.governed_account).cloned())),
        );
        Ok(())
    }
}

fn dedup_raw(raws: Vec<RawTokenAccount>) -> Vec<RawTokenAccount> {
    let mut seen = HashSet::with_capacity(raws.len());
    raws.into_iter().filter(|raw| seen.insert(raw.address)).collect()
}
