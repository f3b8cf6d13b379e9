//! Turns raw account records into tagged [`GovernedAccount`] variants.
//!
//! Everything here is pure: the aggregator fetches, the classifier decides.

use std::collections::{HashMap, HashSet};

use super::layout::{MintState, TokenAccountState};
use super::models::{
    AuxiliaryHolding, GenericAsset, GovernanceContext, GovernedAccount, MintAsset, MintInfo,
    ProgramAsset, SolBalance, StakeAsset, TokenHolding,
};
use super::pubkey::Pubkey;
use super::resolver::{RawProgram, RawStakeAccount, RawTokenAccount};
use crate::error::{AssetError, Result};

/// Mint that marks NFT holdings.
pub const DEFAULT_NFT_MARKER_MINT: &str = "GNFTm5rz1Kzvq94G7DJkcrEUnCypeQYf7Ya8arPoHWvw";
/// Placeholder mint standing in for native SOL; never surfaced as a token.
pub const DEFAULT_NATIVE_SOL_MINT: &str = "GSoLvSToqaUmMyqP12GffzcirPAickrpZmVUFtek6x5u";

/// Well-known marker mints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Markers {
    pub nft_mint: Pubkey,
    pub native_sol_mint: Pubkey,
}

impl Markers {
    /// # Errors
    ///
    /// Returns an error if either address is not valid base58.
    pub fn new(nft_mint: &str, native_sol_mint: &str) -> Result<Self> {
        Ok(Self {
            nft_mint: nft_mint.parse()?,
            native_sol_mint: native_sol_mint.parse()?,
        })
    }

    /// The built-in marker mints.
    ///
    /// # Errors
    ///
    /// Only fails if the built-in constants are malformed.
    pub fn defaults() -> Result<Self> {
        Self::new(DEFAULT_NFT_MARKER_MINT, DEFAULT_NATIVE_SOL_MINT)
    }
}

/// Classification knobs taken from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierConfig {
    pub markers: Markers,
    /// Accounts never shown.
    pub hidden_accounts: HashSet<Pubkey>,
    /// Governances dropped before any discovery runs.
    pub hidden_governances: HashSet<Pubkey>,
    /// Owners whose token accounts are surfaced without a governance.
    pub auxiliary_owners: HashSet<Pubkey>,
}

impl ClassifierConfig {
    /// # Errors
    ///
    /// Only fails if the built-in marker constants are malformed.
    pub fn with_defaults() -> Result<Self> {
        Ok(Self {
            markers: Markers::defaults()?,
            hidden_accounts: HashSet::new(),
            hidden_governances: HashSet::new(),
            auxiliary_owners: HashSet::new(),
        })
    }
}

/// Outcome of looking at a token account's mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Nft,
    Token,
    Excluded,
}

/// Decide how a holding of `mint` is surfaced.
///
/// Any supply-1 mint other than the NFT marker is excluded, which also
/// drops single-supply collectibles that were never tagged.
#[must_use]
pub fn classify_mint(mint_address: &Pubkey, mint: &MintState, markers: &Markers) -> TokenClass {
    if *mint_address == markers.nft_mint {
        TokenClass::Nft
    } else if mint.supply != 1 && *mint_address != markers.native_sol_mint {
        TokenClass::Token
    } else {
        TokenClass::Excluded
    }
}

/// The governance whose address or native treasury is `owner`.
#[must_use]
pub fn resolve_owner<'a>(owner: &Pubkey, contexts: &'a [GovernanceContext]) -> Option<&'a GovernanceContext> {
    contexts.iter().find(|ctx| ctx.controls(owner))
}

/// Classify one token account given its mint.
///
/// Returns `None` when the account is excluded or belongs to nobody we track.
#[must_use]
pub fn classify_token_account(
    raw: &RawTokenAccount,
    mint: &MintInfo,
    contexts: &[GovernanceContext],
    config: &ClassifierConfig,
) -> Option<GovernedAccount> {
    let class = classify_mint(&mint.address, &mint.state, &config.markers);
    if class == TokenClass::Excluded {
        return None;
    }

    if let Some(ctx) = resolve_owner(&raw.state.owner, contexts) {
        let holding = TokenHolding {
            address: raw.address,
            governance: *ctx.address(),
            token: raw.state.clone(),
            mint: mint.clone(),
        };
        return Some(match class {
            TokenClass::Nft => GovernedAccount::Nft(holding),
            _ => GovernedAccount::Token(holding),
        });
    }

    config
        .auxiliary_owners
        .contains(&raw.state.owner)
        .then(|| {
            GovernedAccount::AuxiliaryToken(AuxiliaryHolding {
                address: raw.address,
                token: raw.state.clone(),
                mint: mint.clone(),
            })
        })
}

/// Classify a batch of token accounts against resolved mints.
///
/// A mint absent from `mints` was in a dropped chunk and its accounts are
/// skipped. A mint present as `None` does not exist on chain.
///
/// # Errors
///
/// Returns [`AssetError::MissingAccount`] for the first referenced mint
/// that does not exist.
pub fn classify_token_accounts(
    raws: &[RawTokenAccount],
    mints: &HashMap<Pubkey, Option<MintState>>,
    contexts: &[GovernanceContext],
    config: &ClassifierConfig,
) -> Result<Vec<GovernedAccount>> {
    let mut accounts = Vec::with_capacity(raws.len());
    for raw in raws {
        let mint_address = raw.state.mint;
        let state = match mints.get(&mint_address) {
            Some(Some(state)) => state,
            Some(None) => {
                return Err(AssetError::MissingAccount {
                    address: mint_address.to_string(),
                });
            }
            None => continue,
        };
        let mint = MintInfo {
            address: mint_address,
            state: state.clone(),
        };
        if let Some(account) = classify_token_account(raw, &mint, contexts, config) {
            accounts.push(account);
        }
    }
    Ok(accounts)
}

/// Spendable lamports once the rent-exempt minimum is set aside.
#[must_use]
pub const fn native_balance(raw_lamports: u64, rent_exempt_minimum: u64) -> u64 {
    if raw_lamports == 0 {
        0
    } else {
        raw_lamports.saturating_sub(rent_exempt_minimum)
    }
}

/// Native balance record for a governance's treasury.
#[must_use]
pub fn sol_account(ctx: &GovernanceContext, raw_lamports: u64, rent_exempt_minimum: u64) -> GovernedAccount {
    GovernedAccount::Sol(SolBalance {
        address: ctx.native_treasury,
        governance: *ctx.address(),
        lamports: native_balance(raw_lamports, rent_exempt_minimum),
        raw_lamports,
        rent_exempt_minimum,
    })
}

/// Attribute a stake account to the governance whose treasury withdraws it.
#[must_use]
pub fn stake_account(raw: &RawStakeAccount, contexts: &[GovernanceContext]) -> Option<GovernedAccount> {
    let ctx = contexts.iter().find(|ctx| ctx.native_treasury == raw.treasury)?;
    Some(GovernedAccount::Stake(StakeAsset {
        address: raw.address,
        governance: *ctx.address(),
        treasury: raw.treasury,
        state: raw.state.state,
        voter: raw.state.voter,
        lamports: raw.lamports,
    }))
}

/// The governance holding `mint`'s authority; a treasury match wins over a
/// governance-address match.
#[must_use]
pub fn mint_governance<'a>(mint: &MintState, contexts: &'a [GovernanceContext]) -> Option<&'a GovernanceContext> {
    let authority = mint.mint_authority.as_ref()?;
    contexts
        .iter()
        .find(|ctx| ctx.native_treasury == *authority)
        .or_else(|| contexts.iter().find(|ctx| ctx.governance.address == *authority))
}

#[must_use]
pub fn mint_account(address: Pubkey, mint: &MintState, contexts: &[GovernanceContext]) -> Option<GovernedAccount> {
    let ctx = mint_governance(mint, contexts)?;
    Some(GovernedAccount::Mint(MintAsset {
        address,
        governance: *ctx.address(),
        mint: mint.clone(),
    }))
}

#[must_use]
pub fn program_account(raw: &RawProgram, contexts: &[GovernanceContext]) -> Option<GovernedAccount> {
    let ctx = resolve_owner(&raw.authority, contexts)?;
    Some(GovernedAccount::Program(ProgramAsset {
        address: raw.address,
        governance: *ctx.address(),
        program_data: raw.program_data,
        upgrade_authority: raw.authority,
    }))
}

/// Governances whose governed account is not among `classified`.
#[must_use]
pub fn unrepresented<'a>(
    contexts: &'a [GovernanceContext],
    classified: &[GovernedAccount],
) -> Vec<&'a GovernanceContext> {
    let known: HashSet<&Pubkey> = classified.iter().map(GovernedAccount::address).collect();
    contexts
        .iter()
        .filter(|ctx| !known.contains(&ctx.governance.governed_account))
        .collect()
}

/// Placeholder keeping a governance selectable.
#[must_use]
pub fn generic_account(ctx: &GovernanceContext, token: Option<TokenAccountState>) -> GovernedAccount {
    GovernedAccount::Generic(GenericAsset {
        address: ctx.governance.governed_account,
        governance: *ctx.address(),
        token,
    })
}

/// Hidden addresses and generic wrappers of frozen token accounts are not shown.
#[must_use]
pub fn is_visible(account: &GovernedAccount, hidden: &HashSet<Pubkey>) -> bool {
    if hidden.contains(account.address()) {
        return false;
    }
    match account {
        GovernedAccount::Generic(generic) => !generic.token.as_ref().is_some_and(TokenAccountState::is_frozen),
        _ => true,
    }
}

/// Collapse by address; the first occurrence wins.
#[must_use]
pub fn dedup_by_address(accounts: Vec<GovernedAccount>) -> Vec<GovernedAccount> {
    let mut seen = HashSet::with_capacity(accounts.len());
    accounts
        .into_iter()
        .filter(|account| seen.insert(*account.address()))
        .collect()
}

/// Dedup, then apply the visibility filter.
#[must_use]
pub fn finalize(accounts: Vec<GovernedAccount>, hidden: &HashSet<Pubkey>) -> Vec<GovernedAccount> {
    dedup_by_address(accounts)
        .into_iter()
        .filter(|account| is_visible(account, hidden))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::layout::{StakeAccountState, StakeState, TokenAccountStatus};
    use crate::core::models::{Governance, GovernanceKind};

    fn key(byte: u8) -> Pubkey {
        Pubkey::new_from_array([byte; 32])
    }

    fn context(byte: u8) -> GovernanceContext {
        GovernanceContext {
            governance: Governance {
                address: key(byte),
                realm: key(200),
                governed_account: key(byte + 100),
                kind: GovernanceKind::Account,
            },
            native_treasury: key(byte + 50),
        }
    }

    fn mint_state(supply: u64) -> MintState {
        MintState {
            mint_authority: None,
            supply,
            decimals: 6,
            is_initialized: true,
            freeze_authority: None,
        }
    }

    fn token(address: u8, mint: Pubkey, owner: Pubkey) -> RawTokenAccount {
        RawTokenAccount {
            address: key(address),
            lamports: 2_039_280,
            state: TokenAccountState {
                mint,
                owner,
                amount: 10,
                delegate: None,
                status: TokenAccountStatus::Initialized,
                is_native: None,
                delegated_amount: 0,
                close_authority: None,
            },
        }
    }

    fn config() -> ClassifierConfig {
        ClassifierConfig::with_defaults().unwrap()
    }

    #[test]
    fn supply_five_is_a_token() {
        let config = config();
        assert_eq!(classify_mint(&key(7), &mint_state(5), &config.markers), TokenClass::Token);
    }

    #[test]
    fn nft_marker_is_an_nft() {
        let config = config();
        let marker = config.markers.nft_mint;
        assert_eq!(classify_mint(&marker, &mint_state(1), &config.markers), TokenClass::Nft);
    }

    #[test]
    fn supply_one_without_marker_is_excluded() {
        let config = config();
        assert_eq!(classify_mint(&key(7), &mint_state(1), &config.markers), TokenClass::Excluded);
    }

    #[test]
    fn native_sol_placeholder_is_excluded() {
        let config = config();
        let placeholder = config.markers.native_sol_mint;
        assert_eq!(
            classify_mint(&placeholder, &mint_state(1_000), &config.markers),
            TokenClass::Excluded
        );
    }

    #[test]
    fn native_balance_subtracts_rent() {
        assert_eq!(native_balance(2_039_280, 890_880), 1_148_400);
        assert_eq!(native_balance(0, 890_880), 0);
        assert_eq!(native_balance(100, 890_880), 0);
    }

    #[test]
    fn owner_resolves_through_treasury() {
        let contexts = vec![context(1), context(2)];
        assert_eq!(resolve_owner(&key(52), &contexts).map(|c| c.governance.address), Some(key(2)));
        assert_eq!(resolve_owner(&key(1), &contexts).map(|c| c.governance.address), Some(key(1)));
        assert!(resolve_owner(&key(99), &contexts).is_none());
    }

    #[test]
    fn unowned_account_is_auxiliary_only_when_configured() {
        let contexts = vec![context(1)];
        let mut config = config();
        let raw = token(30, key(7), key(99));
        let mint = MintInfo {
            address: key(7),
            state: mint_state(1_000),
        };
        assert!(classify_token_account(&raw, &mint, &contexts, &config).is_none());

        config.auxiliary_owners.insert(key(99));
        let account = classify_token_account(&raw, &mint, &contexts, &config).unwrap();
        assert!(matches!(account, GovernedAccount::AuxiliaryToken(_)));
        assert_eq!(account.governance(), None);
    }

    #[test]
    fn missing_mint_is_a_hard_error() {
        let contexts = vec![context(1)];
        let raws = vec![token(30, key(7), key(51))];
        let mints = HashMap::from([(key(7), None)]);
        let err = classify_token_accounts(&raws, &mints, &contexts, &config()).unwrap_err();
        assert!(matches!(err, AssetError::MissingAccount { address } if address == key(7).to_string()));
    }

    #[test]
    fn unresolved_mint_skips_account() {
        let contexts = vec![context(1)];
        let raws = vec![token(30, key(7), key(51)), token(31, key(8), key(51))];
        let mints = HashMap::from([(key(8), Some(mint_state(1_000)))]);
        let accounts = classify_token_accounts(&raws, &mints, &contexts, &config()).unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].address(), &key(31));
        assert_eq!(accounts[0].governance(), Some(&key(1)));
    }

    #[test]
    fn treasury_authority_wins_for_mints() {
        let contexts = vec![context(1), context(2)];
        let mut mint = mint_state(1_000);
        mint.mint_authority = Some(key(2));
        assert_eq!(mint_governance(&mint, &contexts).map(|c| c.governance.address), Some(key(2)));
        mint.mint_authority = Some(key(51));
        assert_eq!(mint_governance(&mint, &contexts).map(|c| c.governance.address), Some(key(1)));
        mint.mint_authority = None;
        assert!(mint_governance(&mint, &contexts).is_none());
    }

    #[test]
    fn stake_is_attributed_by_treasury() {
        let contexts = vec![context(1)];
        let raw = RawStakeAccount {
            address: key(40),
            treasury: key(51),
            lamports: 5_000_000,
            state: StakeAccountState {
                state: StakeState::Active,
                withdrawer: key(51),
                voter: Some(key(41)),
            },
        };
        let account = stake_account(&raw, &contexts).unwrap();
        let GovernedAccount::Stake(stake) = account else {
            panic!("expected stake");
        };
        assert_eq!(stake.governance, key(1));
        assert_eq!(stake.voter, Some(key(41)));
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let ctx = context(1);
        let accounts = vec![
            sol_account(&ctx, 10, 1),
            generic_account(&context(2), None),
            sol_account(&ctx, 99, 1),
            sol_account(&ctx, 77, 1),
        ];
        let deduped = dedup_by_address(accounts);
        assert_eq!(deduped.len(), 2);
        let GovernedAccount::Sol(sol) = &deduped[0] else {
            panic!("expected sol");
        };
        assert_eq!(sol.raw_lamports, 10);
    }

    #[test]
    fn frozen_generic_and_hidden_accounts_are_filtered() {
        let mut frozen = token(30, key(7), key(1)).state;
        frozen.status = TokenAccountStatus::Frozen;
        let accounts = vec![
            generic_account(&context(1), Some(frozen)),
            generic_account(&context(2), None),
            sol_account(&context(3), 10, 1),
        ];
        let hidden = HashSet::from([key(53)]);
        let visible = finalize(accounts, &hidden);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].address(), &key(102));
    }

    #[test]
    fn unrepresented_skips_classified_governed_accounts() {
        let contexts = vec![context(1), context(2)];
        let classified = vec![generic_account(&contexts[0], None)];
        let missing = unrepresented(&contexts, &classified);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].governance.address, key(2));
    }
}
