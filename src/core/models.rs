//! Data models for realms, governances, and classified treasury assets.

use serde::{Deserialize, Serialize};

use super::layout::{MintState, StakeState, TokenAccountState};
use super::pubkey::{Pubkey, native_treasury_address};
use crate::error::Result;

/// Lamports in one SOL.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Decimals used to display native balances.
pub const NATIVE_DECIMALS: u8 = 9;

// =============================================================================
// Realm & Governance
// =============================================================================

/// The realm being scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmInfo {
    pub address: Pubkey,
    /// Governance program that owns the realm.
    pub program_id: Pubkey,
    pub community_mint: Pubkey,
    pub council_mint: Option<Pubkey>,
}

impl RealmInfo {
    /// Mints checked for governance-held mint authority.
    #[must_use]
    pub fn candidate_mints(&self) -> Vec<Pubkey> {
        std::iter::once(self.community_mint)
            .chain(self.council_mint)
            .collect()
    }
}

/// What a governance was created to control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceKind {
    Account,
    Program,
    Mint,
    Token,
}

impl GovernanceKind {
    /// Map a governance-program account tag (V1 and V2 layouts).
    #[must_use]
    pub const fn from_account_type(tag: u8) -> Option<Self> {
        match tag {
            3 | 18 => Some(Self::Account),
            4 | 19 => Some(Self::Program),
            9 | 20 => Some(Self::Mint),
            10 | 21 => Some(Self::Token),
            _ => None,
        }
    }
}

/// A governance account of the realm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Governance {
    pub address: Pubkey,
    pub realm: Pubkey,
    pub governed_account: Pubkey,
    pub kind: GovernanceKind,
}

/// A governance together with its derived native treasury.
///
/// Built once per aggregation pass and dropped with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernanceContext {
    pub governance: Governance,
    pub native_treasury: Pubkey,
}

impl GovernanceContext {
    /// Derive the native treasury of `governance` under `program_id`.
    pub fn derive(governance: Governance, program_id: &Pubkey) -> Result<Self> {
        let native_treasury = native_treasury_address(program_id, &governance.address)?;
        Ok(Self {
            governance,
            native_treasury,
        })
    }

    #[must_use]
    pub const fn address(&self) -> &Pubkey {
        &self.governance.address
    }

    /// Whether `owner` is this governance or its treasury.
    #[must_use]
    pub fn controls(&self, owner: &Pubkey) -> bool {
        self.governance.address == *owner || self.native_treasury == *owner
    }
}

// =============================================================================
// Governed Accounts
// =============================================================================

/// A mint together with its address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintInfo {
    pub address: Pubkey,
    #[serde(flatten)]
    pub state: MintState,
}

/// Token or NFT holding of a governance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHolding {
    pub address: Pubkey,
    pub governance: Pubkey,
    pub token: TokenAccountState,
    pub mint: MintInfo,
}

/// Token account discovered for a configured auxiliary owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxiliaryHolding {
    pub address: Pubkey,
    pub token: TokenAccountState,
    pub mint: MintInfo,
}

/// Mint whose authority is a governance or its treasury.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintAsset {
    pub address: Pubkey,
    pub governance: Pubkey,
    pub mint: MintState,
}

/// Upgradeable program whose upgrade authority is a governance or its treasury.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramAsset {
    pub address: Pubkey,
    pub governance: Pubkey,
    pub program_data: Pubkey,
    pub upgrade_authority: Pubkey,
}

/// Native balance held at a governance's treasury.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolBalance {
    /// The native treasury address.
    pub address: Pubkey,
    pub governance: Pubkey,
    /// Spendable lamports (raw balance minus the rent-exempt minimum).
    pub lamports: u64,
    pub raw_lamports: u64,
    pub rent_exempt_minimum: u64,
}

/// Stake account withdrawable by a governance's treasury.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeAsset {
    pub address: Pubkey,
    pub governance: Pubkey,
    pub treasury: Pubkey,
    pub state: StakeState,
    /// Vote account the stake is delegated to (active stake only).
    pub voter: Option<Pubkey>,
    pub lamports: u64,
}

/// Governed account that no classifier recognised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericAsset {
    pub address: Pubkey,
    pub governance: Pubkey,
    /// Token state when the governed account is a token account that was not surfaced.
    pub token: Option<TokenAccountState>,
}

/// Discriminator of [`GovernedAccount`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Token,
    Nft,
    AuxiliaryToken,
    Mint,
    Program,
    Sol,
    Stake,
    Generic,
}

impl AccountKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::Nft => "nft",
            Self::AuxiliaryToken => "auxiliary-token",
            Self::Mint => "mint",
            Self::Program => "program",
            Self::Sol => "sol",
            Self::Stake => "stake",
            Self::Generic => "generic",
        }
    }

    /// Parse a CLI label; underscores and dashes are interchangeable.
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "token" => Some(Self::Token),
            "nft" => Some(Self::Nft),
            "auxiliary-token" | "auxiliary" => Some(Self::AuxiliaryToken),
            "mint" => Some(Self::Mint),
            "program" => Some(Self::Program),
            "sol" => Some(Self::Sol),
            "stake" => Some(Self::Stake),
            "generic" => Some(Self::Generic),
            _ => None,
        }
    }
}

/// A classified account controlled by (or incidental to) a governance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GovernedAccount {
    Token(TokenHolding),
    Nft(TokenHolding),
    AuxiliaryToken(AuxiliaryHolding),
    Mint(MintAsset),
    Program(ProgramAsset),
    Sol(SolBalance),
    Stake(StakeAsset),
    Generic(GenericAsset),
}

impl GovernedAccount {
    #[must_use]
    pub const fn kind(&self) -> AccountKind {
        match self {
            Self::Token(_) => AccountKind::Token,
            Self::Nft(_) => AccountKind::Nft,
            Self::AuxiliaryToken(_) => AccountKind::AuxiliaryToken,
            Self::Mint(_) => AccountKind::Mint,
            Self::Program(_) => AccountKind::Program,
            Self::Sol(_) => AccountKind::Sol,
            Self::Stake(_) => AccountKind::Stake,
            Self::Generic(_) => AccountKind::Generic,
        }
    }

    #[must_use]
    pub const fn address(&self) -> &Pubkey {
        match self {
            Self::Token(h) | Self::Nft(h) => &h.address,
            Self::AuxiliaryToken(h) => &h.address,
            Self::Mint(m) => &m.address,
            Self::Program(p) => &p.address,
            Self::Sol(s) => &s.address,
            Self::Stake(s) => &s.address,
            Self::Generic(g) => &g.address,
        }
    }

    /// Owning governance. `None` only for auxiliary token accounts.
    #[must_use]
    pub const fn governance(&self) -> Option<&Pubkey> {
        match self {
            Self::Token(h) | Self::Nft(h) => Some(&h.governance),
            Self::AuxiliaryToken(_) => None,
            Self::Mint(m) => Some(&m.governance),
            Self::Program(p) => Some(&p.governance),
            Self::Sol(s) => Some(&s.governance),
            Self::Stake(s) => Some(&s.governance),
            Self::Generic(g) => Some(&g.governance),
        }
    }

    /// Mint of the held tokens, for token-like accounts.
    #[must_use]
    pub const fn token_mint(&self) -> Option<&MintInfo> {
        match self {
            Self::Token(h) | Self::Nft(h) => Some(&h.mint),
            Self::AuxiliaryToken(h) => Some(&h.mint),
            _ => None,
        }
    }

    /// Token state attached to the account, if any.
    #[must_use]
    pub const fn token_state(&self) -> Option<&TokenAccountState> {
        match self {
            Self::Token(h) | Self::Nft(h) => Some(&h.token),
            Self::AuxiliaryToken(h) => Some(&h.token),
            Self::Generic(g) => g.token.as_ref(),
            _ => None,
        }
    }

    /// Token, NFT, and native balances: the accounts a transfer can spend from.
    #[must_use]
    pub const fn is_governed_token(&self) -> bool {
        matches!(self, Self::Token(_) | Self::Nft(_) | Self::Sol(_))
    }
}
