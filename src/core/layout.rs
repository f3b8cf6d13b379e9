//! Fixed-offset binary layouts of the accounts the scanner decodes.
//!
//! Token and mint layouts follow the SPL token program's packed state.
//! Stake and upgradeable-loader accounts are only partially decoded: we read
//! the discriminant and the handful of fields discovery needs.

use arrayref::{array_ref, array_refs};
use serde::{Deserialize, Serialize};

use super::pubkey::Pubkey;
use crate::error::{AssetError, Result};

/// Packed size of an SPL token account.
pub const TOKEN_ACCOUNT_LEN: usize = 165;
/// Packed size of an SPL mint.
pub const MINT_LEN: usize = 82;
/// Offset of the owner field inside a token account.
pub const TOKEN_ACCOUNT_OWNER_OFFSET: usize = 32;

/// Offset of the withdraw authority inside a stake account.
pub const STAKE_WITHDRAWER_OFFSET: usize = 44;
/// Offset of the delegated vote account inside an active stake account.
pub const STAKE_VOTER_OFFSET: usize = 124;
/// Discriminant of an initialized, undelegated stake account.
pub const STAKE_TAG_INITIALIZED: [u8; 4] = [1, 0, 0, 0];
/// Discriminant of a delegated stake account.
pub const STAKE_TAG_DELEGATED: [u8; 4] = [2, 0, 0, 0];

/// Offset of the upgrade authority address inside a program-data account.
pub const PROGRAM_DATA_AUTHORITY_OFFSET: usize = 13;
/// Offset of the program-data address inside a program account.
pub const PROGRAM_DATA_ADDRESS_OFFSET: usize = 4;

/// Offset of the realm address inside governance-program accounts.
pub const GOVERNANCE_REALM_OFFSET: usize = 1;
/// Bytes of a governance account needed for discovery (tag, realm, governed account).
pub const GOVERNANCE_HEADER_LEN: usize = 65;

const REALM_COUNCIL_OFFSET: usize = 58;

/// State byte of a token account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenAccountStatus {
    Uninitialized,
    Initialized,
    Frozen,
}

/// Decoded SPL token account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAccountState {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
    pub delegate: Option<Pubkey>,
    pub status: TokenAccountStatus,
    pub is_native: Option<u64>,
    pub delegated_amount: u64,
    pub close_authority: Option<Pubkey>,
}

impl TokenAccountState {
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.status == TokenAccountStatus::Frozen
    }

    /// Decode a packed token account.
    pub fn unpack(address: &Pubkey, data: &[u8]) -> Result<Self> {
        ensure_len(address, data, TOKEN_ACCOUNT_LEN, "token account")?;
        let src = array_ref![data, 0, TOKEN_ACCOUNT_LEN];
        let (mint, owner, amount, delegate, status, is_native, delegated_amount, close_authority) =
            array_refs![src, 32, 32, 8, 36, 1, 12, 8, 36];
        let status = match status[0] {
            0 => TokenAccountStatus::Uninitialized,
            1 => TokenAccountStatus::Initialized,
            2 => TokenAccountStatus::Frozen,
            other => return Err(invalid(address, format!("unknown account state {other}"))),
        };
        Ok(Self {
            mint: Pubkey::new_from_array(*mint),
            owner: Pubkey::new_from_array(*owner),
            amount: u64::from_le_bytes(*amount),
            delegate: unpack_coption_key(address, delegate)?,
            status,
            is_native: unpack_coption_u64(address, is_native)?,
            delegated_amount: u64::from_le_bytes(*delegated_amount),
            close_authority: unpack_coption_key(address, close_authority)?,
        })
    }
}

/// Decoded SPL mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintState {
    pub mint_authority: Option<Pubkey>,
    pub supply: u64,
    pub decimals: u8,
    pub is_initialized: bool,
    pub freeze_authority: Option<Pubkey>,
}

impl MintState {
    /// Decode a packed mint.
    pub fn unpack(address: &Pubkey, data: &[u8]) -> Result<Self> {
        ensure_len(address, data, MINT_LEN, "mint")?;
        let src = array_ref![data, 0, MINT_LEN];
        let (mint_authority, supply, decimals, is_initialized, freeze_authority) =
            array_refs![src, 36, 8, 1, 1, 36];
        let is_initialized = match is_initialized {
            [0] => false,
            [1] => true,
            _ => return Err(invalid(address, "bad initialized flag".to_string())),
        };
        Ok(Self {
            mint_authority: unpack_coption_key(address, mint_authority)?,
            supply: u64::from_le_bytes(*supply),
            decimals: decimals[0],
            is_initialized,
            freeze_authority: unpack_coption_key(address, freeze_authority)?,
        })
    }
}

/// Delegation state derived from a stake account's discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeState {
    Inactive,
    Active,
}

impl StakeState {
    /// Bytes matched at offset 0 to select accounts in this state.
    #[must_use]
    pub const fn tag(self) -> [u8; 4] {
        match self {
            Self::Inactive => STAKE_TAG_INITIALIZED,
            Self::Active => STAKE_TAG_DELEGATED,
        }
    }
}

/// The parts of a stake account discovery cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeAccountState {
    pub state: StakeState,
    pub withdrawer: Pubkey,
    pub voter: Option<Pubkey>,
}

impl StakeAccountState {
    pub fn unpack(address: &Pubkey, data: &[u8]) -> Result<Self> {
        ensure_len(address, data, STAKE_WITHDRAWER_OFFSET + 32, "stake account")?;
        let tag = array_ref![data, 0, 4];
        let state = match *tag {
            STAKE_TAG_INITIALIZED => StakeState::Inactive,
            STAKE_TAG_DELEGATED => StakeState::Active,
            other => {
                return Err(invalid(
                    address,
                    format!("unexpected stake discriminant {other:?}"),
                ));
            }
        };
        let withdrawer = Pubkey::new_from_array(*array_ref![data, STAKE_WITHDRAWER_OFFSET, 32]);
        let voter = match state {
            StakeState::Inactive => None,
            StakeState::Active => {
                ensure_len(address, data, STAKE_VOTER_OFFSET + 32, "delegated stake")?;
                Some(Pubkey::new_from_array(*array_ref![data, STAKE_VOTER_OFFSET, 32]))
            }
        };
        Ok(Self {
            state,
            withdrawer,
            voter,
        })
    }
}

/// Header fields shared by governance accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernanceHeader {
    pub account_type: u8,
    pub realm: Pubkey,
    pub governed_account: Pubkey,
}

impl GovernanceHeader {
    pub fn unpack(address: &Pubkey, data: &[u8]) -> Result<Self> {
        ensure_len(address, data, GOVERNANCE_HEADER_LEN, "governance")?;
        let src = array_ref![data, 0, GOVERNANCE_HEADER_LEN];
        let (account_type, realm, governed_account) = array_refs![src, 1, 32, 32];
        Ok(Self {
            account_type: account_type[0],
            realm: Pubkey::new_from_array(*realm),
            governed_account: Pubkey::new_from_array(*governed_account),
        })
    }
}

/// Mints referenced by a realm account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealmHeader {
    pub account_type: u8,
    pub community_mint: Pubkey,
    pub council_mint: Option<Pubkey>,
}

impl RealmHeader {
    pub fn unpack(address: &Pubkey, data: &[u8]) -> Result<Self> {
        ensure_len(address, data, REALM_COUNCIL_OFFSET + 33, "realm")?;
        let community_mint = Pubkey::new_from_array(*array_ref![data, 1, 32]);
        let council_mint = match data[REALM_COUNCIL_OFFSET] {
            0 => None,
            1 => Some(Pubkey::new_from_array(*array_ref![
                data,
                REALM_COUNCIL_OFFSET + 1,
                32
            ])),
            other => return Err(invalid(address, format!("bad council mint tag {other}"))),
        };
        Ok(Self {
            account_type: data[0],
            community_mint,
            council_mint,
        })
    }
}

fn ensure_len(address: &Pubkey, data: &[u8], needed: usize, what: &str) -> Result<()> {
    if data.len() < needed {
        return Err(invalid(
            address,
            format!("{what} needs {needed} bytes, got {}", data.len()),
        ));
    }
    Ok(())
}

fn invalid(address: &Pubkey, reason: String) -> AssetError {
    AssetError::InvalidAccountData {
        address: address.to_string(),
        reason,
    }
}

fn unpack_coption_key(address: &Pubkey, src: &[u8; 36]) -> Result<Option<Pubkey>> {
    let (tag, body) = array_refs![src, 4, 32];
    match *tag {
        [0, 0, 0, 0] => Ok(None),
        [1, 0, 0, 0] => Ok(Some(Pubkey::new_from_array(*body))),
        _ => Err(invalid(address, "bad COption<Pubkey> tag".to_string())),
    }
}

fn unpack_coption_u64(address: &Pubkey, src: &[u8; 12]) -> Result<Option<u64>> {
    let (tag, body) = array_refs![src, 4, 8];
    match *tag {
        [0, 0, 0, 0] => Ok(None),
        [1, 0, 0, 0] => Ok(Some(u64::from_le_bytes(*body))),
        _ => Err(invalid(address, "bad COption<u64> tag".to_string())),
    }
}

/// Packing helpers used to build fixtures.
#[cfg(any(test, feature = "test-utils"))]
pub mod pack {
    use super::{MINT_LEN, STAKE_VOTER_OFFSET, STAKE_WITHDRAWER_OFFSET, StakeState, TOKEN_ACCOUNT_LEN};
    use crate::core::pubkey::Pubkey;

    fn put_coption_key(dst: &mut [u8], key: Option<&Pubkey>) {
        if let Some(key) = key {
            dst[..4].copy_from_slice(&[1, 0, 0, 0]);
            dst[4..36].copy_from_slice(key.as_ref());
        }
    }

    /// Packed token account with no delegate or close authority.
    #[must_use]
    pub fn token_account(mint: &Pubkey, owner: &Pubkey, amount: u64, frozen: bool) -> Vec<u8> {
        let mut data = vec![0u8; TOKEN_ACCOUNT_LEN];
        data[0..32].copy_from_slice(mint.as_ref());
        data[32..64].copy_from_slice(owner.as_ref());
        data[64..72].copy_from_slice(&amount.to_le_bytes());
        data[108] = if frozen { 2 } else { 1 };
        data
    }

    /// Packed, initialized mint.
    #[must_use]
    pub fn mint(authority: Option<&Pubkey>, supply: u64, decimals: u8) -> Vec<u8> {
        let mut data = vec![0u8; MINT_LEN];
        put_coption_key(&mut data[0..36], authority);
        data[36..44].copy_from_slice(&supply.to_le_bytes());
        data[44] = decimals;
        data[45] = 1;
        data
    }

    /// Packed stake account with the given withdrawer and optional voter.
    #[must_use]
    pub fn stake_account(state: StakeState, withdrawer: &Pubkey, voter: Option<&Pubkey>) -> Vec<u8> {
        let mut data = vec![0u8; 200];
        data[0..4].copy_from_slice(&state.tag());
        data[STAKE_WITHDRAWER_OFFSET..STAKE_WITHDRAWER_OFFSET + 32].copy_from_slice(withdrawer.as_ref());
        if let Some(voter) = voter {
            data[STAKE_VOTER_OFFSET..STAKE_VOTER_OFFSET + 32].copy_from_slice(voter.as_ref());
        }
        data
    }

    /// Governance account header followed by zeroed config bytes.
    #[must_use]
    pub fn governance(account_type: u8, realm: &Pubkey, governed_account: &Pubkey) -> Vec<u8> {
        let mut data = vec![0u8; 120];
        data[0] = account_type;
        data[1..33].copy_from_slice(realm.as_ref());
        data[33..65].copy_from_slice(governed_account.as_ref());
        data
    }

    /// Realm account with the council mint option at its V2 offset.
    #[must_use]
    pub fn realm(community_mint: &Pubkey, council_mint: Option<&Pubkey>) -> Vec<u8> {
        let mut data = vec![0u8; 160];
        data[0] = 16;
        data[1..33].copy_from_slice(community_mint.as_ref());
        if let Some(council) = council_mint {
            data[58] = 1;
            data[59..91].copy_from_slice(council.as_ref());
        }
        data
    }

    /// Program-data account whose upgrade authority is `authority`.
    #[must_use]
    pub fn program_data(authority: &Pubkey) -> Vec<u8> {
        let mut data = vec![0u8; 45];
        data[0] = 3;
        data[12] = 1;
        data[13..45].copy_from_slice(authority.as_ref());
        data
    }

    /// Program account pointing at its program-data account.
    #[must_use]
    pub fn program(program_data: &Pubkey) -> Vec<u8> {
        let mut data = vec![0u8; 36];
        data[0] = 2;
        data[4..36].copy_from_slice(program_data.as_ref());
        data
    }
}
