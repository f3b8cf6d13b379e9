//! Realm and governance discovery.

use super::layout::{GOVERNANCE_HEADER_LEN, GOVERNANCE_REALM_OFFSET, GovernanceHeader, RealmHeader};
use super::models::{Governance, GovernanceKind, RealmInfo};
use super::pubkey::Pubkey;
use super::rpc::{AccountFilter, Encoding, KeyedAccount, RpcClient, RpcRequest, UiAccount, WithContext};
use crate::error::{AssetError, Result};

/// Realm account tags (V1 and V2).
const REALM_ACCOUNT_TYPES: [u8; 2] = [1, 16];

/// Fetch and decode the realm account.
///
/// # Errors
///
/// Returns [`AssetError::MissingAccount`] if the realm does not exist, or
/// [`AssetError::InvalidAccountData`] if it is not a realm of `program_id`.
pub async fn load_realm(client: &RpcClient, program_id: &Pubkey, realm: &Pubkey) -> Result<RealmInfo> {
    let account: WithContext<Option<UiAccount>> = client
        .call(RpcRequest::get_account_info(realm, Encoding::Base64, client.commitment()))
        .await?;
    let account = account.value.ok_or_else(|| AssetError::MissingAccount {
        address: realm.to_string(),
    })?;

    if account.owner != program_id.to_string() {
        return Err(AssetError::InvalidAccountData {
            address: realm.to_string(),
            reason: format!("owned by {}, expected {program_id}", account.owner),
        });
    }

    let data = account.decode_data()?;
    let header = RealmHeader::unpack(realm, &data)?;
    if !REALM_ACCOUNT_TYPES.contains(&header.account_type) {
        return Err(AssetError::InvalidAccountData {
            address: realm.to_string(),
            reason: format!("account type {} is not a realm", header.account_type),
        });
    }

    tracing::debug!(
        realm = %realm,
        community_mint = %header.community_mint,
        council = header.council_mint.is_some(),
        "Loaded realm"
    );
    Ok(RealmInfo {
        address: *realm,
        program_id: *program_id,
        community_mint: header.community_mint,
        council_mint: header.council_mint,
    })
}

/// All governances of `realm`, sorted by address.
///
/// Other governance-program accounts that reference the realm (token owner
/// records, proposals) are filtered out by their account type.
///
/// # Errors
///
/// Returns RPC and transport errors.
pub async fn load_governances(client: &RpcClient, realm: &RealmInfo) -> Result<Vec<Governance>> {
    let request = RpcRequest::get_program_accounts(
        &realm.program_id,
        &[AccountFilter::memcmp_key(GOVERNANCE_REALM_OFFSET, &realm.address)],
        Some((0, GOVERNANCE_HEADER_LEN)),
        client.commitment(),
    );
    let accounts: Vec<KeyedAccount> = client.call(request).await?;

    let mut governances = Vec::new();
    for keyed in &accounts {
        let address = keyed.address()?;
        let data = keyed.account.decode_data()?;
        let Ok(header) = GovernanceHeader::unpack(&address, &data) else {
            continue;
        };
        if let Some(kind) = GovernanceKind::from_account_type(header.account_type) {
            governances.push(Governance {
                address,
                realm: header.realm,
                governed_account: header.governed_account,
                kind,
            });
        }
    }
    governances.sort_by_key(|g| g.address);

    tracing::info!(realm = %realm.address, governances = governances.len(), "Loaded governances");
    Ok(governances)
}
