//! Chunked, rate-limited account resolution.
//!
//! Every lookup splits its keys into fixed-size chunks and sends one JSON
//! array per chunk through the shared [`RpcClient`]. A chunk that fails is
//! logged and reported as a [`FetchWarning`]; its keys are simply missing
//! from the result. Only authentication failures abort a resolution.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::clock::Clock;
use super::layout::{
    MintState, PROGRAM_DATA_ADDRESS_OFFSET, PROGRAM_DATA_AUTHORITY_OFFSET, STAKE_WITHDRAWER_OFFSET,
    StakeAccountState, TOKEN_ACCOUNT_LEN, TOKEN_ACCOUNT_OWNER_OFFSET, TokenAccountState,
};
use super::pubkey::{Pubkey, programs};
use super::rpc::{
    AccountFilter, Encoding, KeyedAccount, RpcClient, RpcRequest, RpcResponse, UiAccount, WithContext,
};
use crate::error::{AssetError, Result};

/// Owners per `getProgramAccounts` / `getTokenAccountsByOwner` chunk.
pub const DEFAULT_TOKEN_BATCH_SIZE: usize = 5;
/// Addresses per `getAccountInfo` chunk.
pub const DEFAULT_ACCOUNT_BATCH_SIZE: usize = 25;
/// Pause between consecutive chunks of one resolution.
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(200);

/// Chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub token_batch_size: usize,
    pub account_batch_size: usize,
    pub chunk_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            token_batch_size: DEFAULT_TOKEN_BATCH_SIZE,
            account_batch_size: DEFAULT_ACCOUNT_BATCH_SIZE,
            chunk_delay: DEFAULT_CHUNK_DELAY,
        }
    }
}

// =============================================================================
// Partial Results
// =============================================================================

/// A chunk that was dropped from a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchWarning {
    /// Which lookup the chunk belonged to.
    pub stage: String,
    pub chunk_index: usize,
    pub addresses: Vec<Pubkey>,
    pub error: String,
}

/// Items that were resolved plus the chunks that were not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partial<T> {
    pub items: Vec<T>,
    pub warnings: Vec<FetchWarning>,
}

impl<T> Default for Partial<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl<T> Partial<T> {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Move `other`'s warnings into `self` and return its items.
    pub fn absorb<U>(&mut self, other: Partial<U>) -> Vec<U> {
        self.warnings.extend(other.warnings);
        other.items
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Partial<U> {
        Partial {
            items: self.items.into_iter().map(f).collect(),
            warnings: self.warnings,
        }
    }
}

// =============================================================================
// Raw Records
// =============================================================================

/// Decoded token account with its address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTokenAccount {
    pub address: Pubkey,
    pub lamports: u64,
    pub state: TokenAccountState,
}

/// Decoded stake account with the treasury it was looked up for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStakeAccount {
    pub address: Pubkey,
    pub treasury: Pubkey,
    pub lamports: u64,
    pub state: StakeAccountState,
}

/// Upgradeable program found through its program-data account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawProgram {
    pub address: Pubkey,
    pub program_data: Pubkey,
    pub authority: Pubkey,
}

// =============================================================================
// Resolver
// =============================================================================

/// Typed, chunked lookups over a shared [`RpcClient`].
pub struct BatchResolver {
    client: Arc<RpcClient>,
    clock: Arc<dyn Clock>,
    config: BatchConfig,
    token_program: Pubkey,
    stake_program: Pubkey,
    loader_program: Pubkey,
}

impl std::fmt::Debug for BatchResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchResolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BatchResolver {
    /// # Errors
    ///
    /// Never fails for the built-in program ids; kept fallible so the ids
    /// are parsed once here instead of at every call.
    pub fn new(client: Arc<RpcClient>, clock: Arc<dyn Clock>, config: BatchConfig) -> Result<Self> {
        Ok(Self {
            client,
            clock,
            config: BatchConfig {
                token_batch_size: config.token_batch_size.max(1),
                account_batch_size: config.account_batch_size.max(1),
                chunk_delay: config.chunk_delay,
            },
            token_program: programs::TOKEN_PROGRAM.parse()?,
            stake_program: programs::STAKE_PROGRAM.parse()?,
            loader_program: programs::UPGRADEABLE_LOADER.parse()?,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &BatchConfig {
        &self.config
    }

    #[must_use]
    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    /// Resolve `keys` in chunks of `batch_size`, one aggregate call per chunk.
    ///
    /// `build` makes the request for one key and `parse` turns its response
    /// into zero or more items. Any error inside a chunk drops the whole chunk.
    ///
    /// # Errors
    ///
    /// Returns an error only for authentication failures.
    pub async fn resolve_chunked<T, B, P>(
        &self,
        stage: &str,
        keys: &[Pubkey],
        batch_size: usize,
        build: B,
        parse: P,
    ) -> Result<Partial<T>>
    where
        B: Fn(&Pubkey) -> RpcRequest,
        P: Fn(&Pubkey, RpcResponse) -> Result<Vec<T>>,
    {
        let mut partial = Partial::default();
        let batch_size = batch_size.max(1);
        let chunk_count = keys.len().div_ceil(batch_size);

        for (chunk_index, chunk) in keys.chunks(batch_size).enumerate() {
            if chunk_index > 0 && !self.config.chunk_delay.is_zero() {
                self.clock.sleep(self.config.chunk_delay).await;
            }

            let requests = chunk.iter().map(&build).collect();
            let outcome = match self.client.call_batch(requests).await {
                Ok(responses) => chunk
                    .iter()
                    .zip(responses)
                    .try_fold(Vec::new(), |mut acc, (key, response)| {
                        acc.extend(parse(key, response)?);
                        Ok::<_, AssetError>(acc)
                    }),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(items) => {
                    tracing::trace!(stage, chunk_index, items = items.len(), "Chunk resolved");
                    partial.items.extend(items);
                }
                Err(e) if e.is_auth_failure() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        stage,
                        chunk = chunk_index + 1,
                        chunks = chunk_count,
                        addresses = chunk.len(),
                        error = %e,
                        "Chunk fetch failed, skipping"
                    );
                    partial.warnings.push(FetchWarning {
                        stage: stage.to_string(),
                        chunk_index,
                        addresses: chunk.to_vec(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            stage,
            keys = keys.len(),
            chunks = chunk_count,
            items = partial.items.len(),
            dropped = partial.warnings.len(),
            "Resolution finished"
        );
        Ok(partial)
    }

    /// Raw accounts by address; `None` where the node has no account.
    pub async fn accounts(&self, stage: &str, addresses: &[Pubkey]) -> Result<Partial<(Pubkey, Option<UiAccount>)>> {
        let commitment = self.client.commitment();
        self.resolve_chunked(
            stage,
            addresses,
            self.config.account_batch_size,
            |address| RpcRequest::get_account_info(address, Encoding::Base64, commitment),
            |address, response| {
                let account: WithContext<Option<UiAccount>> = response.into_result("getAccountInfo")?;
                Ok(vec![(*address, account.value)])
            },
        )
        .await
    }

    /// Mints by address; `None` where the account does not exist.
    pub async fn mint_accounts(&self, addresses: &[Pubkey]) -> Result<Partial<(Pubkey, Option<MintState>)>> {
        let raw = self.accounts("mints", addresses).await?;
        let mut partial = Partial {
            items: Vec::with_capacity(raw.items.len()),
            warnings: raw.warnings,
        };
        for (address, account) in raw.items {
            let mint = match account.map(|a| a.decode_data().and_then(|data| MintState::unpack(&address, &data))) {
                Some(Ok(mint)) => Some(mint),
                Some(Err(e)) => {
                    tracing::debug!(address = %address, error = %e, "Not a mint");
                    None
                }
                None => None,
            };
            partial.items.push((address, mint));
        }
        Ok(partial)
    }

    /// Lamport balance per address; `None` where the account does not exist.
    pub async fn balances(&self, addresses: &[Pubkey]) -> Result<Partial<(Pubkey, Option<u64>)>> {
        Ok(self
            .accounts("balances", addresses)
            .await?
            .map(|(address, account)| (address, account.map(|a| a.lamports))))
    }

    /// Token accounts whose owner field is one of `owners`.
    pub async fn token_accounts_by_owner(&self, owners: &[Pubkey]) -> Result<Partial<RawTokenAccount>> {
        let commitment = self.client.commitment();
        let token_program = self.token_program;
        self.resolve_chunked(
            "token_accounts",
            owners,
            self.config.token_batch_size,
            |owner| {
                RpcRequest::get_program_accounts(
                    &token_program,
                    &[
                        AccountFilter::DataSize(TOKEN_ACCOUNT_LEN),
                        AccountFilter::memcmp_key(TOKEN_ACCOUNT_OWNER_OFFSET, owner),
                    ],
                    None,
                    commitment,
                )
            },
            |_, response| {
                let accounts: Vec<KeyedAccount> = response.into_result("getProgramAccounts")?;
                accounts.iter().map(decode_token_account).collect()
            },
        )
        .await
    }

    /// Token accounts held by `owners`, via `getTokenAccountsByOwner`.
    pub async fn token_accounts_owned_by(&self, owners: &[Pubkey]) -> Result<Partial<RawTokenAccount>> {
        let commitment = self.client.commitment();
        let token_program = self.token_program;
        self.resolve_chunked(
            "treasury_token_accounts",
            owners,
            self.config.token_batch_size,
            |owner| RpcRequest::get_token_accounts_by_owner(owner, &token_program, commitment),
            |_, response| {
                let accounts: WithContext<Vec<KeyedAccount>> = response.into_result("getTokenAccountsByOwner")?;
                accounts.value.iter().map(decode_token_account).collect()
            },
        )
        .await
    }

    /// Stake accounts whose withdraw authority is one of `treasuries`.
    ///
    /// Accounts in states other than initialized or delegated are skipped.
    pub async fn stake_accounts(&self, treasuries: &[Pubkey]) -> Result<Partial<RawStakeAccount>> {
        let commitment = self.client.commitment();
        let stake_program = self.stake_program;
        self.resolve_chunked(
            "stake_accounts",
            treasuries,
            self.config.token_batch_size,
            |treasury| {
                RpcRequest::get_program_accounts(
                    &stake_program,
                    &[AccountFilter::memcmp_key(STAKE_WITHDRAWER_OFFSET, treasury)],
                    None,
                    commitment,
                )
            },
            |treasury, response| {
                let accounts: Vec<KeyedAccount> = response.into_result("getProgramAccounts")?;
                let mut stakes = Vec::with_capacity(accounts.len());
                for keyed in &accounts {
                    let address = keyed.address()?;
                    let data = keyed.account.decode_data()?;
                    match StakeAccountState::unpack(&address, &data) {
                        Ok(state) => stakes.push(RawStakeAccount {
                            address,
                            treasury: *treasury,
                            lamports: keyed.account.lamports,
                            state,
                        }),
                        Err(e) => tracing::debug!(address = %address, error = %e, "Skipping stake account"),
                    }
                }
                Ok(stakes)
            },
        )
        .await
    }

    /// Upgradeable programs whose upgrade authority is one of `authorities`.
    ///
    /// First finds program-data accounts naming the authority, then the
    /// program accounts pointing at each program-data account. Both hops
    /// request an empty data slice since only addresses are needed.
    pub async fn programs_by_authority(&self, authorities: &[Pubkey]) -> Result<Partial<RawProgram>> {
        let commitment = self.client.commitment();
        let loader = self.loader_program;

        let mut partial = Partial::default();
        let program_data = self
            .resolve_chunked(
                "program_data",
                authorities,
                self.config.token_batch_size,
                |authority| {
                    RpcRequest::get_program_accounts(
                        &loader,
                        &[AccountFilter::memcmp_key(PROGRAM_DATA_AUTHORITY_OFFSET, authority)],
                        Some((0, 0)),
                        commitment,
                    )
                },
                |authority, response| {
                    let accounts: Vec<KeyedAccount> = response.into_result("getProgramAccounts")?;
                    accounts
                        .iter()
                        .map(|keyed| Ok::<_, AssetError>((keyed.address()?, *authority)))
                        .collect()
                },
            )
            .await?;
        let program_data = partial.absorb(program_data);
        if program_data.is_empty() {
            return Ok(partial);
        }

        let data_addresses: Vec<Pubkey> = program_data.iter().map(|(address, _)| *address).collect();
        let programs = self
            .resolve_chunked(
                "programs",
                &data_addresses,
                self.config.token_batch_size,
                |data_address| {
                    RpcRequest::get_program_accounts(
                        &loader,
                        &[AccountFilter::memcmp_key(PROGRAM_DATA_ADDRESS_OFFSET, data_address)],
                        Some((0, 0)),
                        commitment,
                    )
                },
                |data_address, response| {
                    let accounts: Vec<KeyedAccount> = response.into_result("getProgramAccounts")?;
                    accounts
                        .iter()
                        .map(|keyed| Ok::<_, AssetError>((keyed.address()?, *data_address)))
                        .collect()
                },
            )
            .await?;

        for (address, data_address) in partial.absorb(programs) {
            if let Some((_, authority)) = program_data.iter().find(|(d, _)| *d == data_address) {
                partial.items.push(RawProgram {
                    address,
                    program_data: data_address,
                    authority: *authority,
                });
            }
        }
        Ok(partial)
    }

    /// Rent-exempt minimum for an account with no data.
    pub async fn rent_exempt_minimum(&self) -> Result<u64> {
        self.client.minimum_balance_for_rent_exemption(0).await
    }
}

fn decode_token_account(keyed: &KeyedAccount) -> Result<RawTokenAccount> {
    let address = keyed.address()?;
    let data = keyed.account.decode_data()?;
    Ok(RawTokenAccount {
        address,
        lamports: keyed.account.lamports,
        state: TokenAccountState::unpack(&address, &data)?,
    })
}
