//! Test utilities for realm-assets.
//!
//! Provides a virtual clock, an in-memory cluster that answers JSON-RPC
//! batches, temp directories, and assertion macros.
//!
//! # Usage
//!
//! ```rust,ignore
//! use realm_assets::test_utils::*;
//!
//! let cluster = MockCluster::new();
//! cluster.insert_mint(&mint, Some(&authority), 1_000, 6);
//! let clock = ManualClock::new();
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::{self, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{Value, json};

use crate::core::clock::Clock;
use crate::core::layout::{self, StakeState, TOKEN_ACCOUNT_LEN, TOKEN_ACCOUNT_OWNER_OFFSET};
use crate::core::pubkey::{Pubkey, programs};
use crate::core::rpc::{AccountFilter, RpcErrorObject, RpcRequest, RpcResponse, RpcTransport, UiAccount};
use crate::error::{AssetError, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Deterministic address for fixtures: `n` in the first bytes, padded with a tag.
#[must_use]
pub fn make_test_pubkey(n: u32) -> Pubkey {
    let mut bytes = [0x5a; 32];
    bytes[..4].copy_from_slice(&n.to_le_bytes());
    Pubkey::new_from_array(bytes)
}

fn builtin(id: &str) -> Pubkey {
    id.parse().unwrap_or_default()
}

// =============================================================================
// Manual Clock
// =============================================================================

/// Virtual clock: `sleep` advances time instantly and records the request.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested so far, in order.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }

    pub fn clear_sleeps(&self) {
        lock(&self.sleeps).clear();
    }

    /// Move time forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        *lock(&self.now) += by;
    }

    /// Total time spent sleeping.
    #[must_use]
    pub fn slept(&self) -> Duration {
        lock(&self.sleeps).iter().sum()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *lock(&self.now)
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.advance(duration);
        lock(&self.sleeps).push(duration);
        Box::pin(futures::future::ready(()))
    }
}

// =============================================================================
// Mock Cluster
// =============================================================================

/// Account stored in a [`MockCluster`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockAccount {
    pub owner: Pubkey,
    pub lamports: u64,
    pub data: Vec<u8>,
}

/// In-memory node answering the JSON-RPC methods the scanner uses.
///
/// Rent follows the mainnet schedule, so an empty account needs 890 880
/// lamports and a token account 2 039 280.
#[derive(Debug, Default)]
pub struct MockCluster {
    accounts: Mutex<BTreeMap<Pubkey, MockAccount>>,
    batch_failures: Mutex<HashMap<usize, AssetError>>,
    failing_addresses: Mutex<HashSet<Pubkey>>,
    requests: Mutex<Vec<RpcRequest>>,
    batches: AtomicUsize,
}

impl MockCluster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lamports for rent exemption of `data_len` bytes.
    #[must_use]
    pub const fn rent_exempt_minimum(data_len: usize) -> u64 {
        (128 + data_len as u64) * 6_960
    }

    pub fn insert(&self, address: Pubkey, owner: Pubkey, lamports: u64, data: Vec<u8>) {
        lock(&self.accounts).insert(address, MockAccount { owner, lamports, data });
    }

    /// System-owned account holding only lamports.
    pub fn insert_wallet(&self, address: &Pubkey, lamports: u64) {
        self.insert(*address, Pubkey::default(), lamports, Vec::new());
    }

    pub fn insert_mint(&self, address: &Pubkey, authority: Option<&Pubkey>, supply: u64, decimals: u8) {
        self.insert(
            *address,
            builtin(programs::TOKEN_PROGRAM),
            Self::rent_exempt_minimum(layout::MINT_LEN),
            layout::pack::mint(authority, supply, decimals),
        );
    }

    pub fn insert_token_account(&self, address: &Pubkey, mint: &Pubkey, owner: &Pubkey, amount: u64, frozen: bool) {
        self.insert(
            *address,
            builtin(programs::TOKEN_PROGRAM),
            Self::rent_exempt_minimum(TOKEN_ACCOUNT_LEN),
            layout::pack::token_account(mint, owner, amount, frozen),
        );
    }

    pub fn insert_stake(&self, address: &Pubkey, state: StakeState, withdrawer: &Pubkey, voter: Option<&Pubkey>, lamports: u64) {
        self.insert(
            *address,
            builtin(programs::STAKE_PROGRAM),
            lamports,
            layout::pack::stake_account(state, withdrawer, voter),
        );
    }

    /// Program plus program-data account upgradeable by `authority`.
    pub fn insert_program(&self, program: &Pubkey, program_data: &Pubkey, authority: &Pubkey) {
        let loader = builtin(programs::UPGRADEABLE_LOADER);
        self.insert(*program_data, loader, 1_000_000, layout::pack::program_data(authority));
        self.insert(*program, loader, 1_000_000, layout::pack::program(program_data));
    }

    pub fn insert_governance(&self, program_id: &Pubkey, address: &Pubkey, account_type: u8, realm: &Pubkey, governed: &Pubkey) {
        self.insert(
            *address,
            *program_id,
            Self::rent_exempt_minimum(120),
            layout::pack::governance(account_type, realm, governed),
        );
    }

    pub fn insert_realm(&self, program_id: &Pubkey, address: &Pubkey, community_mint: &Pubkey, council_mint: Option<&Pubkey>) {
        self.insert(
            *address,
            *program_id,
            Self::rent_exempt_minimum(160),
            layout::pack::realm(community_mint, council_mint),
        );
    }

    pub fn remove(&self, address: &Pubkey) {
        lock(&self.accounts).remove(address);
    }

    /// Make the `n`th batch (1-based) fail with `error` instead of answering.
    pub fn fail_batch(&self, n: usize, error: AssetError) {
        lock(&self.batch_failures).insert(n, error);
    }

    /// Answer every request naming `address` with a JSON-RPC error.
    pub fn fail_address(&self, address: &Pubkey) {
        lock(&self.failing_addresses).insert(*address);
    }

    /// Number of batches received.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// Every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<RpcRequest> {
        lock(&self.requests).clone()
    }

    /// Requests received for `method`.
    #[must_use]
    pub fn requests_for(&self, method: &str) -> usize {
        lock(&self.requests).iter().filter(|r| r.method == method).count()
    }

    fn answer(&self, request: &RpcRequest) -> RpcResponse {
        let id = request.id;
        if request
            .address_param()
            .is_some_and(|address| lock(&self.failing_addresses).contains(&address))
        {
            return error_response(id, -32_005, "node is behind");
        }
        let config = request.params.get(1).cloned().unwrap_or(Value::Null);
        match request.method.as_str() {
            "getAccountInfo" => {
                let value = request
                    .address_param()
                    .and_then(|address| self.ui_account(&address, None));
                RpcResponse::success(id, json!({ "context": { "slot": 1 }, "value": value }))
            }
            "getMultipleAccounts" => {
                let values: Vec<Value> = request.params[0]
                    .as_array()
                    .map(|keys| {
                        keys.iter()
                            .map(|k| {
                                k.as_str()
                                    .and_then(|k| k.parse().ok())
                                    .and_then(|address| self.ui_account(&address, None))
                                    .map_or(Value::Null, |a| json!(a))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                RpcResponse::success(id, json!({ "context": { "slot": 1 }, "value": values }))
            }
            "getProgramAccounts" => {
                let Some(program) = request.address_param() else {
                    return error_response(id, -32_602, "invalid program id");
                };
                let filters: Vec<AccountFilter> = config["filters"]
                    .as_array()
                    .map(|f| f.iter().filter_map(AccountFilter::from_json).collect())
                    .unwrap_or_default();
                let slice = config.get("dataSlice").map(|s| {
                    (
                        s["offset"].as_u64().unwrap_or(0) as usize,
                        s["length"].as_u64().unwrap_or(0) as usize,
                    )
                });
                RpcResponse::success(id, json!(self.keyed(&program, &filters, slice)))
            }
            "getTokenAccountsByOwner" => {
                let Some(owner) = request.address_param() else {
                    return error_response(id, -32_602, "invalid owner");
                };
                let token_program = builtin(programs::TOKEN_PROGRAM);
                let filters = [
                    AccountFilter::DataSize(TOKEN_ACCOUNT_LEN),
                    AccountFilter::memcmp_key(TOKEN_ACCOUNT_OWNER_OFFSET, &owner),
                ];
                let value = self.keyed(&token_program, &filters, None);
                RpcResponse::success(id, json!({ "context": { "slot": 1 }, "value": value }))
            }
            "getMinimumBalanceForRentExemption" => {
                let len = request.params[0].as_u64().unwrap_or(0) as usize;
                RpcResponse::success(id, json!(Self::rent_exempt_minimum(len)))
            }
            other => error_response(id, -32_601, &format!("method not found: {other}")),
        }
    }

    fn ui_account(&self, address: &Pubkey, slice: Option<(usize, usize)>) -> Option<UiAccount> {
        let accounts = lock(&self.accounts);
        let account = accounts.get(address)?;
        Some(UiAccount::from_bytes(account.lamports, &account.owner, &sliced(&account.data, slice)))
    }

    fn keyed(&self, program: &Pubkey, filters: &[AccountFilter], slice: Option<(usize, usize)>) -> Vec<Value> {
        lock(&self.accounts)
            .iter()
            .filter(|(_, account)| account.owner == *program)
            .filter(|(_, account)| filters.iter().all(|f| f.matches(&account.data)))
            .map(|(address, account)| {
                json!({
                    "pubkey": address.to_string(),
                    "account": UiAccount::from_bytes(account.lamports, &account.owner, &sliced(&account.data, slice)),
                })
            })
            .collect()
    }
}

fn sliced(data: &[u8], slice: Option<(usize, usize)>) -> Vec<u8> {
    match slice {
        Some((offset, length)) => data.iter().skip(offset).take(length).copied().collect(),
        None => data.to_vec(),
    }
}

fn error_response(id: u64, code: i64, message: &str) -> RpcResponse {
    RpcResponse {
        id: Some(id),
        result: None,
        error: Some(RpcErrorObject {
            code,
            message: message.to_string(),
        }),
    }
}

impl RpcTransport for MockCluster {
    fn send_batch(&self, requests: Vec<RpcRequest>) -> BoxFuture<'_, Result<Vec<RpcResponse>>> {
        let n = self.batches.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.requests).extend(requests.iter().cloned());
        let failure = lock(&self.batch_failures).remove(&n);
        let result = match failure {
            Some(error) => Err(error),
            None => Ok(requests.iter().rev().map(|r| self.answer(r)).collect()),
        };
        Box::pin(futures::future::ready(result))
    }
}

// =============================================================================
// Temp Directory Utilities
// =============================================================================

/// A temporary directory for tests with automatic cleanup.
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Create a file with the given content, creating parent directories as needed.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be created or written.
    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.inner.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        let mut file = fs::File::create(&path).expect("Failed to create test file");
        file.write_all(content.as_bytes())
            .expect("Failed to write test file");
        path
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read_file(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.inner.path().join(name))
    }

    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Assertion Macros
// =============================================================================

/// Assert that a string contains a substring.
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            haystack.contains(needle),
            "Expected string to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

/// Assert that a string does NOT contain a substring.
#[macro_export]
macro_rules! assert_not_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            !haystack.contains(needle),
            "Expected string NOT to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

/// Assert that a string is valid JSON.
#[macro_export]
macro_rules! assert_json_valid {
    ($json:expr) => {
        let json = $json;
        if let Err(e) = serde_json::from_str::<serde_json::Value>(json) {
            panic!("Expected valid JSON, but parsing failed: {}\n\nJSON string:\n{}", e, json);
        }
    };
}
