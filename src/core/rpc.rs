//! JSON-RPC request builders, response types, and the rate-limited client.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::pubkey::Pubkey;
use super::rate_limiter::RateLimiter;
use crate::error::{AssetError, Result};

// =============================================================================
// Requests
// =============================================================================

/// Commitment level attached to every request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "processed" | "recent" => Some(Self::Processed),
            "confirmed" | "single" => Some(Self::Confirmed),
            "finalized" | "max" => Some(Self::Finalized),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }
}

/// Account data encoding requested from the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Base64,
    JsonParsed,
}

impl Encoding {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Base64 => "base64",
            Self::JsonParsed => "jsonParsed",
        }
    }
}

/// `getProgramAccounts` filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountFilter {
    DataSize(usize),
    Memcmp { offset: usize, bytes: Vec<u8> },
}

impl AccountFilter {
    #[must_use]
    pub fn memcmp_key(offset: usize, key: &Pubkey) -> Self {
        Self::Memcmp {
            offset,
            bytes: key.to_bytes().to_vec(),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::DataSize(size) => json!({ "dataSize": size }),
            Self::Memcmp { offset, bytes } => json!({
                "memcmp": { "offset": offset, "bytes": bs58::encode(bytes).into_string() }
            }),
        }
    }

    /// Whether `data` passes this filter. Mirrors the node's evaluation.
    #[must_use]
    pub fn matches(&self, data: &[u8]) -> bool {
        match self {
            Self::DataSize(size) => data.len() == *size,
            Self::Memcmp { offset, bytes } => data
                .get(*offset..offset + bytes.len())
                .is_some_and(|window| window == bytes.as_slice()),
        }
    }

    /// Parse the JSON form produced by [`AccountFilter::to_json`].
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        if let Some(size) = value.get("dataSize").and_then(Value::as_u64) {
            return usize::try_from(size).ok().map(Self::DataSize);
        }
        let memcmp = value.get("memcmp")?;
        let offset = usize::try_from(memcmp.get("offset")?.as_u64()?).ok()?;
        let bytes = bs58::decode(memcmp.get("bytes")?.as_str()?).into_vec().ok()?;
        Some(Self::Memcmp { offset, bytes })
    }
}

/// One JSON-RPC 2.0 request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl RpcRequest {
    fn new(method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: 0,
            method: method.to_string(),
            params,
        }
    }

    #[must_use]
    pub fn get_account_info(address: &Pubkey, encoding: Encoding, commitment: Commitment) -> Self {
        Self::new(
            "getAccountInfo",
            json!([address.to_string(), { "commitment": commitment.as_str(), "encoding": encoding.as_str() }]),
        )
    }

    #[must_use]
    pub fn get_multiple_accounts(addresses: &[Pubkey], commitment: Commitment) -> Self {
        let keys: Vec<String> = addresses.iter().map(ToString::to_string).collect();
        Self::new(
            "getMultipleAccounts",
            json!([keys, { "commitment": commitment.as_str(), "encoding": "base64" }]),
        )
    }

    /// `getProgramAccounts` with filters and an optional `(offset, length)` data slice.
    #[must_use]
    pub fn get_program_accounts(
        program: &Pubkey,
        filters: &[AccountFilter],
        data_slice: Option<(usize, usize)>,
        commitment: Commitment,
    ) -> Self {
        let mut config = json!({
            "commitment": commitment.as_str(),
            "encoding": "base64",
            "filters": filters.iter().map(AccountFilter::to_json).collect::<Vec<_>>(),
        });
        if let Some((offset, length)) = data_slice {
            config["dataSlice"] = json!({ "offset": offset, "length": length });
        }
        Self::new("getProgramAccounts", json!([program.to_string(), config]))
    }

    #[must_use]
    pub fn get_token_accounts_by_owner(owner: &Pubkey, token_program: &Pubkey, commitment: Commitment) -> Self {
        Self::new(
            "getTokenAccountsByOwner",
            json!([
                owner.to_string(),
                { "programId": token_program.to_string() },
                { "commitment": commitment.as_str(), "encoding": "base64" }
            ]),
        )
    }

    #[must_use]
    pub fn get_minimum_balance_for_rent_exemption(data_len: usize, commitment: Commitment) -> Self {
        Self::new(
            "getMinimumBalanceForRentExemption",
            json!([data_len, { "commitment": commitment.as_str() }]),
        )
    }

    /// First positional parameter as an address, if it is one.
    #[must_use]
    pub fn address_param(&self) -> Option<Pubkey> {
        self.params.get(0)?.as_str()?.parse().ok()
    }
}

// =============================================================================
// Responses
// =============================================================================

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// One JSON-RPC 2.0 response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    #[must_use]
    pub const fn success(id: u64, result: Value) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Deserialize the result, turning an error object into [`AssetError::Rpc`].
    pub fn into_result<T: serde::de::DeserializeOwned>(self, method: &str) -> Result<T> {
        if let Some(error) = self.error {
            return Err(AssetError::Rpc {
                method: method.to_string(),
                code: error.code,
                message: error.message,
            });
        }
        let result = self.result.unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|e| AssetError::ParseResponse(format!("{method}: {e}")))
    }
}

/// `{ context, value }` wrapper used by account queries.
#[derive(Debug, Clone, Deserialize)]
pub struct WithContext<T> {
    pub value: T,
}

/// Account as returned by the node with `base64` encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiAccount {
    pub lamports: u64,
    pub owner: String,
    pub data: Value,
    #[serde(default)]
    pub executable: bool,
}

impl UiAccount {
    /// Decode `["<base64>", "base64"]` data. Parsed JSON data yields an empty buffer.
    pub fn decode_data(&self) -> Result<Vec<u8>> {
        match &self.data {
            Value::Array(parts) => {
                let encoded = parts.first().and_then(Value::as_str).unwrap_or_default();
                BASE64
                    .decode(encoded)
                    .map_err(|e| AssetError::ParseResponse(format!("account data: {e}")))
            }
            Value::String(encoded) => BASE64
                .decode(encoded)
                .map_err(|e| AssetError::ParseResponse(format!("account data: {e}"))),
            _ => Ok(Vec::new()),
        }
    }

    #[must_use]
    pub fn from_bytes(lamports: u64, owner: &Pubkey, data: &[u8]) -> Self {
        Self {
            lamports,
            owner: owner.to_string(),
            data: json!([BASE64.encode(data), "base64"]),
            executable: false,
        }
    }
}

/// Entry of `getProgramAccounts` / `getTokenAccountsByOwner`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyedAccount {
    pub pubkey: String,
    pub account: UiAccount,
}

impl KeyedAccount {
    pub fn address(&self) -> Result<Pubkey> {
        self.pubkey.parse()
    }
}

// =============================================================================
// Transport & Client
// =============================================================================

/// Carries a batch of requests to a node and returns one response per request.
pub trait RpcTransport: Send + Sync {
    fn send_batch(&self, requests: Vec<RpcRequest>) -> BoxFuture<'_, Result<Vec<RpcResponse>>>;
}

/// Rate-limited JSON-RPC client shared by every resolver.
pub struct RpcClient {
    transport: Arc<dyn RpcTransport>,
    limiter: Arc<RateLimiter>,
    commitment: Commitment,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("commitment", &self.commitment)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl RpcClient {
    #[must_use]
    pub fn new(transport: Arc<dyn RpcTransport>, limiter: Arc<RateLimiter>, commitment: Commitment) -> Self {
        Self {
            transport,
            limiter,
            commitment,
        }
    }

    #[must_use]
    pub const fn commitment(&self) -> Commitment {
        self.commitment
    }

    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Send one aggregate call through the rate limiter.
    ///
    /// Requests are numbered in order and responses are returned in the same
    /// order, regardless of how the node ordered them.
    ///
    /// # Errors
    ///
    /// Returns transport errors, or a parse error if the node answered with
    /// fewer responses than requests.
    pub async fn call_batch(&self, mut requests: Vec<RpcRequest>) -> Result<Vec<RpcResponse>> {
        for (index, request) in requests.iter_mut().enumerate() {
            request.id = index as u64;
        }
        let expected = requests.len();
        let transport = &self.transport;
        let mut responses = self
            .limiter
            .schedule(|| transport.send_batch(requests.clone()))
            .await?;

        responses.sort_by_key(|r| r.id.unwrap_or(u64::MAX));
        if responses.len() != expected {
            return Err(AssetError::ParseResponse(format!(
                "expected {expected} responses, got {}",
                responses.len()
            )));
        }
        Ok(responses)
    }

    /// Send a single request and deserialize its result.
    pub async fn call<T: serde::de::DeserializeOwned>(&self, request: RpcRequest) -> Result<T> {
        let method = request.method.clone();
        let response = self
            .call_batch(vec![request])
            .await?
            .pop()
            .ok_or_else(|| AssetError::ParseResponse(format!("{method}: empty batch response")))?;
        response.into_result(&method)
    }

    /// Lamports needed for an account of `data_len` bytes to be rent exempt.
    pub async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64> {
        self.call(RpcRequest::get_minimum_balance_for_rent_exemption(
            data_len,
            self.commitment,
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_accounts_request_carries_filters_and_slice() {
        let program = Pubkey::new_from_array([1u8; 32]);
        let owner = Pubkey::new_from_array([2u8; 32]);
        let request = RpcRequest::get_program_accounts(
            &program,
            &[AccountFilter::DataSize(165), AccountFilter::memcmp_key(32, &owner)],
            Some((0, 0)),
            Commitment::Confirmed,
        );
        assert_eq!(request.method, "getProgramAccounts");
        let config = &request.params[1];
        assert_eq!(config["encoding"], "base64");
        assert_eq!(config["filters"][0]["dataSize"], 165);
        assert_eq!(config["filters"][1]["memcmp"]["offset"], 32);
        assert_eq!(config["filters"][1]["memcmp"]["bytes"], owner.to_string());
        assert_eq!(config["dataSlice"]["length"], 0);
    }

    #[test]
    fn filter_json_parses_back() {
        let filter = AccountFilter::Memcmp {
            offset: 0,
            bytes: vec![2, 0, 0, 0],
        };
        assert_eq!(AccountFilter::from_json(&filter.to_json()), Some(filter));
    }

    #[test]
    fn memcmp_outside_data_does_not_match() {
        let filter = AccountFilter::Memcmp {
            offset: 10,
            bytes: vec![1],
        };
        assert!(!filter.matches(&[0u8; 5]));
        assert!(filter.matches(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]));
    }

    #[test]
    fn error_object_becomes_rpc_error() {
        let response = RpcResponse {
            id: Some(0),
            result: None,
            error: Some(RpcErrorObject {
                code: -32602,
                message: "invalid params".to_string(),
            }),
        };
        let err = response.into_result::<Value>("getAccountInfo").unwrap_err();
        assert!(matches!(err, AssetError::Rpc { code: -32602, .. }));
    }

    #[test]
    fn account_data_round_trips_through_base64() {
        let owner = Pubkey::new_from_array([4u8; 32]);
        let account = UiAccount::from_bytes(10, &owner, &[1, 2, 3]);
        assert_eq!(account.decode_data().unwrap(), vec![1, 2, 3]);
    }
}
