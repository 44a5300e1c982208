//! Ethereum JSON-RPC client over HTTP.

use ambience_types::{ChainId, Receipt, TxHash};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::revert::decode_revert_hex;
use crate::{ChainClient, ChainError};

/// HTTP client for an Ethereum-compatible node.
///
/// Wraps `reqwest::Client` with the node URL and provides typed methods for
/// the handful of RPC methods the tracker needs.
#[derive(Debug)]
pub struct RpcChainClient {
    http: reqwest::Client,
    rpc_url: String,
    next_id: AtomicU64,
}

impl RpcChainClient {
    /// Create a client targeting the given URL (e.g. `http://127.0.0.1:8545`).
    pub fn new(rpc_url: impl Into<String>) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ChainError::Client(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            rpc_url: rpc_url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    /// The configured node URL.
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Send a JSON-RPC 2.0 request and return the `result` field.
    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(method, id, "rpc call");
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Transport(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ChainError::Transport(format!(
                "node returned HTTP {}",
                response.status()
            )));
        }

        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|e| ChainError::InvalidResponse(format!("{method}: {e}")))?;

        envelope.into_result()
    }

    /// The chain id reported by the node.
    pub async fn chain_id(&self) -> Result<ChainId, ChainError> {
        let result = self.rpc_call("eth_chainId", json!([])).await?;
        parse_quantity(&result).map(ChainId)
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn transaction_receipt(&self, hash: &TxHash) -> Result<Receipt, ChainError> {
        let result = self
            .rpc_call("eth_getTransactionReceipt", json!([hash.to_string()]))
            .await?;
        if result.is_null() {
            return Err(ChainError::NotYetMined);
        }
        parse_receipt(result)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let result = self.rpc_call("eth_blockNumber", json!([])).await?;
        parse_quantity(&result)
    }

    /// Replays the transaction with `eth_call` at its including block and
    /// decodes the revert payload.
    async fn revert_reason(
        &self,
        hash: &TxHash,
        receipt: &Receipt,
    ) -> Result<Option<String>, ChainError> {
        let tx = self
            .rpc_call("eth_getTransactionByHash", json!([hash.to_string()]))
            .await?;
        if tx.is_null() {
            return Ok(None);
        }
        let tx: RawTransaction = serde_json::from_value(tx)
            .map_err(|e| ChainError::InvalidResponse(format!("transaction: {e}")))?;

        let call = json!({
            "from": tx.from,
            "to": tx.to,
            "data": tx.input,
            "value": tx.value,
            "gas": tx.gas,
        });
        let block = format!("{:#x}", receipt.block_number);

        match self.rpc_call("eth_call", json!([call, block])).await {
            Ok(Value::String(data)) => Ok(decode_revert_hex(&data)),
            Ok(_) => Ok(None),
            Err(ChainError::Rpc { message, data, .. }) => Ok(data
                .as_deref()
                .and_then(decode_revert_hex)
                .or_else(|| reason_from_message(&message))),
            Err(e) => Err(e),
        }
    }
}

/// Pull the reason out of `"execution reverted: <reason>"` style messages.
fn reason_from_message(message: &str) -> Option<String> {
    message
        .strip_prefix("execution reverted: ")
        .filter(|reason| !reason.is_empty())
        .map(str::to_owned)
}

#[derive(Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

impl RpcEnvelope {
    /// An `error` object wins over `result`; a missing `result` reads as null.
    fn into_result(self) -> Result<Value, ChainError> {
        if let Some(err) = self.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
                data: err.data.and_then(|d| d.as_str().map(str::to_owned)),
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: TxHash,
    block_number: String,
    #[serde(default)]
    block_hash: Option<String>,
    /// Absent on pre-Byzantium receipts, which are treated as successful.
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    gas_used: Option<String>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    contract_address: Option<String>,
}

#[derive(Deserialize)]
struct RawTransaction {
    from: String,
    #[serde(default)]
    to: Option<String>,
    input: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    gas: Option<String>,
}

/// Convert an `eth_getTransactionReceipt` result into a [`Receipt`].
pub fn parse_receipt(value: Value) -> Result<Receipt, ChainError> {
    let raw: RawReceipt = serde_json::from_value(value)
        .map_err(|e| ChainError::InvalidResponse(format!("receipt: {e}")))?;

    let success = match raw.status.as_deref() {
        None => true,
        Some(s) => parse_hex_u64(s)? == 1,
    };
    let gas_used = match raw.gas_used.as_deref() {
        Some(g) => parse_hex_u64(g)?,
        None => 0,
    };

    Ok(Receipt {
        transaction_hash: raw.transaction_hash,
        block_number: parse_hex_u64(&raw.block_number)?,
        block_hash: raw.block_hash,
        success,
        gas_used,
        from: raw.from,
        to: raw.to,
        contract_address: raw.contract_address,
    })
}

fn parse_quantity(value: &Value) -> Result<u64, ChainError> {
    let s = value
        .as_str()
        .ok_or_else(|| ChainError::InvalidResponse(format!("expected hex quantity, got {value}")))?;
    parse_hex_u64(s)
}

fn parse_hex_u64(s: &str) -> Result<u64, ChainError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::InvalidResponse(format!("quantity without 0x prefix: {s}")))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| ChainError::InvalidResponse(format!("bad quantity {s}: {e}")))
}
