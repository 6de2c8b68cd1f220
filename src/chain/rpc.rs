//! Minimal JSON-RPC client for the chain node
//!
//! Covers exactly the eth_* methods the client uses. Every call carries its
//! own timeout and runs inside the shared deadline-bounded retry loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::util::retry::{self, RetryPolicy};

/// JSON-RPC client handle
pub struct RpcClient {
    url: String,
    client: Client,
    next_id: AtomicU64,
    retry_policy: RetryPolicy,
}

impl RpcClient {
    /// Create a client for the node at `url` with a per-call timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::network(format!("building RPC client: {e}")))?;
        Ok(Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
            retry_policy: RetryPolicy::with_deadline(timeout),
        })
    }

    /// Issue one JSON-RPC call, retrying transient transport failures
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "rpc call");

        let response: Value = retry::with_retries(method, self.retry_policy, || {
            let body = body.clone();
            async move {
                let resp = self.client.post(&self.url).json(&body).send().await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(Error::network(format!("node returned status {status}")));
                }
                Ok(resp.json::<Value>().await?)
            }
        })
        .await?;

        if let Some(err) = response.get("error").filter(|e| !e.is_null()) {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown rpc error");
            return Err(Error::chain(format!("{method}: {message}")));
        }
        let result = response
            .get("result")
            .cloned()
            .ok_or_else(|| Error::chain(format!("{method}: response has no result")))?;
        Ok(serde_json::from_value(result)?)
    }

    /// `eth_chainId`
    pub async fn chain_id(&self) -> Result<u64> {
        let raw: String = self.call("eth_chainId", json!([])).await?;
        parse_quantity_u64(&raw)
    }

    /// `eth_syncing`; the node answers `false` or a progress object
    pub async fn syncing(&self) -> Result<bool> {
        let raw: Value = self.call("eth_syncing", json!([])).await?;
        Ok(!matches!(raw, Value::Bool(false)))
    }

    /// `eth_gasPrice` in wei
    pub async fn gas_price(&self) -> Result<U256> {
        let raw: String = self.call("eth_gasPrice", json!([])).await?;
        parse_quantity(&raw)
    }

    /// `eth_getBalance` at the latest block
    pub async fn balance(&self, address: Address) -> Result<U256> {
        let raw: String = self
            .call("eth_getBalance", json!([addr_param(address), "latest"]))
            .await?;
        parse_quantity(&raw)
    }

    /// `eth_getTransactionCount` at pending, for the next nonce
    pub async fn transaction_count(&self, address: Address) -> Result<u64> {
        let raw: String = self
            .call(
                "eth_getTransactionCount",
                json!([addr_param(address), "pending"]),
            )
            .await?;
        parse_quantity_u64(&raw)
    }

    /// `eth_call` against `to` with pre-encoded calldata
    pub async fn eth_call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>> {
        let raw: String = self
            .call(
                "eth_call",
                json!([{ "to": addr_param(to), "data": format!("0x{}", hex::encode(data)) }, "latest"]),
            )
            .await?;
        hex::decode(raw.trim_start_matches("0x"))
            .map_err(|e| Error::chain(format!("eth_call returned invalid hex: {e}")))
    }

    /// `eth_sendRawTransaction`
    pub async fn send_raw_transaction(&self, raw_tx: &[u8]) -> Result<B256> {
        let raw: String = self
            .call(
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(raw_tx))]),
            )
            .await?;
        let bytes = hex::decode(raw.trim_start_matches("0x"))
            .map_err(|e| Error::chain(format!("invalid tx hash: {e}")))?;
        if bytes.len() != 32 {
            return Err(Error::chain(format!("invalid tx hash length {}", bytes.len())));
        }
        Ok(B256::from_slice(&bytes))
    }
}

fn addr_param(address: Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

/// Parse a `0x`-prefixed quantity into a U256
pub fn parse_quantity(raw: &str) -> Result<U256> {
    let trimmed = raw.trim().trim_start_matches("0x");
    if trimmed.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(trimmed, 16).map_err(|e| Error::chain(format!("invalid quantity \"{raw}\": {e}")))
}

/// Parse a `0x`-prefixed quantity into a u64
pub fn parse_quantity_u64(raw: &str) -> Result<u64> {
    let value = parse_quantity(raw)?;
    value
        .try_into()
        .map_err(|_| Error::chain(format!("quantity \"{raw}\" exceeds u64")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), U256::ZERO);
        assert_eq!(parse_quantity("0x").unwrap(), U256::ZERO);
        assert_eq!(parse_quantity("0x3b9aca00").unwrap(), U256::from(1_000_000_000u64));
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_parse_quantity_u64() {
        assert_eq!(parse_quantity_u64("0x2a").unwrap(), 42);
        let too_big = format!("0x{}", "ff".repeat(32));
        assert!(parse_quantity_u64(&too_big).is_err());
    }
}
