//! Ledger RPC client used by the dispatcher and the confirmation tracker.

use crate::error::{FaucetError, FaucetResult};
use async_trait::async_trait;
use spigot_common::types::{Address, Hash};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Terminal status of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    /// 1 on success, 0 when execution failed.
    pub status: u64,
    pub block_number: Option<u64>,
}

impl Receipt {
    pub fn succeeded(&self) -> bool {
        self.status == 1
    }
}

/// The ledger operations the faucet core depends on.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn chain_id(&self) -> FaucetResult<u64>;

    async fn balance_at(&self, address: &Address) -> FaucetResult<u128>;

    /// Next ordering counter for `address`, counting pending transactions.
    async fn pending_nonce_at(&self, address: &Address) -> FaucetResult<u64>;

    async fn suggest_gas_price(&self) -> FaucetResult<u128>;

    async fn send_raw_transaction(&self, raw: &[u8]) -> FaucetResult<Hash>;

    /// `Ok(None)` while the transaction is not yet known to be mined.
    async fn transaction_receipt(&self, tx_hash: &Hash) -> FaucetResult<Option<Receipt>>;
}

/// Opens a ledger client for one endpoint.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, endpoint: &str, timeout: Duration) -> FaucetResult<Arc<dyn LedgerClient>>;
}

/// Runs a ledger call under a deadline.
pub async fn with_timeout<T, F>(duration: Duration, fut: F) -> FaucetResult<T>
where
    F: Future<Output = FaucetResult<T>>,
{
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| FaucetError::RpcError(format!("timed out after {:?}", duration)))?
}

/// JSON-RPC 2.0 client for Ethereum-compatible endpoints.
pub struct JsonRpcClient {
    rpc_url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(rpc_url: String, timeout: Duration) -> FaucetResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FaucetError::InternalError(format!("cannot build http client: {}", e)))?;
        Ok(Self {
            rpc_url,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> FaucetResult<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id
        });
        debug!(method, id, url = %self.rpc_url, "rpc call");

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| FaucetError::RpcError(format!("Request failed: {}", e)))?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FaucetError::RpcError(format!("Invalid response: {}", e)))?;

        if let Some(error) = json.get("error") {
            return Err(FaucetError::RpcError(format!("{}: {}", method, error)));
        }

        Ok(json
            .get("result")
            .cloned()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn call_quantity(&self, method: &str, params: serde_json::Value) -> FaucetResult<u128> {
        let result = self.call(method, params).await?;
        parse_quantity(&result)
    }
}

#[async_trait]
impl LedgerClient for JsonRpcClient {
    async fn chain_id(&self) -> FaucetResult<u64> {
        let result = self.call("eth_chainId", serde_json::json!([])).await?;
        parse_u64_quantity(&result, "chain id")
    }

    async fn balance_at(&self, address: &Address) -> FaucetResult<u128> {
        self.call_quantity("eth_getBalance", serde_json::json!([address.to_string(), "latest"]))
            .await
    }

    async fn pending_nonce_at(&self, address: &Address) -> FaucetResult<u64> {
        let result = self
            .call(
                "eth_getTransactionCount",
                serde_json::json!([address.to_string(), "pending"]),
            )
            .await?;
        parse_u64_quantity(&result, "nonce")
    }

    async fn suggest_gas_price(&self) -> FaucetResult<u128> {
        self.call_quantity("eth_gasPrice", serde_json::json!([])).await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> FaucetResult<Hash> {
        let result = self
            .call(
                "eth_sendRawTransaction",
                serde_json::json!([format!("0x{}", hex::encode(raw))]),
            )
            .await?;
        result
            .as_str()
            .ok_or_else(|| FaucetError::RpcError("missing transaction hash".to_string()))?
            .parse()
            .map_err(|e| FaucetError::RpcError(format!("invalid transaction hash: {}", e)))
    }

    async fn transaction_receipt(&self, tx_hash: &Hash) -> FaucetResult<Option<Receipt>> {
        let result = self
            .call(
                "eth_getTransactionReceipt",
                serde_json::json!([tx_hash.to_string()]),
            )
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let status = result
            .get("status")
            .ok_or_else(|| FaucetError::RpcError("receipt without status".to_string()))?;
        let block_number = match result.get("blockNumber") {
            Some(v) if !v.is_null() => Some(parse_u64_quantity(v, "block number")?),
            _ => None,
        };
        Ok(Some(Receipt {
            status: parse_u64_quantity(status, "receipt status")?,
            block_number,
        }))
    }
}

/// Parses a hex `QUANTITY` ("0x1a").
pub fn parse_quantity(value: &serde_json::Value) -> FaucetResult<u128> {
    let s = value
        .as_str()
        .ok_or_else(|| FaucetError::RpcError(format!("expected hex quantity, got {}", value)))?;
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| FaucetError::RpcError(format!("invalid quantity {}: {}", s, e)))
}

/// Parses a hex `QUANTITY` that must fit a u64.
pub fn parse_u64_quantity(value: &serde_json::Value, what: &str) -> FaucetResult<u64> {
    let quantity = parse_quantity(value)?;
    u64::try_from(quantity)
        .map_err(|_| FaucetError::RpcError(format!("{} out of range: {}", what, quantity)))
}

/// Dials HTTP(S) JSON-RPC endpoints.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpDialer;

#[async_trait]
impl Dialer for HttpDialer {
    async fn dial(&self, endpoint: &str, timeout: Duration) -> FaucetResult<Arc<dyn LedgerClient>> {
        let url = reqwest::Url::parse(endpoint)
            .map_err(|e| FaucetError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FaucetError::InvalidEndpoint(format!(
                "{}: unsupported scheme {}",
                endpoint,
                url.scheme()
            )));
        }
        Ok(Arc::new(JsonRpcClient::new(endpoint.to_string(), timeout)?))
    }
}
