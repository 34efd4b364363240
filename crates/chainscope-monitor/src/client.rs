//! JSON-RPC node client: the trait the monitor consumes plus an HTTP
//! implementation backed by `reqwest`.
//!
//! Error classification drives the monitor's retry behavior: transport
//! failures are retryable, RPC error objects and malformed responses are
//! protocol errors that eventually skip the block.

use std::collections::BTreeMap;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;

use chainscope_core::types::{AccountState, Block, InternalCall};

/// Errors from the node client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection-level failure; worth retrying.
    #[error("transport error: {0}")]
    Transport(String),

    /// The node returned a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The node's response did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Returns `true` if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Parse a `0x`-prefixed hex quantity. Empty strings decode to zero.
pub fn parse_hex_u64(s: &str) -> Result<u64, ClientError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| ClientError::Protocol(format!("bad hex quantity {s:?}: {e}")))
}

fn hex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_hex_u64(&s).map_err(serde::de::Error::custom)
}

fn hex_u64_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    s.map(|s| parse_hex_u64(&s).map_err(serde::de::Error::custom))
        .transpose()
}

/// Block header with transaction hashes, as returned by
/// `eth_getBlockByNumber` with `full_tx = false`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBlock {
    #[serde(deserialize_with = "hex_u64")]
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    #[serde(deserialize_with = "hex_u64")]
    pub timestamp: u64,
    #[serde(default)]
    pub transactions_root: Option<B256>,
    #[serde(default)]
    pub receipts_root: Option<B256>,
    #[serde(default)]
    pub state_root: Option<B256>,
    #[serde(default, deserialize_with = "hex_u64_opt")]
    pub gas_limit: Option<u64>,
    #[serde(default, deserialize_with = "hex_u64_opt")]
    pub gas_used: Option<u64>,
    #[serde(default)]
    pub transactions: Vec<B256>,
}

impl RawBlock {
    /// Convert into the persisted block shape.
    pub fn into_block(self) -> Block {
        Block {
            number: self.number,
            hash: self.hash,
            parent_hash: self.parent_hash,
            timestamp: self.timestamp,
            tx_root: self.transactions_root.unwrap_or_default(),
            receipt_root: self.receipts_root.unwrap_or_default(),
            state_root: self.state_root.unwrap_or_default(),
            gas_limit: self.gas_limit.unwrap_or_default(),
            gas_used: self.gas_used.unwrap_or_default(),
            transactions: self.transactions,
        }
    }
}

/// A transaction as returned by `eth_getTransactionByHash`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub hash: B256,
    #[serde(deserialize_with = "hex_u64")]
    pub block_number: u64,
    #[serde(rename = "transactionIndex", deserialize_with = "hex_u64")]
    pub index: u64,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: U256,
    #[serde(deserialize_with = "hex_u64")]
    pub gas: u64,
    #[serde(default)]
    pub input: Bytes,
}

/// A log entry inside a receipt.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
    #[serde(deserialize_with = "hex_u64")]
    pub log_index: u64,
}

/// A transaction receipt.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReceipt {
    #[serde(deserialize_with = "hex_u64")]
    pub status: u64,
    #[serde(deserialize_with = "hex_u64")]
    pub gas_used: u64,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub logs: Vec<RawLog>,
}

/// One call frame from the node's call tracer. Kept liberal — tracer
/// vocabularies and optional fields differ across client implementations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    #[serde(rename = "type", default)]
    pub call_type: String,
    #[serde(default)]
    pub from: Option<Address>,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default, deserialize_with = "hex_u64_opt")]
    pub gas: Option<u64>,
    #[serde(default, deserialize_with = "hex_u64_opt")]
    pub gas_used: Option<u64>,
    #[serde(default)]
    pub value: Option<U256>,
    #[serde(default)]
    pub input: Option<Bytes>,
    #[serde(default)]
    pub output: Option<Bytes>,
    #[serde(default)]
    pub calls: Vec<CallFrame>,
}

impl CallFrame {
    /// Flatten the descendants of this frame into internal calls. The top
    /// frame is the transaction itself and is not included.
    pub fn internal_calls(&self) -> Vec<InternalCall> {
        let mut out = Vec::new();
        for child in &self.calls {
            child.collect(&mut out);
        }
        out
    }

    fn collect(&self, out: &mut Vec<InternalCall>) {
        out.push(InternalCall {
            call_type: self.call_type.clone(),
            from: self.from.unwrap_or_default(),
            to: self.to,
            gas: self.gas.unwrap_or_default(),
            gas_used: self.gas_used.unwrap_or_default(),
            value: self.value.unwrap_or_default(),
            input: self.input.clone().unwrap_or_default(),
            output: self.output.clone().unwrap_or_default(),
        });
        for child in &self.calls {
            child.collect(out);
        }
    }
}

/// Per-transaction entry of a block trace.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockTrace {
    #[serde(default)]
    pub tx_hash: Option<B256>,
    #[serde(default)]
    pub result: Option<CallFrame>,
}

/// Storage dump as returned by the node; the root may come without a
/// `0x` prefix.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAccountDump {
    #[serde(default)]
    root: String,
    #[serde(default)]
    storage: BTreeMap<B256, String>,
}

impl RawAccountDump {
    fn into_account_state(self) -> Result<AccountState, ClientError> {
        let root = if self.root.is_empty() {
            B256::ZERO
        } else {
            let hex = self.root.strip_prefix("0x").unwrap_or(&self.root);
            format!("0x{hex}")
                .parse()
                .map_err(|e| ClientError::Protocol(format!("bad storage root: {e}")))?
        };
        Ok(AccountState {
            root,
            storage: self.storage,
        })
    }
}

/// The node operations the monitor consumes.
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn block_number(&self) -> Result<u64, ClientError>;

    async fn block_by_number(&self, number: u64) -> Result<RawBlock, ClientError>;

    async fn block_by_hash(&self, hash: B256) -> Result<RawBlock, ClientError>;

    async fn transaction_by_hash(&self, hash: B256) -> Result<RawTransaction, ClientError>;

    async fn transaction_receipt(&self, hash: B256) -> Result<RawReceipt, ClientError>;

    /// Per-transaction internal calls for a whole block.
    async fn trace_block(&self, number: u64) -> Result<Vec<BlockTrace>, ClientError>;

    /// One contract's storage snapshot at a block.
    async fn dump_account(
        &self,
        address: Address,
        block_number: u64,
    ) -> Result<AccountState, ClientError>;

    /// A stream of new head block numbers. Implementations without real
    /// subscriptions may long-poll.
    async fn subscribe_new_heads(&self) -> Result<mpsc::Receiver<u64>, ClientError>;
}

/// HTTP JSON-RPC client.
#[derive(Clone)]
pub struct HttpNodeClient {
    url: String,
    http: reqwest::Client,
    poll_interval: Duration,
}

impl HttpNodeClient {
    /// Create a client for the given endpoint. Calls time out after
    /// `timeout`; the head poller wakes every `poll_interval`.
    pub fn new(
        url: impl Into<String>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            http,
            poll_interval,
        })
    }

    /// Create with the default 30 s timeout and 2 s head polling.
    pub fn default_for(url: impl Into<String>) -> Result<Self, ClientError> {
        Self::new(url, Duration::from_secs(30), Duration::from_secs(2))
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ClientError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ClientError::Protocol(e.to_string()))?;

        if let Some(error) = body.get("error") {
            return Err(ClientError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }

        let result = body
            .get("result")
            .cloned()
            .ok_or_else(|| ClientError::Protocol("response missing 'result'".into()))?;
        if result.is_null() {
            return Err(ClientError::Protocol(format!("{method} returned null")));
        }
        serde_json::from_value(result).map_err(|e| ClientError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn block_number(&self) -> Result<u64, ClientError> {
        let hex: String = self.call("eth_blockNumber", json!([])).await?;
        parse_hex_u64(&hex)
    }

    async fn block_by_number(&self, number: u64) -> Result<RawBlock, ClientError> {
        self.call(
            "eth_getBlockByNumber",
            json!([format!("{number:#x}"), false]),
        )
        .await
    }

    async fn block_by_hash(&self, hash: B256) -> Result<RawBlock, ClientError> {
        self.call("eth_getBlockByHash", json!([hash, false])).await
    }

    async fn transaction_by_hash(&self, hash: B256) -> Result<RawTransaction, ClientError> {
        self.call("eth_getTransactionByHash", json!([hash])).await
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<RawReceipt, ClientError> {
        self.call("eth_getTransactionReceipt", json!([hash])).await
    }

    async fn trace_block(&self, number: u64) -> Result<Vec<BlockTrace>, ClientError> {
        self.call(
            "debug_traceBlockByNumber",
            json!([format!("{number:#x}"), {"tracer": "callTracer"}]),
        )
        .await
    }

    async fn dump_account(
        &self,
        address: Address,
        block_number: u64,
    ) -> Result<AccountState, ClientError> {
        let dump: RawAccountDump = self
            .call(
                "debug_dumpAddress",
                json!([address, format!("{block_number:#x}")]),
            )
            .await?;
        dump.into_account_state()
    }

    async fn subscribe_new_heads(&self) -> Result<mpsc::Receiver<u64>, ClientError> {
        let (tx, rx) = mpsc::channel(16);
        let client = self.clone();
        tokio::spawn(async move {
            let mut last = 0u64;
            loop {
                match client.block_number().await {
                    Ok(head) if head > last => {
                        last = head;
                        if tx.send(head).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "head poll failed");
                    }
                }
                tokio::time::sleep(client.poll_interval).await;
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_quantities() {
        assert_eq!(parse_hex_u64("0x1").unwrap(), 1);
        assert_eq!(parse_hex_u64("0xff").unwrap(), 255);
        assert_eq!(parse_hex_u64("0x").unwrap(), 0);
        assert!(parse_hex_u64("0xzz").is_err());
    }

    #[test]
    fn raw_block_deserializes_and_converts() {
        let json = json!({
            "number": "0x10",
            "hash": "0x00000000000000000000000000000000000000000000000000000000000000aa",
            "parentHash": "0x00000000000000000000000000000000000000000000000000000000000000a9",
            "timestamp": "0x5f5e100",
            "gasLimit": "0x1c9c380",
            "gasUsed": "0x5208",
            "transactions": [
                "0x0000000000000000000000000000000000000000000000000000000000000011",
            ],
        });
        let raw: RawBlock = serde_json::from_value(json).unwrap();
        let block = raw.into_block();
        assert_eq!(block.number, 16);
        assert_eq!(block.gas_used, 21_000);
        assert_eq!(block.transactions.len(), 1);
    }

    #[test]
    fn call_frame_flattens_descendants() {
        let frame = CallFrame {
            call_type: "CALL".into(),
            calls: vec![CallFrame {
                call_type: "STATICCALL".into(),
                to: Some(Address::with_last_byte(2)),
                calls: vec![CallFrame {
                    call_type: "DELEGATECALL".into(),
                    to: Some(Address::with_last_byte(3)),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        let internal = frame.internal_calls();
        assert_eq!(internal.len(), 2);
        assert_eq!(internal[0].call_type, "STATICCALL");
        assert_eq!(internal[1].call_type, "DELEGATECALL");
    }

    #[test]
    fn rpc_error_classification() {
        assert!(ClientError::Transport("timeout".into()).is_retryable());
        assert!(!ClientError::Protocol("garbage".into()).is_retryable());
        assert!(!ClientError::Rpc { code: -32000, message: "nope".into() }.is_retryable());
    }

    #[test]
    fn account_dump_accepts_unprefixed_root() {
        let dump = RawAccountDump {
            root: "73607aa4f228bd19dc95575d08adacede9550df70b9ca9253cb3abf7d8115990".into(),
            storage: Default::default(),
        };
        let state = dump.into_account_state().unwrap();
        assert_ne!(state.root, B256::ZERO);
    }
}
