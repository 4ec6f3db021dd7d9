//! JSON-RPC log source for an Ethereum-style node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use storesync_core::{decode_hex, encode_hex, Address, EventKind, LogRecord, TxHash};
use tracing::{trace, warn};

use crate::source::{LogSource, SourceError};

pub struct RpcLogSource {
    endpoint: String,
    agent: ureq::Agent,
    timeout: Duration,
    address: Option<Address>,
    next_id: AtomicU64,
}

impl RpcLogSource {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            endpoint: endpoint.into(),
            agent,
            timeout,
            address: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// Only ask for records emitted by `address`.
    pub fn with_address(mut self, address: Option<Address>) -> Self {
        self.address = address;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, method: &'static str, params: Value) -> Result<Value, SourceError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
            .to_string();
        trace!(method, id, "rpc request");

        let agent = self.agent.clone();
        let endpoint = self.endpoint.clone();
        let task = tokio::task::spawn_blocking(move || post(&agent, &endpoint, body));
        let text = match tokio::time::timeout(self.timeout, task).await {
            Err(_) => return Err(SourceError::Timeout(self.timeout)),
            Ok(Err(join)) => return Err(SourceError::Transport(join.to_string())),
            Ok(Ok(result)) => result?,
        };
        parse_response(&text)
    }
}

fn post(agent: &ureq::Agent, endpoint: &str, body: String) -> Result<String, SourceError> {
    let mut response = agent
        .post(endpoint)
        .header("Content-Type", "application/json")
        .send(body)
        .map_err(|e| SourceError::Transport(format!("request failed: {e}")))?;
    response
        .body_mut()
        .read_to_string()
        .map_err(|e| SourceError::Transport(format!("failed to read response: {e}")))
}

#[async_trait]
impl LogSource for RpcLogSource {
    async fn chain_id(&self) -> Result<u64, SourceError> {
        parse_quantity(&self.call("eth_chainId", json!([])).await?)
    }

    async fn latest_height(&self) -> Result<u64, SourceError> {
        parse_quantity(&self.call("eth_blockNumber", json!([])).await?)
    }

    async fn fetch_logs(&self, from: u64, to: u64) -> Result<Vec<LogRecord>, SourceError> {
        let result = self.call("eth_getLogs", json!([log_filter(from, to, self.address)])).await?;
        let Value::Array(items) = result else {
            return Err(SourceError::Malformed("eth_getLogs result is not an array".into()));
        };
        Ok(parse_logs(&items))
    }
}

/// Parse a `eth_getLogs` result. Entries the node got wrong are dropped one
/// by one so they cannot hold back the rest of the range.
fn parse_logs(items: &[Value]) -> Vec<LogRecord> {
    items
        .iter()
        .enumerate()
        .filter_map(|(position, item)| match parse_log(item) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(position, error = %e, "dropping malformed log entry");
                None
            }
        })
        .collect()
}

fn log_filter(from: u64, to: u64, address: Option<Address>) -> Value {
    let topics: Vec<String> = EventKind::ALL
        .iter()
        .map(|kind| encode_hex(&kind.topic()))
        .collect();
    let mut filter = json!({
        "fromBlock": format!("0x{from:x}"),
        "toBlock": format!("0x{to:x}"),
        "topics": [topics],
    });
    if let Some(address) = address {
        filter["address"] = json!(address.to_hex());
    }
    filter
}

fn parse_response(text: &str) -> Result<Value, SourceError> {
    let mut response: Value =
        serde_json::from_str(text).map_err(|e| SourceError::Malformed(e.to_string()))?;
    if let Some(error) = response.get("error") {
        return Err(SourceError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }
    match response.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(SourceError::Malformed("response has neither result nor error".into())),
    }
}

fn parse_quantity(value: &Value) -> Result<u64, SourceError> {
    let text = value
        .as_str()
        .ok_or_else(|| SourceError::Malformed(format!("expected hex quantity, got {value}")))?;
    let digits = text.strip_prefix("0x").unwrap_or(text);
    u64::from_str_radix(digits, 16)
        .map_err(|e| SourceError::Malformed(format!("bad quantity {text}: {e}")))
}

fn hex_field(log: &Value, name: &str) -> Result<Vec<u8>, SourceError> {
    let text = log
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| SourceError::Malformed(format!("log missing {name}")))?;
    decode_hex(text).map_err(|e| SourceError::Malformed(format!("{name}: {e}")))
}

fn quantity_field(log: &Value, name: &str) -> Result<u64, SourceError> {
    let value = log
        .get(name)
        .ok_or_else(|| SourceError::Malformed(format!("log missing {name}")))?;
    parse_quantity(value)
}

fn parse_log(log: &Value) -> Result<LogRecord, SourceError> {
    let malformed = |e: storesync_core::CoreError| SourceError::Malformed(e.to_string());
    let topics = log
        .get("topics")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::Malformed("log missing topics".into()))?
        .iter()
        .map(|t| {
            let bytes = decode_hex(t.as_str().unwrap_or_default()).map_err(malformed)?;
            <[u8; 32]>::try_from(bytes.as_slice())
                .map_err(|_| SourceError::Malformed(format!("topic {t} is not 32 bytes")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LogRecord {
        address: Address::from_slice(&hex_field(log, "address")?).map_err(malformed)?,
        topics,
        data: hex_field(log, "data")?,
        block_number: quantity_field(log, "blockNumber")?,
        log_index: quantity_field(log, "logIndex")?,
        tx_hash: TxHash::from_slice(&hex_field(log, "transactionHash")?).map_err(malformed)?,
        removed: log.get("removed").and_then(Value::as_bool).unwrap_or(false),
    })
}
