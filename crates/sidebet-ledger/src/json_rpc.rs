//! EVM JSON-RPC transport over HTTP.
//!
//! Reads and receipts go to the public RPC endpoint. Transactions from
//! senders held in [`LocalKeys`] are signed here and sent raw to the same
//! endpoint. Any other sender's transactions go to the signer endpoint as
//! `eth_sendTransaction`, authenticated by bearer credential.
//!
//! A send whose request may have reached the node but whose answer was lost
//! is never reported as `LedgerUnavailable`: the transaction may be pooled.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use sidebet_types::{Address, LedgerConfig, Result, SidebetError, TxHash, TxReceipt};
use tokio::sync::OnceCell;

use crate::abi::decode_hex_payload;
use crate::call::{ContractCall, ReadCall, ReadValue, TxRequest};
use crate::signing::{LocalKeys, SignedTx};
use crate::transport::LedgerTransport;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-RPC error code for execution reverted.
const EXECUTION_REVERTED: i64 = 3;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Clone, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// An HTTP exchange that produced no usable JSON-RPC response.
#[derive(Debug)]
struct PostFailure {
    reason: String,
    /// The request may have been acted on.
    delivered: bool,
}

impl PostFailure {
    fn sending(method: &str, err: &reqwest::Error) -> Self {
        Self {
            reason: format!("{method}: {err}"),
            // refused connections and unbuildable requests never left us
            delivered: !(err.is_connect() || err.is_builder()),
        }
    }

    fn status(method: &str, status: StatusCode) -> Self {
        Self {
            reason: format!("{method}: HTTP {status}"),
            delivered: status.is_server_error(),
        }
    }

    fn body(method: &str, err: &reqwest::Error) -> Self {
        Self {
            reason: format!("{method}: bad response body: {err}"),
            delivered: true,
        }
    }

    /// For reads, any failure just means the node could not be asked.
    fn into_unavailable(self) -> SidebetError {
        SidebetError::unavailable(self.reason)
    }

    fn into_submit_error(self, tx: &TxRequest) -> SidebetError {
        if self.delivered {
            SidebetError::SubmissionUncertain {
                sender: tx.from,
                nonce: tx.nonce,
                reason: self.reason,
            }
        } else {
            SidebetError::unavailable(self.reason)
        }
    }
}

pub struct JsonRpcTransport {
    client: Client,
    rpc_url: String,
    signer_url: String,
    credential: Option<String>,
    bytecode: Option<Vec<u8>>,
    keys: Option<Arc<LocalKeys>>,
    chain_id: OnceCell<u64>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for JsonRpcTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcTransport")
            .field("rpc_url", &self.rpc_url)
            .field("signer_url", &self.signer_url)
            .field("has_credential", &self.credential.is_some())
            .field("bytecode_len", &self.bytecode.as_ref().map(Vec::len))
            .field("local_keys", &self.keys.as_ref().map(|k| k.len()))
            .finish_non_exhaustive()
    }
}

impl JsonRpcTransport {
    /// Build a transport from ledger settings, loading the contract
    /// artifact if one is configured.
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| SidebetError::Configuration(format!("HTTP client: {e}")))?;
        let bytecode = config
            .contract_artifact
            .as_deref()
            .map(load_bytecode)
            .transpose()?;
        Ok(Self {
            client,
            rpc_url: config.rpc_url.clone(),
            signer_url: config.signer_endpoint().to_string(),
            credential: config.signer_credential.clone(),
            bytecode,
            keys: None,
            chain_id: OnceCell::new(),
            next_id: AtomicU64::new(1),
        })
    }

    #[must_use]
    pub fn with_bytecode(mut self, bytecode: Vec<u8>) -> Self {
        self.bytecode = Some(bytecode);
        self
    }

    /// Sign locally for every sender `keys` holds.
    #[must_use]
    pub fn with_keys(mut self, keys: Arc<LocalKeys>) -> Self {
        self.keys = Some(keys);
        self
    }

    async fn post(
        &self,
        signer: bool,
        method: &str,
        params: Value,
    ) -> std::result::Result<RpcResponse, PostFailure> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });
        let url = if signer { &self.signer_url } else { &self.rpc_url };
        let mut req = self.client.post(url).json(&payload);
        if signer {
            if let Some(token) = &self.credential {
                req = req.bearer_auth(token);
            }
        }

        let response = req
            .send()
            .await
            .map_err(|e| PostFailure::sending(method, &e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PostFailure::status(method, status));
        }
        response
            .json()
            .await
            .map_err(|e| PostFailure::body(method, &e))
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let body = self
            .post(false, method, params)
            .await
            .map_err(PostFailure::into_unavailable)?;
        if let Some(err) = body.error {
            return Err(RpcFailure(err).into_error(None));
        }
        Ok(body.result.unwrap_or(Value::Null))
    }

    fn deploy_data(&self, call: &ContractCall) -> Result<Vec<u8>> {
        let args = call.calldata();
        match call {
            ContractCall::Instantiate(_) => {
                let code = self.bytecode.as_ref().ok_or_else(|| {
                    SidebetError::Configuration("no settlement contract artifact loaded".into())
                })?;
                let mut data = Vec::with_capacity(code.len() + args.len());
                data.extend_from_slice(code);
                data.extend_from_slice(&args);
                Ok(data)
            }
            _ => Ok(args),
        }
    }

    async fn cached_chain_id(&self) -> Result<u64> {
        self.chain_id
            .get_or_try_init(|| async {
                parse_u64(&self.request("eth_chainId", json!([])).await?)
            })
            .await
            .copied()
    }

    /// Submit a locally signed transaction. Its hash is known up front, so a
    /// lost answer is handed back as the hash and left to confirmation
    /// polling.
    async fn submit_signed(&self, tx: &TxRequest, signed: SignedTx) -> Result<TxHash> {
        let raw = format!("0x{}", hex::encode(&signed.raw));
        match self.post(false, "eth_sendRawTransaction", json!([raw])).await {
            Ok(body) => match body.error {
                // the node already pools this exact transaction
                Some(err) if err.message.to_ascii_lowercase().contains("already known") => {
                    Ok(signed.hash)
                }
                Some(err) => Err(RpcFailure(err).into_error(Some(tx))),
                None => Ok(signed.hash),
            },
            Err(failure) if failure.delivered => {
                tracing::warn!(
                    tx = %signed.hash,
                    sender = %tx.from,
                    nonce = tx.nonce,
                    reason = %failure.reason,
                    "Raw send unanswered; polling for the transaction"
                );
                Ok(signed.hash)
            }
            Err(failure) => Err(failure.into_unavailable()),
        }
    }
}

/// An RPC-level error, waiting to be mapped onto a gateway error kind.
struct RpcFailure(RpcError);

impl RpcFailure {
    fn into_error(self, tx: Option<&TxRequest>) -> SidebetError {
        let RpcError {
            code,
            message,
            data,
        } = self.0;
        let lower = message.to_ascii_lowercase();
        let nonce_trouble = ["nonce too low", "already known", "replacement transaction underpriced"]
            .iter()
            .any(|needle| lower.contains(needle));

        if nonce_trouble {
            if let Some(tx) = tx {
                return SidebetError::NonceConflict {
                    sender: tx.from,
                    nonce: tx.nonce,
                };
            }
        }
        if code == EXECUTION_REVERTED || lower.contains("revert") {
            let reason = match data.as_ref().and_then(Value::as_str) {
                Some(d) => format!("{message} ({d})"),
                None => message,
            };
            return SidebetError::CallReverted { reason };
        }
        SidebetError::unavailable(format!("RPC error {code}: {message}"))
    }
}

fn quantity(v: impl Into<u128>) -> String {
    format!("{:#x}", v.into())
}

fn parse_quantity(v: &Value) -> Result<u128> {
    let s = v
        .as_str()
        .ok_or_else(|| SidebetError::AbiDecode(format!("expected hex quantity, got {v}")))?;
    let digits = s.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| SidebetError::AbiDecode(format!("bad quantity {s:?}: {e}")))
}

fn parse_u64(v: &Value) -> Result<u64> {
    let n = parse_quantity(v)?;
    u64::try_from(n).map_err(|_| SidebetError::AbiDecode(format!("quantity {n} exceeds u64")))
}

fn parse_string<T: std::str::FromStr<Err = SidebetError>>(v: &Value, field: &str) -> Result<T> {
    v.as_str()
        .ok_or_else(|| SidebetError::AbiDecode(format!("{field} missing")))?
        .parse()
}

/// `null` while pending.
fn parse_receipt(v: &Value) -> Result<Option<TxReceipt>> {
    if v.is_null() {
        return Ok(None);
    }
    // some nodes return a receipt shell before inclusion
    if v["blockNumber"].is_null() {
        return Ok(None);
    }
    let contract_address = match &v["contractAddress"] {
        Value::Null => None,
        other => Some(parse_string::<Address>(other, "contractAddress")?),
    };
    Ok(Some(TxReceipt {
        tx_hash: parse_string(&v["transactionHash"], "transactionHash")?,
        block_number: parse_u64(&v["blockNumber"])?,
        succeeded: parse_quantity(&v["status"])? == 1,
        gas_used: parse_u64(&v["gasUsed"])?,
        contract_address,
        revert_reason: None,
        confirmations: 0,
    }))
}

/// Accepts both `"bytecode": "0x.."` and `"bytecode": {"object": "0x.."}`.
fn bytecode_from_artifact(artifact: &Value) -> Result<Vec<u8>> {
    let field = &artifact["bytecode"];
    let hex = field
        .as_str()
        .or_else(|| field["object"].as_str())
        .ok_or_else(|| SidebetError::Configuration("artifact has no bytecode".into()))?;
    let code = decode_hex_payload(hex)
        .map_err(|e| SidebetError::Configuration(format!("artifact bytecode: {e}")))?;
    if code.is_empty() {
        return Err(SidebetError::Configuration("artifact bytecode is empty".into()));
    }
    Ok(code)
}

fn load_bytecode(path: &Path) -> Result<Vec<u8>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| SidebetError::Configuration(format!("{}: {e}", path.display())))?;
    let artifact: Value = serde_json::from_str(&raw)?;
    bytecode_from_artifact(&artifact)
}

#[async_trait]
impl LedgerTransport for JsonRpcTransport {
    async fn chain_id(&self) -> Result<u64> {
        parse_u64(&self.request("eth_chainId", json!([])).await?)
    }

    async fn block_number(&self) -> Result<u64> {
        parse_u64(&self.request("eth_blockNumber", json!([])).await?)
    }

    async fn gas_price(&self) -> Result<u128> {
        parse_quantity(&self.request("eth_gasPrice", json!([])).await?)
    }

    async fn pending_nonce(&self, sender: &Address) -> Result<u64> {
        let v = self
            .request(
                "eth_getTransactionCount",
                json!([sender.to_string(), "pending"]),
            )
            .await?;
        parse_u64(&v)
    }

    async fn submit(&self, tx: &TxRequest) -> Result<TxHash> {
        let data = self.deploy_data(&tx.call)?;
        if let Some(keys) = self.keys.as_ref().filter(|k| k.holds(&tx.from)) {
            let chain_id = self.cached_chain_id().await?;
            if let Some(signed) = keys.sign(tx, &data, chain_id)? {
                return self.submit_signed(tx, signed).await;
            }
        }

        let mut body = json!({
            "from": tx.from.to_string(),
            "data": format!("0x{}", hex::encode(data)),
            "gas": quantity(tx.gas_limit),
            "gasPrice": quantity(tx.gas_price),
            "nonce": quantity(tx.nonce),
        });
        if let Some(to) = tx.to {
            body["to"] = Value::String(to.to_string());
        }

        let body = self
            .post(true, "eth_sendTransaction", json!([body]))
            .await
            .map_err(|failure| failure.into_submit_error(tx))?;
        if let Some(err) = body.error {
            return Err(RpcFailure(err).into_error(Some(tx)));
        }
        parse_string(&body.result.unwrap_or(Value::Null), "transaction hash")
    }

    async fn receipt(&self, tx_hash: &TxHash) -> Result<Option<TxReceipt>> {
        let v = self
            .request(
                "eth_getTransactionReceipt",
                json!([tx_hash.to_string()]),
            )
            .await?;
        parse_receipt(&v)
    }

    async fn read(&self, at: &Address, call: &ReadCall) -> Result<ReadValue> {
        let v = self
            .request(
                "eth_call",
                json!([
                    {"to": at.to_string(), "data": format!("0x{}", hex::encode(call.calldata()))},
                    "latest"
                ]),
            )
            .await?;
        let raw = v
            .as_str()
            .ok_or_else(|| SidebetError::AbiDecode(format!("eth_call returned {v}")))?;
        call.decode(&decode_hex_payload(raw)?)
    }
}
