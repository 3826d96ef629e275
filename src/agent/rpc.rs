//! JSON-RPC transport for daemon and wallet endpoints.
//!
//! One thin blocking client serves both monerod and monero-wallet-rpc.
//! Agents are single-threaded cooperative loops under the simulator, so
//! a blocking call with a per-call timeout is exactly one suspension
//! point. Failures map onto a small typed taxonomy the behaviors match
//! on; retries with backoff are limited to read-only methods.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::thread;
use std::time::Duration;

/// Per-call timeout.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(15);

/// Methods that are safe to retry blindly: no observable state change on
/// the remote side.
const SAFE_METHODS: &[&str] = &[
    "get_info",
    "get_version",
    "get_height",
    "get_block_count",
    "get_address",
    "get_balance",
    "get_transfers",
];

/// Default retry budget for safe methods.
const RETRY_ATTEMPTS: u32 = 3;
/// Base backoff between retries; grows linearly per attempt.
const RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Transport and protocol failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RpcError {
    /// Connect failure or timeout
    #[error("transport error: {0}")]
    Transport(String),

    /// Response was not a JSON-RPC envelope
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The remote returned an error envelope
    #[error("rpc error {code}: {message}")]
    Protocol { code: i64, message: String },
}

/// Semantic classification of an [`RpcError`], matched at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorKind {
    Transport,
    Malformed,
    WalletNotFound,
    WalletExists,
    WalletNotReady,
    NotEnoughMoney,
    InvalidAddress,
    Other,
}

impl RpcError {
    pub fn kind(&self) -> RpcErrorKind {
        match self {
            RpcError::Transport(_) => RpcErrorKind::Transport,
            RpcError::Malformed(_) => RpcErrorKind::Malformed,
            RpcError::Protocol { message, .. } => {
                let message = message.to_lowercase();
                if message.contains("failed to open wallet")
                    || message.contains("wallet not found")
                    || message.contains("file not found")
                {
                    RpcErrorKind::WalletNotFound
                } else if message.contains("already exists") {
                    RpcErrorKind::WalletExists
                } else if message.contains("not enough money")
                    || message.contains("not enough unlocked money")
                {
                    RpcErrorKind::NotEnoughMoney
                } else if message.contains("address") && (message.contains("invalid") || message.contains("wrong")) {
                    RpcErrorKind::InvalidAddress
                } else if message.contains("busy")
                    || message.contains("not ready")
                    || message.contains("no wallet file")
                    || message.contains("wallet is not opened")
                {
                    RpcErrorKind::WalletNotReady
                } else {
                    RpcErrorKind::Other
                }
            }
        }
    }

    /// Transient failures worth another attempt later in the loop.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            RpcErrorKind::Transport | RpcErrorKind::WalletNotReady
        )
    }
}

/// Parse a JSON-RPC response body into its result value.
fn parse_envelope(body: Value) -> Result<Value, RpcError> {
    if let Some(error) = body.get("error") {
        if !error.is_null() {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(RpcError::Protocol { code, message });
        }
    }
    match body.get("result") {
        Some(result) => Ok(result.clone()),
        None => Err(RpcError::Malformed(format!(
            "response has neither result nor error: {}",
            body
        ))),
    }
}

/// Blocking JSON-RPC client bound to one endpoint.
#[derive(Debug, Clone)]
pub struct RpcClient {
    url: String,
    http: reqwest::blocking::Client,
}

impl RpcClient {
    /// Bind to `http://host:port/json_rpc`.
    pub fn new(host: &str, port: u16) -> Self {
        Self::from_url(format!("http://{}:{}/json_rpc", host, port))
    }

    pub fn from_url(url: String) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .expect("http client construction cannot fail with static options");
        Self { url, http }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Post one method call.
    pub fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": "0",
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Transport(format!("{} timed out after {:?}", method, RPC_TIMEOUT))
                } else {
                    RpcError::Transport(format!("{}: {}", method, e))
                }
            })?;

        let body: Value = response
            .json()
            .map_err(|e| RpcError::Malformed(format!("{}: {}", method, e)))?;
        parse_envelope(body)
    }

    /// Call with bounded linear-backoff retry. Only read-only methods are
    /// retried; anything else gets exactly one attempt.
    pub fn call_with_retry(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        if !SAFE_METHODS.contains(&method) {
            return self.call(method, params);
        }

        let mut last_error = None;
        for attempt in 0..RETRY_ATTEMPTS {
            match self.call(method, params.clone()) {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() => {
                    log::debug!(
                        "retrying {} after transient failure (attempt {}): {}",
                        method,
                        attempt + 1,
                        e
                    );
                    last_error = Some(e);
                    thread::sleep(RETRY_BACKOFF * (attempt + 1));
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.expect("at least one attempt was made"))
    }

    /// Typed call: deserialize the result into `T`.
    pub fn call_typed<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, RpcError> {
        let result = self.call_with_retry(method, params)?;
        serde_json::from_value(result)
            .map_err(|e| RpcError::Malformed(format!("{} result: {}", method, e)))
    }

    /// Poll the endpoint until it answers a structurally valid success, or
    /// the wait budget runs out.
    pub fn wait_until_ready(&self, probe_method: &str, max_wait: Duration) -> Result<(), RpcError> {
        let mut waited = Duration::ZERO;
        let mut backoff = Duration::from_secs(1);

        loop {
            match self.call(probe_method, json!({})) {
                Ok(_) => return Ok(()),
                // A protocol error still proves the endpoint is up and
                // speaking JSON-RPC.
                Err(RpcError::Protocol { .. }) => return Ok(()),
                Err(e) => {
                    if waited >= max_wait {
                        return Err(RpcError::Transport(format!(
                            "{} not ready after {:?}: {}",
                            self.url, max_wait, e
                        )));
                    }
                    thread::sleep(backoff);
                    waited += backoff;
                    backoff = (backoff * 3 / 2).min(Duration::from_secs(5));
                }
            }
        }
    }
}

/// Daemon info subset the behaviors consume.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct DaemonInfo {
    pub height: u64,
    #[serde(default)]
    pub difficulty: u64,
    #[serde(default)]
    pub target_height: u64,
    #[serde(default)]
    pub incoming_connections_count: u64,
    #[serde(default)]
    pub outgoing_connections_count: u64,
}

/// Result of a `generateblocks` call.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct GeneratedBlocks {
    #[serde(default)]
    pub blocks: Vec<String>,
    pub height: u64,
}

/// Typed daemon RPC surface.
#[derive(Debug, Clone)]
pub struct DaemonClient {
    rpc: RpcClient,
}

impl DaemonClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            rpc: RpcClient::new(host, port),
        }
    }

    pub fn from_url(url: String) -> Self {
        Self {
            rpc: RpcClient::from_url(url),
        }
    }

    pub fn wait_until_ready(&self, max_wait: Duration) -> Result<(), RpcError> {
        self.rpc.wait_until_ready("get_info", max_wait)
    }

    pub fn get_info(&self) -> Result<DaemonInfo, RpcError> {
        self.rpc.call_typed("get_info", json!({}))
    }

    /// Chain height via `get_block_count` (the daemon's JSON-RPC form;
    /// `get_height` only exists on the plain HTTP surface).
    pub fn get_height(&self) -> Result<u64, RpcError> {
        let result = self.rpc.call_with_retry("get_block_count", json!({}))?;
        result
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| RpcError::Malformed("get_block_count result missing count".to_string()))
    }

    /// Mint `count` regression-mode blocks paying `wallet_address`.
    pub fn generate_blocks(
        &self,
        wallet_address: &str,
        count: u64,
    ) -> Result<GeneratedBlocks, RpcError> {
        self.rpc.call_typed(
            "generateblocks",
            json!({
                "amount_of_blocks": count,
                "wallet_address": wallet_address,
                "prev_block": "",
                "starting_nonce": 0,
            }),
        )
    }
}

/// Wallet balance pair, in atomic units.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct Balance {
    pub balance: u64,
    pub unlocked_balance: u64,
}

/// Result of a submitted transfer.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TransferReceipt {
    pub tx_hash: String,
    #[serde(default)]
    pub tx_key: String,
    #[serde(default)]
    pub amount: u64,
    #[serde(default)]
    pub fee: u64,
}

/// Typed wallet RPC surface.
#[derive(Debug, Clone)]
pub struct WalletClient {
    rpc: RpcClient,
}

impl WalletClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            rpc: RpcClient::new(host, port),
        }
    }

    pub fn from_url(url: String) -> Self {
        Self {
            rpc: RpcClient::from_url(url),
        }
    }

    pub fn wait_until_ready(&self, max_wait: Duration) -> Result<(), RpcError> {
        self.rpc.wait_until_ready("get_version", max_wait)
    }

    pub fn open_wallet(&self, filename: &str) -> Result<(), RpcError> {
        self.rpc
            .call("open_wallet", json!({"filename": filename, "password": ""}))
            .map(|_| ())
    }

    pub fn create_wallet(&self, filename: &str) -> Result<(), RpcError> {
        self.rpc
            .call(
                "create_wallet",
                json!({"filename": filename, "password": "", "language": "English"}),
            )
            .map(|_| ())
    }

    /// Open the wallet, creating it on the first run. Any error other
    /// than wallet-not-found surfaces unchanged.
    pub fn open_or_create(&self, filename: &str) -> Result<(), RpcError> {
        match self.open_wallet(filename) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == RpcErrorKind::WalletNotFound => {
                log::info!("wallet '{}' not found, creating it", filename);
                self.create_wallet(filename)
            }
            Err(e) => Err(e),
        }
    }

    /// Primary address of the open wallet. Addresses are only ever read
    /// from here, never synthesized.
    pub fn get_address(&self) -> Result<String, RpcError> {
        let result = self
            .rpc
            .call_with_retry("get_address", json!({"account_index": 0}))?;
        result
            .get("address")
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .ok_or_else(|| RpcError::Malformed("get_address result missing address".to_string()))
    }

    pub fn get_balance(&self) -> Result<Balance, RpcError> {
        self.rpc.call_typed("get_balance", json!({"account_index": 0}))
    }

    pub fn refresh(&self) -> Result<(), RpcError> {
        self.rpc.call("refresh", json!({})).map(|_| ())
    }

    /// Submit a transfer to one recipient. Amount is atomic units that
    /// already went through the shared converter.
    pub fn transfer(&self, address: &str, amount: u64) -> Result<TransferReceipt, RpcError> {
        let result = self.rpc.call(
            "transfer",
            json!({
                "destinations": [{"address": address, "amount": amount}],
                "account_index": 0,
                "priority": 1,
                "get_tx_key": true,
                "do_not_relay": false,
            }),
        )?;
        serde_json::from_value(result)
            .map_err(|e| RpcError::Malformed(format!("transfer result: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocol(message: &str) -> RpcError {
        RpcError::Protocol {
            code: -1,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_envelope_result() {
        let body = json!({"jsonrpc": "2.0", "id": "0", "result": {"height": 42}});
        let result = parse_envelope(body).unwrap();
        assert_eq!(result["height"], 42);
    }

    #[test]
    fn test_envelope_error() {
        let body = json!({
            "jsonrpc": "2.0",
            "id": "0",
            "error": {"code": -17, "message": "not enough money"}
        });
        let err = parse_envelope(body).unwrap_err();
        assert!(matches!(err, RpcError::Protocol { code: -17, .. }));
        assert_eq!(err.kind(), RpcErrorKind::NotEnoughMoney);
    }

    #[test]
    fn test_envelope_missing_both() {
        let body = json!({"jsonrpc": "2.0", "id": "0"});
        assert!(matches!(
            parse_envelope(body),
            Err(RpcError::Malformed(_))
        ));
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(
            protocol("Failed to open wallet").kind(),
            RpcErrorKind::WalletNotFound
        );
        assert_eq!(
            protocol("Wallet already exists").kind(),
            RpcErrorKind::WalletExists
        );
        assert_eq!(
            protocol("not enough unlocked money").kind(),
            RpcErrorKind::NotEnoughMoney
        );
        assert_eq!(
            protocol("Invalid destination address").kind(),
            RpcErrorKind::InvalidAddress
        );
        assert_eq!(
            protocol("Wallet is not opened").kind(),
            RpcErrorKind::WalletNotReady
        );
        assert_eq!(protocol("internal error").kind(), RpcErrorKind::Other);
        assert_eq!(
            RpcError::Transport("connect refused".to_string()).kind(),
            RpcErrorKind::Transport
        );
    }

    #[test]
    fn test_transient_detection() {
        assert!(RpcError::Transport("timeout".to_string()).is_transient());
        assert!(protocol("Wallet is not opened").is_transient());
        assert!(!protocol("not enough money").is_transient());
        assert!(!protocol("Invalid destination address").is_transient());
    }

    #[test]
    fn test_unreachable_endpoint_is_transport_error() {
        // Port 1 on loopback refuses immediately.
        let client = RpcClient::new("127.0.0.1", 1);
        let err = client.call("get_info", json!({})).unwrap_err();
        assert_eq!(err.kind(), RpcErrorKind::Transport);
    }

    #[test]
    fn test_safe_method_list() {
        for method in ["get_info", "get_balance", "get_transfers"] {
            assert!(SAFE_METHODS.contains(&method));
        }
        assert!(!SAFE_METHODS.contains(&"transfer"));
        assert!(!SAFE_METHODS.contains(&"generateblocks"));
        assert!(!SAFE_METHODS.contains(&"create_wallet"));
    }
}
