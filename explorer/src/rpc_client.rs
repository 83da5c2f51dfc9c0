//! JSON-RPC client for the Viacoin node

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::trace;
use rpc_core::{BlockData, ChainInfo, Hash, RpcApi, RpcError, TxData};

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

/// HTTP POST transport with basic auth. Each call is bounded by `timeout`;
/// nothing is cached or retried here.
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    user: String,
    password: String,
    timeout: Duration,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: &str, user: &str, password: &str, timeout: Duration) -> Result<Self, RpcError> {
        url::Url::parse(url).map_err(|e| RpcError::Internal(format!("Invalid node URL {}: {}", url, e)))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: url.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            timeout,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call_method<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest { jsonrpc: "1.0", id, method, params };
        trace!("RPC {} #{}", method, id);

        let response = self
            .http
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        // The node answers errors with a non-2xx status and a JSON body.
        let status = response.status();
        let body: JsonRpcResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                RpcError::Timeout(self.timeout.as_secs())
            } else {
                RpcError::Network(format!("{} returned {}: {}", method, status, e))
            }
        })?;

        if let Some(error) = body.error {
            return Err(RpcError::from_node(error.code, error.message));
        }
        serde_json::from_value(body.result)
            .map_err(|e| RpcError::Internal(format!("Deserialization error in {}: {}", method, e)))
    }

    fn transport_error(&self, err: reqwest::Error) -> RpcError {
        if err.is_timeout() {
            RpcError::Timeout(self.timeout.as_secs())
        } else {
            RpcError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl RpcApi for RpcClient {
    async fn get_block(&self, hash: Hash) -> Result<BlockData, RpcError> {
        self.call_method("getblock", serde_json::json!([hash.to_string(), 1])).await
    }

    async fn get_block_hash(&self, height: u64) -> Result<Hash, RpcError> {
        self.call_method("getblockhash", serde_json::json!([height])).await
    }

    async fn get_raw_transaction(&self, txid: Hash) -> Result<TxData, RpcError> {
        self.call_method("getrawtransaction", serde_json::json!([txid.to_string(), 1])).await
    }

    async fn get_chain_info(&self) -> Result<ChainInfo, RpcError> {
        self.call_method("getblockchaininfo", serde_json::json!([])).await
    }
}
