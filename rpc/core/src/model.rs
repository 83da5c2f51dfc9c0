//! RPC data models and types

use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::Hash;

/// Node error code for an unknown block, transaction or address.
pub const RPC_INVALID_ADDRESS_OR_KEY: i32 = -5;
/// Node error code for a block height past the tip.
pub const RPC_INVALID_PARAMETER: i32 = -8;

/// RPC error type
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i32, message: String },
}

impl RpcError {
    /// Normalizes node error codes that mean "no such object" into `NotFound`.
    pub fn from_node(code: i32, message: String) -> Self {
        match code {
            RPC_INVALID_ADDRESS_OR_KEY | RPC_INVALID_PARAMETER => RpcError::NotFound(message),
            _ => RpcError::Rpc { code, message },
        }
    }

    /// Transport-level failures that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, RpcError::Network(_) | RpcError::Timeout(_))
    }
}

/// Subset of `getblockchaininfo`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainInfo {
    pub chain: String,
    pub blocks: u64,
    pub bestblockhash: Hash,
}

/// `getblock <hash> 1` result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockData {
    pub hash: Hash,
    /// `-1` when the block is not on the best chain.
    pub confirmations: i64,
    pub height: u64,
    #[serde(default)]
    pub version: i32,
    pub time: i64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub bits: String,
    #[serde(default)]
    pub difficulty: f64,
    #[serde(rename = "previousblockhash", default)]
    pub previous_block_hash: Option<Hash>,
    #[serde(rename = "nextblockhash", default)]
    pub next_block_hash: Option<Hash>,
    pub tx: Vec<Hash>,
}

/// `getrawtransaction <txid> 1` result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxData {
    pub txid: Hash,
    #[serde(default)]
    pub version: i32,
    #[serde(default)]
    pub locktime: u32,
    #[serde(default)]
    pub size: u64,
    pub vin: Vec<Vin>,
    pub vout: Vec<Vout>,
    #[serde(default)]
    pub blockhash: Option<Hash>,
    #[serde(default)]
    pub time: Option<i64>,
}

impl TxData {
    /// Hex payload of the coinbase input, if this is a coinbase transaction.
    pub fn coinbase(&self) -> Option<&str> {
        self.vin.first().and_then(|vin| vin.coinbase.as_deref())
    }

    pub fn is_coinbase(&self) -> bool {
        self.coinbase().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vin {
    #[serde(default)]
    pub coinbase: Option<String>,
    #[serde(default)]
    pub txid: Option<Hash>,
    #[serde(default)]
    pub vout: Option<u32>,
    #[serde(default)]
    pub sequence: u32,
}

impl Vin {
    /// The output this input spends, absent for the coinbase placeholder.
    pub fn prevout(&self) -> Option<(Hash, u32)> {
        match (self.coinbase.as_ref(), self.txid, self.vout) {
            (None, Some(txid), Some(vout)) => Some((txid, vout)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vout {
    /// Decimal coin amount as printed by the node.
    pub value: f64,
    pub n: u32,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKey,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScriptPubKey {
    #[serde(default)]
    pub hex: String,
    #[serde(rename = "type", default)]
    pub script_type: String,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl ScriptPubKey {
    /// Every address named by the spending condition. Nodes either print a
    /// legacy `addresses` array or a single `address` field.
    pub fn all_addresses(&self) -> Vec<String> {
        if !self.addresses.is_empty() {
            return self.addresses.clone();
        }
        self.address.iter().cloned().collect()
    }
}
