//! Data models for the explorer index

use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};
use rpc_core::Hash;

/// Base units per coin.
pub const COIN: i64 = 100_000_000;

/// Converts a decimal coin amount as printed by the node into base units.
pub fn coin_to_sat(value: f64) -> i64 {
    (value * COIN as f64).round() as i64
}

/// Renders base units as a fixed eight-decimal coin string.
pub fn sat_to_coin_string(sat: i64) -> String {
    let sign = if sat < 0 { "-" } else { "" };
    let abs = sat.unsigned_abs();
    let coin = COIN as u64;
    format!("{}{}.{:08}", sign, abs / coin, abs % coin)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    #[serde(rename = "poolName")]
    pub pool_name: String,
    pub url: String,
}

/// Outcome of matching a coinbase against the known pools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribution {
    Pool(PoolInfo),
    /// Solo miner or unregistered pool.
    Unknown,
}

impl Attribution {
    pub fn into_pool(self) -> Option<PoolInfo> {
        match self {
            Attribution::Pool(pool) => Some(pool),
            Attribution::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub hash: Hash,
    pub height: u64,
    pub parent_hash: Option<Hash>,
    pub timestamp: i64,
    pub size: u64,
    pub tx_ids: Vec<Hash>,
    pub reward: i64,
    pub pool: Option<PoolInfo>,
    pub is_main_chain: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxInputRecord {
    pub n: u32,
    /// Hex coinbase payload; set only on the coinbase placeholder input.
    pub coinbase: Option<String>,
    pub prev_txid: Option<Hash>,
    pub prev_vout: Option<u32>,
    /// Addresses of the spent output, empty for coinbase.
    pub addresses: Vec<String>,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOutputRecord {
    pub n: u32,
    pub addresses: Vec<String>,
    pub value: i64,
    pub script_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub txid: Hash,
    pub block_height: u64,
    pub block_hash: Hash,
    pub block_time: i64,
    pub is_coinbase: bool,
    pub inputs: Vec<TxInputRecord>,
    pub outputs: Vec<TxOutputRecord>,
    pub value_out: i64,
    pub fee: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaKind {
    Receipt,
    Spend,
}

impl DeltaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaKind::Receipt => "receipt",
            DeltaKind::Spend => "spend",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "receipt" => Some(DeltaKind::Receipt),
            "spend" => Some(DeltaKind::Spend),
            _ => None,
        }
    }
}

/// Identifies one balance event on one address. `n` is the output index for
/// receipts and the input index for spends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeltaKey {
    pub txid: Hash,
    pub kind: DeltaKind,
    pub n: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressDelta {
    pub address: String,
    pub txid: Hash,
    pub kind: DeltaKind,
    pub n: u32,
    pub value: i64,
    pub is_coinbase_input: bool,
}

impl AddressDelta {
    pub fn key(&self) -> DeltaKey {
        DeltaKey { txid: self.txid, kind: self.kind, n: self.n }
    }

    pub fn delta_received(&self) -> i64 {
        match self.kind {
            DeltaKind::Receipt => self.value,
            DeltaKind::Spend => 0,
        }
    }

    pub fn delta_sent(&self) -> i64 {
        match self.kind {
            DeltaKind::Receipt => 0,
            DeltaKind::Spend => self.value,
        }
    }
}

/// Running totals of one address, without its event history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressTotals {
    pub address: String,
    pub balance: i64,
    pub total_received: i64,
    pub total_sent: i64,
    pub tx_appearances: u64,
    pub version: u64,
}

impl AddressTotals {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            balance: 0,
            total_received: 0,
            total_sent: 0,
            tx_appearances: 0,
            version: 0,
        }
    }

    /// Adds a delta that has not been applied before. `first_appearance`
    /// is whether its txid is new to the address.
    pub fn apply(&mut self, delta: &AddressDelta, first_appearance: bool) {
        self.total_received += delta.delta_received();
        self.total_sent += delta.delta_sent();
        self.balance = self.total_received - self.total_sent;
        if first_appearance {
            self.tx_appearances += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressIndexRecord {
    pub address: String,
    pub balance: i64,
    pub total_received: i64,
    pub total_sent: i64,
    pub tx_appearances: u64,
    pub transactions: BTreeSet<Hash>,
    #[serde(skip)]
    pub applied: BTreeSet<DeltaKey>,
    /// Bumped on every successful write; used for compare-and-swap.
    #[serde(skip)]
    pub version: u64,
}

impl AddressIndexRecord {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            balance: 0,
            total_received: 0,
            total_sent: 0,
            tx_appearances: 0,
            transactions: BTreeSet::new(),
            applied: BTreeSet::new(),
            version: 0,
        }
    }

    pub fn has_applied(&self, key: &DeltaKey) -> bool {
        self.applied.contains(key)
    }

    pub fn totals(&self) -> AddressTotals {
        AddressTotals {
            address: self.address.clone(),
            balance: self.balance,
            total_received: self.total_received,
            total_sent: self.total_sent,
            tx_appearances: self.tx_appearances,
            version: self.version,
        }
    }

    /// Applies `delta` unless it was applied before. Returns whether the
    /// record changed.
    pub fn apply(&mut self, delta: &AddressDelta) -> bool {
        if !self.applied.insert(delta.key()) {
            return false;
        }
        self.total_received += delta.delta_received();
        self.total_sent += delta.delta_sent();
        self.balance = self.total_received - self.total_sent;
        self.transactions.insert(delta.txid);
        self.tx_appearances = self.transactions.len() as u64;
        true
    }

    pub fn is_consistent(&self) -> bool {
        self.balance == self.total_received - self.total_sent
            && self.tx_appearances == self.transactions.len() as u64
    }
}
