#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use parking_lot::Mutex;
use rpc_core::{BlockData, ChainInfo, Hash, RpcApi, RpcError, ScriptPubKey, TxData, Vin, Vout};
use via_explorer::database::IndexStore;
use via_explorer::{AppContext, Config};

/// Coinbase payload decoding to "R\x06/P2SH/...\r/nodeStratum/".
pub const NODESTRATUM_COINBASE: &str =
    "52062f503253482f04dee0c7530807ffffff010000000d2f6e6f64655374726174756d2f";
pub const SOLO_COINBASE: &str = "0101";

pub fn tag(byte: u8, n: u64) -> Hash {
    let mut bytes = [byte; 32];
    bytes[24..].copy_from_slice(&n.to_be_bytes());
    Hash::from_bytes(bytes)
}

/// One output: the addresses its script names and its coin value.
pub struct Out(pub Vec<&'static str>, pub f64);

pub fn to(address: &'static str, value: f64) -> Out {
    Out(vec![address], value)
}

pub fn multisig(addresses: &[&'static str], value: f64) -> Out {
    Out(addresses.to_vec(), value)
}

fn outputs(outs: Vec<Out>) -> Vec<Vout> {
    outs.into_iter()
        .enumerate()
        .map(|(n, Out(addresses, value))| Vout {
            value,
            n: n as u32,
            script_pub_key: ScriptPubKey {
                hex: String::new(),
                script_type: if addresses.len() > 1 { "multisig" } else { "pubkeyhash" }.to_string(),
                addresses: addresses.iter().map(|a| a.to_string()).collect(),
                address: None,
            },
        })
        .collect()
}

pub fn coinbase(txid: Hash, payload: &str, outs: Vec<Out>) -> TxData {
    TxData {
        txid,
        version: 1,
        locktime: 0,
        size: 120,
        vin: vec![Vin {
            coinbase: Some(payload.to_string()),
            txid: None,
            vout: None,
            sequence: u32::MAX,
        }],
        vout: outputs(outs),
        blockhash: None,
        time: None,
    }
}

pub fn spend(txid: Hash, inputs: &[(Hash, u32)], outs: Vec<Out>) -> TxData {
    TxData {
        txid,
        version: 1,
        locktime: 0,
        size: 250,
        vin: inputs
            .iter()
            .map(|(prev, vout)| Vin {
                coinbase: None,
                txid: Some(*prev),
                vout: Some(*vout),
                sequence: u32::MAX,
            })
            .collect(),
        vout: outputs(outs),
        blockhash: None,
        time: None,
    }
}

/// In-memory node serving a scripted chain.
pub struct FakeNode {
    chain: String,
    blocks: Mutex<HashMap<Hash, BlockData>>,
    heights: Mutex<BTreeMap<u64, Hash>>,
    txs: Mutex<HashMap<Hash, TxData>>,
    withheld: Mutex<HashSet<Hash>>,
    failing_calls: AtomicUsize,
    pub block_calls: AtomicUsize,
    pub height_lookups: AtomicUsize,
}

impl FakeNode {
    pub fn new(chain: &str) -> Arc<Self> {
        Arc::new(Self {
            chain: chain.to_string(),
            blocks: Mutex::new(HashMap::new()),
            heights: Mutex::new(BTreeMap::new()),
            txs: Mutex::new(HashMap::new()),
            withheld: Mutex::new(HashSet::new()),
            failing_calls: AtomicUsize::new(0),
            block_calls: AtomicUsize::new(0),
            height_lookups: AtomicUsize::new(0),
        })
    }

    /// Adds a best-chain block at `height` holding `txs` and returns its hash.
    pub fn add_block(&self, height: u64, txs: Vec<TxData>) -> Hash {
        self.add_block_with(height, txs, 1)
    }

    pub fn add_block_with(&self, height: u64, txs: Vec<TxData>, confirmations: i64) -> Hash {
        let hash = tag(if confirmations < 0 { 0xcc } else { 0xbb }, height);
        let parent = self.heights.lock().get(&height.wrapping_sub(1)).copied();
        let block = BlockData {
            hash,
            confirmations,
            height,
            version: 4,
            time: 1_500_000_000 + height as i64 * 90,
            size: 300 * txs.len() as u64,
            bits: "1b0404cb".into(),
            difficulty: 1.0,
            previous_block_hash: parent,
            next_block_hash: None,
            tx: txs.iter().map(|tx| tx.txid).collect(),
        };
        {
            let mut known = self.txs.lock();
            for tx in txs {
                known.insert(tx.txid, tx);
            }
        }
        self.blocks.lock().insert(hash, block);
        if confirmations >= 0 {
            self.heights.lock().insert(height, hash);
        }
        hash
    }

    /// Makes the next `count` block fetches fail as if the node were down.
    pub fn fail_next(&self, count: usize) {
        self.failing_calls.store(count, Ordering::SeqCst);
    }

    pub fn forget_transaction(&self, txid: &Hash) {
        self.txs.lock().remove(txid);
    }

    /// Serves `txid` as not found until `release_transaction`.
    pub fn withhold_transaction(&self, txid: Hash) {
        self.withheld.lock().insert(txid);
    }

    pub fn release_transaction(&self, txid: &Hash) {
        self.withheld.lock().remove(txid);
    }
}

#[async_trait]
impl RpcApi for FakeNode {
    async fn get_block(&self, hash: Hash) -> Result<BlockData, RpcError> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failing_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(RpcError::Network("connection refused".into()));
        }
        self.blocks
            .lock()
            .get(&hash)
            .cloned()
            .ok_or_else(|| RpcError::NotFound(format!("block {}", hash)))
    }

    async fn get_block_hash(&self, height: u64) -> Result<Hash, RpcError> {
        self.heights
            .lock()
            .get(&height)
            .copied()
            .ok_or_else(|| RpcError::NotFound(format!("height {}", height)))
    }

    async fn get_raw_transaction(&self, txid: Hash) -> Result<TxData, RpcError> {
        if self.withheld.lock().contains(&txid) {
            return Err(RpcError::NotFound(format!("tx {}", txid)));
        }
        self.txs
            .lock()
            .get(&txid)
            .cloned()
            .ok_or_else(|| RpcError::NotFound(format!("tx {}", txid)))
    }

    async fn get_block_by_height(&self, height: u64) -> Result<BlockData, RpcError> {
        self.height_lookups.fetch_add(1, Ordering::SeqCst);
        let hash = self.get_block_hash(height).await?;
        self.get_block(hash).await
    }

    async fn get_chain_info(&self) -> Result<ChainInfo, RpcError> {
        let heights = self.heights.lock();
        let (blocks, best) = heights
            .iter()
            .next_back()
            .map(|(h, hash)| (*h, *hash))
            .unwrap_or((0, Hash::default()));
        Ok(ChainInfo {
            chain: self.chain.clone(),
            blocks,
            bestblockhash: best,
        })
    }
}

pub fn test_config(expected_chain: &str) -> Config {
    let mut config = Config::default();
    config.chain.expected_chain = expected_chain.to_string();
    config.rpc.timeout_secs = 5;
    config.indexer.concurrency = 4;
    config
}

pub async fn context(node: Arc<FakeNode>, store: Arc<dyn IndexStore>) -> AppContext {
    let chain = node.get_chain_info().await.unwrap().chain;
    AppContext::assemble(test_config(&chain), node, store).await.unwrap()
}

pub const A: &str = "VaddrA";
pub const B: &str = "VaddrB";
pub const C: &str = "VaddrC";
pub const D: &str = "VaddrD";

pub const H1: u64 = 20_000;
pub const H2: u64 = 20_001;
pub const H3: u64 = 20_002;

/// Three blocks:
/// * H1: nodeStratum coinbase paying A 5
/// * H2: coinbase paying A 3; A's 5 split into B 4 and A 0.9
/// * H3: coinbase paying C 20; B's 4 into a C+D multisig 3.5, which a second
///   transaction in the same block spends back to A 3
pub fn scripted_chain(node: &FakeNode) -> [Hash; 3] {
    let cb1 = coinbase(tag(0x01, 1), NODESTRATUM_COINBASE, vec![to(A, 5.0)]);
    let cb2 = coinbase(tag(0x01, 2), SOLO_COINBASE, vec![to(A, 3.0)]);
    let tx2 = spend(tag(0x02, 2), &[(cb1.txid, 0)], vec![to(B, 4.0), to(A, 0.9)]);
    let cb3 = coinbase(tag(0x01, 3), SOLO_COINBASE, vec![to(C, 20.0)]);
    let tx3 = spend(tag(0x02, 3), &[(tx2.txid, 0)], vec![multisig(&[C, D], 3.5)]);
    let tx4 = spend(tag(0x03, 3), &[(tx3.txid, 0)], vec![to(A, 3.0)]);

    let h1 = node.add_block(H1, vec![cb1]);
    let h2 = node.add_block(H2, vec![cb2, tx2]);
    let h3 = node.add_block(H3, vec![cb3, tx3, tx4]);
    [h1, h2, h3]
}
