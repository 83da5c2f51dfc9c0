//! Main-chain identity tracking

use parking_lot::RwLock;
use tracing::{info, warn};
use rpc_core::{BlockData, ChainInfo, RpcApi};
use crate::error::{ExplorerError, Result};

/// Chain identifier the node reports for the main network.
pub const MAIN_CHAIN: &str = "main";

pub struct MainChainTracker {
    expected_chain: String,
    info: RwLock<ChainInfo>,
}

impl MainChainTracker {
    /// Reads chain info once and verifies the node serves `expected_chain`.
    pub async fn connect(rpc: &dyn RpcApi, expected_chain: &str) -> Result<Self> {
        let info = Self::fetch_checked(rpc, expected_chain).await?;
        info!("Connected to {} chain at height {}", info.chain, info.blocks);
        Ok(Self {
            expected_chain: expected_chain.to_string(),
            info: RwLock::new(info),
        })
    }

    async fn fetch_checked(rpc: &dyn RpcApi, expected_chain: &str) -> Result<ChainInfo> {
        let info = rpc.get_chain_info().await.map_err(|e| {
            ExplorerError::UpstreamUnavailable(format!("chain info: {}", e))
        })?;
        if info.chain != expected_chain {
            return Err(ExplorerError::ChainIdentityMismatch {
                expected: expected_chain.to_string(),
                actual: info.chain,
            });
        }
        Ok(info)
    }

    pub async fn refresh(&self, rpc: &dyn RpcApi) -> Result<ChainInfo> {
        let info = Self::fetch_checked(rpc, &self.expected_chain).await.map_err(|e| {
            warn!("Chain info refresh failed: {}", e);
            e
        })?;
        *self.info.write() = info.clone();
        Ok(info)
    }

    pub fn is_main_chain(&self) -> bool {
        self.info.read().chain == MAIN_CHAIN
    }

    pub fn chain_info(&self) -> ChainInfo {
        self.info.read().clone()
    }

    pub fn expected_chain(&self) -> &str {
        &self.expected_chain
    }

    /// Main-chain flag recorded for `block`: the node is on the main network
    /// and the block is on its best chain.
    pub fn block_is_main_chain(&self, block: &BlockData) -> bool {
        self.is_main_chain() && block.confirmations >= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rpc_core::{Hash, RpcError, TxData};

    struct FixedChain(std::result::Result<ChainInfo, RpcError>);

    #[async_trait]
    impl RpcApi for FixedChain {
        async fn get_block(&self, hash: Hash) -> std::result::Result<BlockData, RpcError> {
            Err(RpcError::NotFound(hash.to_string()))
        }
        async fn get_block_hash(&self, height: u64) -> std::result::Result<Hash, RpcError> {
            Err(RpcError::NotFound(height.to_string()))
        }
        async fn get_raw_transaction(&self, txid: Hash) -> std::result::Result<TxData, RpcError> {
            Err(RpcError::NotFound(txid.to_string()))
        }
        async fn get_chain_info(&self) -> std::result::Result<ChainInfo, RpcError> {
            self.0.clone()
        }
    }

    fn chain(name: &str) -> ChainInfo {
        ChainInfo { chain: name.into(), blocks: 10, bestblockhash: Hash::default() }
    }

    fn block(confirmations: i64) -> BlockData {
        BlockData {
            hash: Hash::default(),
            confirmations,
            height: 1,
            version: 1,
            time: 0,
            size: 0,
            bits: String::new(),
            difficulty: 1.0,
            previous_block_hash: None,
            next_block_hash: None,
            tx: vec![],
        }
    }

    #[tokio::test]
    async fn test_main_chain() {
        let rpc = FixedChain(Ok(chain("main")));
        let tracker = MainChainTracker::connect(&rpc, "main").await.unwrap();
        assert!(tracker.is_main_chain());
        assert!(tracker.block_is_main_chain(&block(3)));
        assert!(!tracker.block_is_main_chain(&block(-1)));
    }

    #[tokio::test]
    async fn test_test_network_is_not_main() {
        let rpc = FixedChain(Ok(chain("test")));
        let tracker = MainChainTracker::connect(&rpc, "test").await.unwrap();
        assert!(!tracker.is_main_chain());
        assert!(!tracker.block_is_main_chain(&block(3)));
    }

    #[tokio::test]
    async fn test_identity_mismatch_is_fatal() {
        let rpc = FixedChain(Ok(chain("regtest")));
        let err = MainChainTracker::connect(&rpc, "main").await.err().unwrap();
        assert!(matches!(err, ExplorerError::ChainIdentityMismatch { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_refresh_moves_tip_and_rechecks_identity() {
        let tracker = MainChainTracker::connect(&FixedChain(Ok(chain("main"))), "main").await.unwrap();
        assert_eq!(tracker.chain_info().blocks, 10);

        let grown = ChainInfo { blocks: 11, bestblockhash: Hash::from_bytes([11; 32]), ..chain("main") };
        let info = tracker.refresh(&FixedChain(Ok(grown.clone()))).await.unwrap();
        assert_eq!(info, grown);
        assert_eq!(tracker.chain_info(), grown);

        let err = tracker.refresh(&FixedChain(Ok(chain("regtest")))).await.err().unwrap();
        assert!(err.is_fatal());
        let err = tracker.refresh(&FixedChain(Err(RpcError::Timeout(5)))).await.err().unwrap();
        assert!(matches!(err, ExplorerError::UpstreamUnavailable(_)));
        assert_eq!(tracker.chain_info(), grown);
        assert_eq!(tracker.expected_chain(), "main");
    }

    #[tokio::test]
    async fn test_unreachable_node() {
        let rpc = FixedChain(Err(RpcError::Timeout(5)));
        let err = MainChainTracker::connect(&rpc, "main").await.err().unwrap();
        assert!(matches!(err, ExplorerError::UpstreamUnavailable(_)));
    }
}
