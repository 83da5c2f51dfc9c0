//! Block record construction: pool attribution, reward and main-chain flag

use std::sync::Arc;
use tracing::debug;
use rpc_core::{BlockData, TxData};
use crate::indexer::chain_tracker::MainChainTracker;
use crate::indexer::pools::{parse_coinbase_text, PoolRegistry};
use crate::indexer::subsidy::calc_subsidy;
use crate::models::{Attribution, BlockRecord};

pub struct BlockIndexer {
    pools: Arc<PoolRegistry>,
    tracker: Arc<MainChainTracker>,
}

impl BlockIndexer {
    pub fn new(pools: Arc<PoolRegistry>, tracker: Arc<MainChainTracker>) -> Self {
        Self { pools, tracker }
    }

    /// Matches the coinbase payload of the block's first transaction.
    pub fn attribute(&self, coinbase_tx: Option<&TxData>) -> Attribution {
        let Some(coinbase) = coinbase_tx.and_then(|tx| tx.coinbase()) else {
            return Attribution::Unknown;
        };
        let text = parse_coinbase_text(coinbase);
        let attribution = self.pools.resolve(&text);
        if attribution == Attribution::Unknown {
            debug!("No pool signature in coinbase {:?}", text);
        }
        attribution
    }

    /// Subsidy under the schedule of the network the node serves.
    pub fn reward(&self, height: u64) -> i64 {
        calc_subsidy(height, self.tracker.is_main_chain())
    }

    pub fn is_main_chain(&self, block: &BlockData) -> bool {
        self.tracker.block_is_main_chain(block)
    }

    pub fn record(
        &self,
        block: &BlockData,
        attribution: Attribution,
        reward: i64,
        is_main_chain: bool,
    ) -> BlockRecord {
        BlockRecord {
            hash: block.hash,
            height: block.height,
            parent_hash: block.previous_block_hash,
            timestamp: block.time,
            size: block.size,
            tx_ids: block.tx.clone(),
            reward,
            pool: attribution.into_pool(),
            is_main_chain,
        }
    }
}
