//! New-block notification sources

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use rpc_core::{Hash, RpcApi};
use crate::error::Result;

/// Delivers hashes of newly accepted blocks. Delivery is at-least-once;
/// consumers must tolerate repeats.
#[async_trait]
pub trait BlockNotifier: Send + Sync {
    /// Runs until the receiving side is dropped.
    async fn run(&self, sender: mpsc::Sender<Hash>) -> Result<()>;
}

/// Polls the node's best block and announces every height it has not
/// announced yet, lowest first.
pub struct PollingNotifier {
    rpc: Arc<dyn RpcApi>,
    interval: Duration,
    start_height: u64,
}

impl PollingNotifier {
    pub fn new(rpc: Arc<dyn RpcApi>, interval: Duration, start_height: u64) -> Self {
        Self { rpc, interval, start_height }
    }
}

#[async_trait]
impl BlockNotifier for PollingNotifier {
    async fn run(&self, sender: mpsc::Sender<Hash>) -> Result<()> {
        info!("Polling for new blocks every {:?} from height {}", self.interval, self.start_height);

        let mut ticker = tokio::time::interval(self.interval);
        let mut next_height = self.start_height;
        let mut last_best: Option<Hash> = None;

        loop {
            ticker.tick().await;
            if sender.is_closed() {
                return Ok(());
            }

            let info = match self.rpc.get_chain_info().await {
                Ok(info) => info,
                Err(e) => {
                    warn!("Polling chain info failed: {}", e);
                    continue;
                }
            };
            if last_best == Some(info.bestblockhash) {
                continue;
            }

            // Same or lower tip with a new hash: the best block was replaced.
            if info.blocks < next_height {
                debug!("Best block replaced at height {}", info.blocks);
                if sender.send(info.bestblockhash).await.is_err() {
                    return Ok(());
                }
                last_best = Some(info.bestblockhash);
                continue;
            }

            let mut caught_up = true;
            while next_height <= info.blocks {
                let hash = match self.rpc.get_block_hash(next_height).await {
                    Ok(hash) => hash,
                    Err(e) => {
                        warn!("Resolving height {} failed: {}", next_height, e);
                        caught_up = false;
                        break;
                    }
                };
                if sender.send(hash).await.is_err() {
                    return Ok(());
                }
                next_height += 1;
            }
            if caught_up {
                last_best = Some(info.bestblockhash);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rpc_core::{BlockData, ChainInfo, RpcError, TxData};

    fn hash_at(height: u64) -> Hash {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&height.to_be_bytes());
        Hash::from_bytes(bytes)
    }

    struct GrowingChain {
        tip: Mutex<u64>,
    }

    #[async_trait]
    impl RpcApi for GrowingChain {
        async fn get_block(&self, hash: Hash) -> std::result::Result<BlockData, RpcError> {
            Err(RpcError::NotFound(hash.to_string()))
        }

        async fn get_block_hash(&self, height: u64) -> std::result::Result<Hash, RpcError> {
            if height <= *self.tip.lock() {
                Ok(hash_at(height))
            } else {
                Err(RpcError::NotFound(height.to_string()))
            }
        }

        async fn get_raw_transaction(&self, txid: Hash) -> std::result::Result<TxData, RpcError> {
            Err(RpcError::NotFound(txid.to_string()))
        }

        async fn get_chain_info(&self) -> std::result::Result<ChainInfo, RpcError> {
            let tip = *self.tip.lock();
            Ok(ChainInfo {
                chain: "main".into(),
                blocks: tip,
                bestblockhash: hash_at(tip),
            })
        }
    }

    #[tokio::test]
    async fn test_announces_each_height_once_in_order() {
        let chain = Arc::new(GrowingChain { tip: Mutex::new(3) });
        let notifier = PollingNotifier::new(chain.clone(), Duration::from_millis(5), 1);
        let (tx, mut rx) = mpsc::channel(16);
        let handle = tokio::spawn(async move { notifier.run(tx).await });

        for height in 1..=3 {
            assert_eq!(rx.recv().await, Some(hash_at(height)));
        }

        *chain.tip.lock() = 5;
        assert_eq!(rx.recv().await, Some(hash_at(4)));
        assert_eq!(rx.recv().await, Some(hash_at(5)));

        drop(rx);
        handle.await.unwrap().unwrap();
    }
}
