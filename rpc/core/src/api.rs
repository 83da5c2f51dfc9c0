//! RPC API trait definitions

use async_trait::async_trait;
use crate::model::*;
use crate::Hash;

/// Read-only view of a running node. Implementations pass calls straight
/// through: no caching, no retries beyond what the transport does.
#[async_trait]
pub trait RpcApi: Send + Sync {
    async fn get_block(&self, hash: Hash) -> Result<BlockData, RpcError>;
    async fn get_block_hash(&self, height: u64) -> Result<Hash, RpcError>;
    async fn get_raw_transaction(&self, txid: Hash) -> Result<TxData, RpcError>;
    async fn get_chain_info(&self) -> Result<ChainInfo, RpcError>;

    async fn get_block_by_height(&self, height: u64) -> Result<BlockData, RpcError> {
        let hash = self.get_block_hash(height).await?;
        self.get_block(hash).await
    }
}
