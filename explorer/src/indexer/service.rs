//! Per-block ingestion pipeline

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use futures_util::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};
use rpc_core::{BlockData, ChainInfo, Hash, RpcApi, RpcError, TxData};
use crate::context::AppContext;
use crate::database::IndexStore;
use crate::error::{ExplorerError, Result};
use crate::indexer::address_indexer::AddressIndexer;
use crate::indexer::block_indexer::BlockIndexer;
use crate::indexer::chain_tracker::MainChainTracker;
use crate::indexer::converter::{convert_transaction, outputs_of, BlockContext, PrevoutMap, ResolvedOutput};
use crate::models::PoolInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetched,
    Converted,
    Attributed,
    RewardComputed,
    Indexed,
    Persisted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetched => "fetched",
            Stage::Converted => "converted",
            Stage::Attributed => "attributed",
            Stage::RewardComputed => "reward computed",
            Stage::Indexed => "indexed",
            Stage::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub hash: Hash,
    pub height: u64,
    pub tx_count: usize,
    pub addresses_touched: usize,
    /// Deltas written by this run; zero on a repeated ingestion.
    pub deltas_applied: usize,
    pub pool: Option<PoolInfo>,
    pub reward: i64,
    pub is_main_chain: bool,
}

/// Drives one block at a time through fetch, conversion, attribution, reward,
/// address indexing and persistence. Nothing is written before every adapter
/// call for the block has succeeded, and the block record is written last.
pub struct IngestionService {
    rpc: Arc<dyn RpcApi>,
    store: Arc<dyn IndexStore>,
    blocks: BlockIndexer,
    addresses: Arc<AddressIndexer>,
    tracker: Arc<MainChainTracker>,
    rpc_timeout: Duration,
    fetch_concurrency: usize,
}

impl IngestionService {
    pub fn new(ctx: &AppContext) -> Self {
        Self {
            rpc: ctx.rpc.clone(),
            store: ctx.store.clone(),
            blocks: BlockIndexer::new(ctx.pools.clone(), ctx.tracker.clone()),
            addresses: ctx.addresses.clone(),
            tracker: ctx.tracker.clone(),
            rpc_timeout: ctx.config.rpc.timeout(),
            fetch_concurrency: ctx.config.indexer.concurrency.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn IndexStore> {
        &self.store
    }

    /// Re-reads the node's chain info into the tracker. A node that now
    /// reports another chain yields `ChainIdentityMismatch`.
    pub async fn refresh_chain(&self) -> Result<ChainInfo> {
        match tokio::time::timeout(self.rpc_timeout, self.tracker.refresh(self.rpc.as_ref())).await {
            Ok(result) => result,
            Err(_) => Err(ExplorerError::UpstreamUnavailable(format!(
                "chain info timed out after {:?}",
                self.rpc_timeout
            ))),
        }
    }

    pub async fn ingest_height(&self, height: u64) -> Result<IngestReport> {
        let started = Instant::now();
        let block = self.call(self.rpc.get_block_by_height(height)).await?;
        self.ingest(block, started).await
    }

    pub async fn ingest_block(&self, hash: Hash) -> Result<IngestReport> {
        let started = Instant::now();
        let block = self.call(self.rpc.get_block(hash)).await?;
        self.ingest(block, started).await
    }

    async fn ingest(&self, block: BlockData, started: Instant) -> Result<IngestReport> {
        let txs = self.fetch_transactions(&block).await?;
        let prevouts = self.resolve_prevouts(&txs).await?;
        self.stage(&block, Stage::Fetched);

        let context = BlockContext {
            height: block.height,
            hash: block.hash,
            time: block.time,
        };
        let converted = txs
            .iter()
            .map(|tx| convert_transaction(tx, &context, &prevouts))
            .collect::<Result<Vec<_>>>()?;
        self.stage(&block, Stage::Converted);

        let attribution = self.blocks.attribute(txs.first());
        self.stage(&block, Stage::Attributed);

        let is_main_chain = self.blocks.is_main_chain(&block);
        let reward = self.blocks.reward(block.height);
        self.stage(&block, Stage::RewardComputed);

        for tx in &converted {
            self.store.put_transaction_record(&tx.record).await?;
        }
        let deltas: Vec<_> = converted.into_iter().flat_map(|tx| tx.deltas).collect();
        let summary = self.addresses.apply_all(deltas).await?;
        self.stage(&block, Stage::Indexed);

        let record = self.blocks.record(&block, attribution, reward, is_main_chain);
        self.store.put_block_record(&record).await?;
        self.stage(&block, Stage::Persisted);

        info!(
            "Ingested block {} at height {} ({} txs, {} addresses, pool {}) in {:?}",
            block.hash,
            block.height,
            txs.len(),
            summary.addresses,
            record.pool.as_ref().map_or("unknown", |p| p.pool_name.as_str()),
            started.elapsed()
        );

        Ok(IngestReport {
            hash: block.hash,
            height: block.height,
            tx_count: txs.len(),
            addresses_touched: summary.addresses,
            deltas_applied: summary.applied,
            pool: record.pool,
            reward,
            is_main_chain,
        })
    }

    fn stage(&self, block: &BlockData, stage: Stage) {
        debug!("Block {} at height {}: {}", block.hash, block.height, stage);
    }

    /// Bounds an adapter call by the configured timeout.
    async fn call<T>(&self, request: impl Future<Output = std::result::Result<T, RpcError>>) -> Result<T> {
        match tokio::time::timeout(self.rpc_timeout, request).await {
            Ok(result) => result.map_err(ExplorerError::from),
            Err(_) => Err(ExplorerError::UpstreamUnavailable(format!(
                "node call timed out after {:?}",
                self.rpc_timeout
            ))),
        }
    }

    /// Fetches the block's transactions concurrently, returned in block order.
    async fn fetch_transactions(&self, block: &BlockData) -> Result<Vec<TxData>> {
        let fetched: Vec<Option<TxData>> = stream::iter(block.tx.iter().copied())
            .map(|txid| async move {
                match self.call(self.rpc.get_raw_transaction(txid)).await {
                    Ok(tx) => Ok(Some(tx)),
                    // The genesis coinbase is not part of the node's transaction index.
                    Err(ExplorerError::NotFound(_)) if block.height == 0 => {
                        warn!("Skipping unindexed genesis transaction {}", txid);
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            })
            .buffered(self.fetch_concurrency)
            .try_collect()
            .await?;
        Ok(fetched.into_iter().flatten().collect())
    }

    /// Looks up every output spent by `txs`: first in the block itself, then
    /// in stored transactions, then on the node.
    async fn resolve_prevouts(&self, txs: &[TxData]) -> Result<PrevoutMap> {
        let mut prevouts: PrevoutMap = txs.iter().flat_map(outputs_of).collect();

        let mut missing: Vec<(Hash, u32)> = txs
            .iter()
            .flat_map(|tx| tx.vin.iter().filter_map(|vin| vin.prevout()))
            .filter(|outpoint| !prevouts.contains_key(outpoint))
            .collect();
        if missing.is_empty() {
            return Ok(prevouts);
        }

        let mut source_txids: Vec<Hash> = missing.iter().map(|(txid, _)| *txid).collect();
        let mut seen = HashSet::new();
        source_txids.retain(|txid| seen.insert(*txid));

        let sources: Vec<Vec<((Hash, u32), ResolvedOutput)>> = stream::iter(source_txids)
            .map(|txid| self.source_outputs(txid))
            .buffered(self.fetch_concurrency)
            .try_collect()
            .await?;
        prevouts.extend(sources.into_iter().flatten());

        missing.retain(|outpoint| !prevouts.contains_key(outpoint));
        if let Some((txid, vout)) = missing.first() {
            return Err(ExplorerError::NotFound(format!("output {}:{} does not exist", txid, vout)));
        }
        Ok(prevouts)
    }

    async fn source_outputs(&self, txid: Hash) -> Result<Vec<((Hash, u32), ResolvedOutput)>> {
        if let Some(stored) = self.store.get_transaction_record(&txid).await? {
            return Ok(stored
                .outputs
                .into_iter()
                .map(|out| {
                    (
                        (txid, out.n),
                        ResolvedOutput {
                            addresses: out.addresses,
                            value: out.value,
                        },
                    )
                })
                .collect());
        }
        let tx = self.call(self.rpc.get_raw_transaction(txid)).await?;
        Ok(outputs_of(&tx).collect())
    }
}
