//! Long-running ingestion drivers: chain following and full rebuilds

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use backoff::backoff::Backoff;
use backoff::exponential::ExponentialBackoff;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use rpc_core::{Hash, RpcApi};
use crate::error::{ExplorerError, Result};
use crate::indexer::notifier::BlockNotifier;
use crate::indexer::service::{IngestReport, IngestionService};

#[derive(Debug, Clone, Copy)]
pub enum BlockRef {
    Hash(Hash),
    Height(u64),
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_elapsed: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff<backoff::SystemClock> {
        let mut backoff = ExponentialBackoff::default();
        backoff.initial_interval = self.initial_interval;
        backoff.current_interval = self.initial_interval;
        backoff.max_elapsed_time = Some(self.max_elapsed);
        backoff.reset();
        backoff
    }
}

pub struct Follower {
    service: Arc<IngestionService>,
    rpc: Arc<dyn RpcApi>,
    retry: RetryPolicy,
    /// Blocks that exhausted their retry budget while following.
    deferred: Mutex<VecDeque<Hash>>,
}

impl Follower {
    pub fn new(service: Arc<IngestionService>, rpc: Arc<dyn RpcApi>, retry: RetryPolicy) -> Self {
        Self {
            service,
            rpc,
            retry,
            deferred: Mutex::new(VecDeque::new()),
        }
    }

    pub fn deferred(&self) -> Vec<Hash> {
        self.deferred.lock().iter().copied().collect()
    }

    /// Ingests one block, retrying retryable failures with exponential
    /// backoff until the policy's elapsed-time budget runs out.
    pub async fn ingest_with_retry(&self, block: BlockRef) -> Result<IngestReport> {
        let mut backoff = self.retry.backoff();
        loop {
            let result = match block {
                BlockRef::Hash(hash) => self.service.ingest_block(hash).await,
                BlockRef::Height(height) => self.service.ingest_height(height).await,
            };
            match result {
                Ok(report) => return Ok(report),
                Err(e) if e.is_retryable() => match backoff.next_backoff() {
                    Some(wait) => {
                        warn!("Ingesting {:?} failed, retrying in {:?}: {}", block, wait, e);
                        tokio::time::sleep(wait).await;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// Lowest height at or above `start_height` with no stored block, so a
    /// block skipped before a restart is picked up again.
    pub async fn resume_height(&self, start_height: u64) -> Result<u64> {
        self.service.store().first_missing_height(start_height).await
    }

    /// Ingests every block the notifier announces. A block that keeps
    /// failing is deferred and retried every `max_elapsed` until it lands;
    /// a chain identity mismatch stops following.
    pub async fn follow(&self, notifier: Arc<dyn BlockNotifier>) -> Result<()> {
        let (sender, mut receiver) = mpsc::channel(256);
        let notifier_task = tokio::spawn(async move { notifier.run(sender).await });

        let mut retry_tick = tokio::time::interval(self.retry.max_elapsed.max(self.retry.initial_interval));
        retry_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        retry_tick.tick().await;

        let result = loop {
            tokio::select! {
                announced = receiver.recv() => match announced {
                    Some(hash) => {
                        if let Err(e) = self.follow_block(hash).await {
                            break Err(e);
                        }
                    }
                    None => break Ok(()),
                },
                _ = retry_tick.tick() => {
                    if let Err(e) = self.retry_deferred().await {
                        break Err(e);
                    }
                }
            }
        };

        if let Err(e) = &result {
            error!("Stopping ingestion: {}", e);
            notifier_task.abort();
            return result;
        }
        notifier_task
            .await
            .map_err(|e| ExplorerError::Internal(format!("notifier task: {}", e)))?
    }

    async fn follow_block(&self, hash: Hash) -> Result<()> {
        match self.ingest_with_retry(BlockRef::Hash(hash)).await {
            Ok(_) => self.refresh_chain().await,
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("Deferring block {} after retries: {}", hash, e);
                let mut deferred = self.deferred.lock();
                if !deferred.contains(&hash) {
                    deferred.push_back(hash);
                }
                Ok(())
            }
        }
    }

    /// Makes one attempt at each deferred block; blocks that still fail stay
    /// queued. Returns the number ingested.
    pub async fn retry_deferred(&self) -> Result<usize> {
        let pending: Vec<Hash> = self.deferred.lock().drain(..).collect();
        let mut ingested = 0;
        for hash in pending {
            match self.service.ingest_block(hash).await {
                Ok(report) => {
                    info!("Ingested deferred block {} at height {}", hash, report.height);
                    ingested += 1;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    debug!("Deferred block {} still failing: {}", hash, e);
                    self.deferred.lock().push_back(hash);
                }
            }
        }
        if ingested > 0 {
            self.refresh_chain().await?;
        }
        Ok(ingested)
    }

    /// Keeps the tracker's tip current. Only a chain identity change is an
    /// error; an unreachable node is left to the next ingestion.
    async fn refresh_chain(&self) -> Result<()> {
        match self.service.refresh_chain().await {
            Ok(_) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                debug!("Chain info refresh skipped: {}", e);
                Ok(())
            }
        }
    }

    /// Drops the whole index and ingests `start_height..=tip` in order.
    /// Returns the number of blocks ingested.
    pub async fn rebuild(&self, start_height: u64) -> Result<u64> {
        let tip = self.rpc.get_chain_info().await?.blocks;
        info!("Rebuilding index from height {} to {}", start_height, tip);

        self.service.store().drop_all().await?;

        let mut ingested = 0;
        for height in start_height..=tip {
            self.ingest_with_retry(BlockRef::Height(height)).await?;
            ingested += 1;
            if height % 1_000 == 0 {
                info!("Rebuild reached height {} of {}", height, tip);
            }
        }

        info!("Rebuild finished: {} blocks", ingested);
        Ok(ingested)
    }
}
