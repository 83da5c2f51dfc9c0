//! Process-wide components, built once at startup and passed explicitly

use std::sync::Arc;
use tracing::info;
use rpc_core::RpcApi;
use crate::config::Config;
use crate::database::{Database, IndexStore, MemoryStore, SqliteStore};
use crate::error::{ExplorerError, Result};
use crate::indexer::address_indexer::AddressIndexer;
use crate::indexer::chain_tracker::MainChainTracker;
use crate::indexer::pools::{PoolRegistry, BUNDLED_POOLS};
use crate::rpc_client::RpcClient;

pub struct AppContext {
    pub config: Config,
    pub rpc: Arc<dyn RpcApi>,
    pub store: Arc<dyn IndexStore>,
    pub pools: Arc<PoolRegistry>,
    pub tracker: Arc<MainChainTracker>,
    pub addresses: Arc<AddressIndexer>,
}

impl AppContext {
    /// Connects to the node and opens the index. Fails when the node is
    /// unreachable or serves a different chain.
    pub async fn connect(config: Config, in_memory: bool) -> Result<Self> {
        config.validate()?;

        let rpc = RpcClient::new(
            &config.rpc.url,
            &config.rpc.user,
            &config.rpc.password,
            config.rpc.timeout(),
        )
        .map_err(|e| ExplorerError::Config(e.to_string()))?;

        let store: Arc<dyn IndexStore> = if in_memory {
            info!("Using in-memory index");
            Arc::new(MemoryStore::new())
        } else {
            info!("Database path: {:?}", config.database.path);
            let database = Database::new(&config.database.path, config.database.max_connections).await?;
            database.migrate().await?;
            Arc::new(SqliteStore::new(Arc::new(database)))
        };

        Self::assemble(config, Arc::new(rpc), store).await
    }

    /// Builds the context around an existing adapter and store.
    pub async fn assemble(
        config: Config,
        rpc: Arc<dyn RpcApi>,
        store: Arc<dyn IndexStore>,
    ) -> Result<Self> {
        let pools = match &config.chain.pools_file {
            Some(path) => PoolRegistry::load(path)?,
            None => PoolRegistry::from_json(BUNDLED_POOLS)?,
        };
        info!("Loaded {} pool signatures", pools.len());

        let tracker = MainChainTracker::connect(rpc.as_ref(), &config.chain.expected_chain).await?;
        let addresses = Arc::new(AddressIndexer::new(store.clone(), config.indexer.updater_settings()));

        Ok(Self {
            config,
            rpc,
            store,
            pools: Arc::new(pools),
            tracker: Arc::new(tracker),
            addresses,
        })
    }
}
