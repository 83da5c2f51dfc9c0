//! Read-only query API over the index

pub mod routes;
pub mod server;

use std::sync::Arc;
use rpc_core::Hash;
use crate::database::IndexStore;
use crate::error::{ExplorerError, Result};
use crate::indexer::chain_tracker::MainChainTracker;

pub use server::ApiServer;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn IndexStore>,
    pub tracker: Arc<MainChainTracker>,
}

pub(crate) fn parse_hash(value: &str) -> Result<Hash> {
    value
        .parse()
        .map_err(|e| ExplorerError::InvalidInput(format!("{}: {}", value, e)))
}
