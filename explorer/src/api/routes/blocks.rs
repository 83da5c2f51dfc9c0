//! Block-related routes

use axum::{
    Router,
    routing::get,
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use rpc_core::Hash;
use crate::api::{parse_hash, ApiState};
use crate::error::{ExplorerError, Result};
use crate::models::{sat_to_coin_string, BlockRecord, PoolInfo};

const LATEST_BLOCKS: u64 = 10;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockView {
    pub hash: Hash,
    pub height: u64,
    #[serde(rename = "previousblockhash")]
    pub parent_hash: Option<Hash>,
    pub time: i64,
    pub size: u64,
    pub tx: Vec<Hash>,
    pub reward: String,
    pub reward_sat: i64,
    pub pool_info: Option<PoolInfo>,
    pub is_main_chain: bool,
}

impl From<BlockRecord> for BlockView {
    fn from(block: BlockRecord) -> Self {
        Self {
            hash: block.hash,
            height: block.height,
            parent_hash: block.parent_hash,
            time: block.timestamp,
            size: block.size,
            tx: block.tx_ids,
            reward: sat_to_coin_string(block.reward),
            reward_sat: block.reward,
            pool_info: block.pool,
            is_main_chain: block.is_main_chain,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockIndexView {
    pub block_hash: Hash,
}

pub fn routes(state: ApiState) -> Router {
    Router::new()
        .route("/blocks", get(get_latest_blocks))
        .route("/block/:hash", get(get_block))
        .route("/block-index/:height", get(get_block_index))
        .with_state(state)
}

async fn get_block(
    State(state): State<ApiState>,
    Path(hash): Path<String>,
) -> Result<Json<BlockView>> {
    let hash = parse_hash(&hash)?;
    let block = state
        .store
        .get_block_record(&hash)
        .await?
        .ok_or_else(|| ExplorerError::NotFound(format!("block {}", hash)))?;
    Ok(Json(block.into()))
}

async fn get_block_index(
    State(state): State<ApiState>,
    Path(height): Path<u64>,
) -> Result<Json<BlockIndexView>> {
    let block = state
        .store
        .get_block_record_by_height(height)
        .await?
        .ok_or_else(|| ExplorerError::NotFound(format!("block at height {}", height)))?;
    Ok(Json(BlockIndexView { block_hash: block.hash }))
}

/// Most recent indexed blocks, highest first.
async fn get_latest_blocks(State(state): State<ApiState>) -> Result<Json<Vec<BlockView>>> {
    let Some(tip) = state.store.latest_block_height().await? else {
        return Ok(Json(Vec::new()));
    };

    let mut blocks = Vec::new();
    for height in (tip.saturating_sub(LATEST_BLOCKS - 1)..=tip).rev() {
        if let Some(block) = state.store.get_block_record_by_height(height).await? {
            blocks.push(block.into());
        }
    }
    Ok(Json(blocks))
}
