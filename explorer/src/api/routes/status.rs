//! Indexer status

use axum::{
    Router,
    routing::get,
    extract::State,
    Json,
};
use serde::Serialize;
use rpc_core::Hash;
use crate::api::ApiState;
use crate::error::Result;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub chain: String,
    pub expected_chain: String,
    pub is_main_chain: bool,
    pub node_height: u64,
    pub node_best_hash: Hash,
    pub indexed_height: Option<u64>,
}

pub fn routes(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .with_state(state)
}

async fn get_status(State(state): State<ApiState>) -> Result<Json<StatusView>> {
    let info = state.tracker.chain_info();
    Ok(Json(StatusView {
        is_main_chain: state.tracker.is_main_chain(),
        chain: info.chain,
        expected_chain: state.tracker.expected_chain().to_string(),
        node_height: info.blocks,
        node_best_hash: info.bestblockhash,
        indexed_height: state.store.latest_block_height().await?,
    }))
}
