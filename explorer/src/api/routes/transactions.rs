//! Transaction-related routes

use axum::{
    Router,
    routing::get,
    extract::{Path, State},
    Json,
};
use crate::api::{parse_hash, ApiState};
use crate::error::{ExplorerError, Result};
use crate::models::TransactionRecord;

pub fn routes(state: ApiState) -> Router {
    Router::new()
        .route("/tx/:txid", get(get_transaction))
        .with_state(state)
}

async fn get_transaction(
    State(state): State<ApiState>,
    Path(txid): Path<String>,
) -> Result<Json<TransactionRecord>> {
    let txid = parse_hash(&txid)?;
    let tx = state
        .store
        .get_transaction_record(&txid)
        .await?
        .ok_or_else(|| ExplorerError::NotFound(format!("transaction {}", txid)))?;
    Ok(Json(tx))
}
