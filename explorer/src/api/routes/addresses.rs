//! Address-related routes

use axum::{
    Router,
    routing::get,
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use rpc_core::Hash;
use crate::api::ApiState;
use crate::error::{ExplorerError, Result};
use crate::models::{sat_to_coin_string, AddressIndexRecord};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressView {
    pub addr_str: String,
    pub balance: String,
    pub balance_sat: i64,
    pub total_received: String,
    pub total_received_sat: i64,
    pub total_sent: String,
    pub total_sent_sat: i64,
    pub tx_appearances: u64,
    pub transactions: Vec<Hash>,
}

impl From<AddressIndexRecord> for AddressView {
    fn from(record: AddressIndexRecord) -> Self {
        Self {
            balance: sat_to_coin_string(record.balance),
            balance_sat: record.balance,
            total_received: sat_to_coin_string(record.total_received),
            total_received_sat: record.total_received,
            total_sent: sat_to_coin_string(record.total_sent),
            total_sent_sat: record.total_sent,
            tx_appearances: record.tx_appearances,
            transactions: record.transactions.into_iter().collect(),
            addr_str: record.address,
        }
    }
}

pub fn routes(state: ApiState) -> Router {
    Router::new()
        .route("/addr/:addr", get(get_address))
        .with_state(state)
}

async fn get_address(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<Json<AddressView>> {
    let record = state
        .store
        .get_address_record(&address)
        .await?
        .ok_or_else(|| ExplorerError::NotFound(format!("address {}", address)))?;
    Ok(Json(record.into()))
}
