//! Persistence of blocks, transactions and address records

pub mod schema;
pub mod connection;
pub mod sqlite_store;
pub mod memory_store;

use async_trait::async_trait;
use rpc_core::Hash;
use crate::error::Result;
use crate::models::{
    AddressDelta, AddressIndexRecord, AddressTotals, BlockRecord, DeltaKey, TransactionRecord,
};

pub use connection::Database;
pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteStore;

/// A compare-and-swap write of one address record.
#[derive(Debug, Clone)]
pub struct AddressUpdate {
    /// Totals after applying `delta`.
    pub totals: AddressTotals,
    /// Version that was read; `None` when the record did not exist.
    pub expected_version: Option<u64>,
    pub delta: AddressDelta,
}

/// Key-addressed store with per-record atomicity. No cross-record
/// transactions are assumed by callers.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Full record including the transaction set. Cost grows with the
    /// address's history; the update path uses the point lookups below.
    async fn get_address_record(&self, address: &str) -> Result<Option<AddressIndexRecord>>;

    async fn get_address_totals(&self, address: &str) -> Result<Option<AddressTotals>>;
    async fn has_address_delta(&self, address: &str, key: &DeltaKey) -> Result<bool>;
    async fn has_address_transaction(&self, address: &str, txid: &Hash) -> Result<bool>;

    /// Fails with `PersistenceConflict` when the stored version differs from
    /// `expected_version` or the delta is already recorded. Returns the new
    /// version.
    async fn upsert_address_record(&self, update: &AddressUpdate) -> Result<u64>;

    async fn put_block_record(&self, record: &BlockRecord) -> Result<()>;
    async fn put_transaction_record(&self, record: &TransactionRecord) -> Result<()>;

    async fn get_block_record(&self, hash: &Hash) -> Result<Option<BlockRecord>>;
    /// Prefers the main-chain block when several share a height.
    async fn get_block_record_by_height(&self, height: u64) -> Result<Option<BlockRecord>>;
    async fn get_transaction_record(&self, txid: &Hash) -> Result<Option<TransactionRecord>>;
    async fn latest_block_height(&self) -> Result<Option<u64>>;
    /// Lowest height at or above `from` with no stored block.
    async fn first_missing_height(&self, from: u64) -> Result<u64>;

    /// Removes everything. Only used before a full rebuild.
    async fn drop_all(&self) -> Result<()>;
}
